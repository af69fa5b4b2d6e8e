//! Domain model: cell values, table schemas/states, and image records.

pub mod image;
pub mod table;
pub mod value;

pub use image::{Image, ParentEdge, ParentKind, PayloadRef};
pub use table::{Column, ColumnType, TableSchema, TableState};
pub use value::{Datum, Key, Row};
