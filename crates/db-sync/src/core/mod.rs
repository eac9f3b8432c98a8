//! Database-agnostic core: scalar values, key tables, row batches, metadata.

pub mod batch;
pub mod keys;
pub mod schema;
pub mod value;

pub use batch::{Row, RowBatch};
pub use keys::KeyTable;
pub use schema::{ColumnDescriptor, TableMetadata};
pub use value::{Field, FieldValue, TypeTag};
