//! Dataset loading, column schemas and batch iteration

pub mod loader;
pub mod schema;
pub mod windowed;

pub use loader::{DataLoader, Dataset};
pub use schema::{ColumnIndex, ColumnSelection, SchemaRegistry, Task};
pub use windowed::{BatchIter, WindowedDataset};
