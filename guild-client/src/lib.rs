pub mod cache;
pub mod graph;
pub mod jobs;
pub mod store;
pub mod suggest;

pub use cache::ConnectionCache;
pub use graph::{GraphError, GraphService, RepairPolicy};
pub use store::{HttpStore, MemStore, RecordStore, RecordWatch, StoreError};
