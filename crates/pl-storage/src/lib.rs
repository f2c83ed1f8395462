pub mod document;
pub mod error;
pub mod fulltext;
pub mod manager;
pub mod vector;

pub use document::DocumentStore;
pub use error::StorageError;
pub use fulltext::{FullTextHit, FullTextStore, LexicalFields};
pub use manager::{
    ConsistencyReport, StorageManager, StorageMeta, StorageSnapshot, DEFAULT_VECTOR_DIMENSION,
};
pub use vector::{VectorHit, VectorStore};
