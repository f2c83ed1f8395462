mod chunk;
mod error;
mod model;
mod result;
mod text;

pub use chunk::{Chunk, ChunkId};
pub use error::{CoreError, ModelError};
pub use model::{Embedder, RelevanceScorer};
pub use result::{FusedResult, RerankedResult, ScoredResult, SearchMethod};
pub use text::{preview, truncate_utf8_bytes};
