pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;
pub mod types;

pub use config::{LogFormat, ServiceConfig};
pub use error::ServiceError;
pub use service::SearchService;
pub use telemetry::{active_log_format, init_tracing};
pub use types::{
    ComparisonResponse, HealthStatus, RerankRequest, RerankResponse, RerankedItem, SearchRequest,
    SearchResponse, SearchResultItem,
};
