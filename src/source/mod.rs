pub mod cache;
pub mod config;
pub mod manager;
pub mod provider;
pub mod task;

pub use config::{SourceKind, TileSourceConfig};
pub use manager::TileSource;
pub use provider::{DataProvider, RequestId, UrlClient};
pub use task::{TaskState, TileTask};
