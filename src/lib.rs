pub mod config;
pub mod decode;
pub mod errors;
pub mod expr;
pub mod geom;
pub mod geometry;
pub mod id;
pub mod rules;
pub mod scene;
pub mod source;
pub mod tile_manager;
pub mod value;

pub use config::{load_config, RetryPolicy, TangramConfig};
pub use decode::TileFormat;
pub use errors::TangramError;
pub use geometry::{Feature, GeometryType, Layer, Line, Point, Polygon, RasterTile, TileData};
pub use id::{TileId, TileSourceId};
pub use rules::{DrawRule, RuleMatcher};
pub use scene::SceneLayer;
pub use source::{DataProvider, SourceKind, TileSource, TileSourceConfig};
pub use tile_manager::TileManager;
pub use value::{Properties, Value};
