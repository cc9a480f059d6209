pub mod context;
pub mod engine;
pub mod filter;
pub mod proxy;

pub use context::StyleContext;
pub use engine::{ExpressionEngine, QuickJsEngine};
pub use filter::Filter;
