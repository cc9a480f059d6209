use thiserror::Error;

/// Single error type for the tile pipeline, covering the error kinds in
/// the error-handling design: network, decode, JS compile/eval, config,
/// and invariant violations.
#[derive(Debug, Error)]
pub enum TangramError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("function failed to compile: {0}")]
    FunctionCompile(String),

    #[error("function raised at runtime: {0}")]
    FunctionEval(String),

    #[error("invalid style parameter: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

/// Attaches a short message to any `Result` as it crosses into
/// `TangramError::Decode`.
pub trait DecodeContext<T> {
    fn decode_context(self, msg: &str) -> Result<T, TangramError>;
}

impl<T, E> DecodeContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn decode_context(self, msg: &str) -> Result<T, TangramError> {
        self.map_err(|e| TangramError::Decode(format!("{msg}: {e}")))
    }
}

/// Raises an `Invariant` error: panics in debug builds (a violated invariant
/// is a program bug worth stopping on), logs and continues in release.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            if cfg!(debug_assertions) {
                panic!("invariant violated: {}", $msg);
            } else {
                log::error!("invariant violated: {}", $msg);
            }
        }
    };
}
