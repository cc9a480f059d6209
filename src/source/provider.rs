//! The narrow boundary toward the host's HTTP/file collaborator. The core
//! never constructs its own client; it is handed one at construction.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::errors::TangramError;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    pub fn next() -> Self {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Toward the URL client: `start_request`/`cancel_request`, completion
/// delivering `(content_type, bytes)` or a network error.
pub trait DataProvider: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<Result<(String, Bytes), TangramError>>;
    fn cancel(&self, request_id: RequestId);
}

/// A `DataProvider` the host implements over its own HTTP stack; this
/// crate only names the trait.
pub trait UrlClient: DataProvider {}
