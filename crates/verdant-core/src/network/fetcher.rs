//! The network fetch primitive.

use crate::error::Result;
use crate::http::{Request, Response};
use async_trait::async_trait;

/// Given a request, asynchronously yields a response or fails.
///
/// Any HTTP status is a response; only transport problems (DNS, connect,
/// reset, timeout) are errors. Callers treat every error uniformly as a
/// network failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
