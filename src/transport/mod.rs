//! Transport abstraction: accept a request, return a response or fail
//!
//! The recorder both consumes and implements [`Transport`], so it can stand
//! in wherever the real transport was used.

mod http;

pub use self::http::HttpTransport;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Request, Response};

use crate::error::BoxError;
use crate::Result;

/// Body type carried by requests and responses crossing a transport
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Something that can carry an HTTP exchange
pub trait Transport: Send + Sync {
    /// Send `request` and resolve to its response
    ///
    /// Failures of the underlying network surface as
    /// [`TapedeckError::Transport`](crate::TapedeckError::Transport).
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>> {
        (**self).round_trip(request)
    }
}

/// Body holding `data` in full
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Body with no data
#[must_use]
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Read a body to completion
///
/// # Errors
///
/// Returns [`TapedeckError::Transport`](crate::TapedeckError::Transport) if the
/// body stream fails
pub async fn collect_body(body: Body) -> Result<Bytes> {
    let collected = body
        .collect()
        .await
        .map_err(crate::TapedeckError::Transport)?;
    Ok(collected.to_bytes())
}
