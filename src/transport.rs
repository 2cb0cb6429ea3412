use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;
use http::header::HeaderMap;
use http::StatusCode;

/// The error type transports and body streams report with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The response body as an ordered sequence of raw byte chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// A `GET` request as handed to the [`Transport`].
#[derive(Debug)]
pub struct FetchRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// A response head plus its streaming body.
///
/// The body must deliver chunks in arrival order and terminate with either
/// end-of-stream or an error item; dropping it must cancel the underlying
/// request.
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl FetchResponse {
    /// The response's `Content-Type` header, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
    }
}

/// The HTTP collaborator a [`StreamSession`](crate::StreamSession) drives.
///
/// Issuing the request, TLS, redirects and connection reuse are entirely
/// the implementor's business; the session only needs one `GET` per
/// attempt and a chunked body it can cancel by dropping.
pub trait Transport: Send + Sync {
    fn fetch(&self, req: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, BoxError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn fetch(&self, req: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, BoxError>> {
        (**self).fetch(req)
    }
}
