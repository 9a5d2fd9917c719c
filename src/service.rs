use crate::body::GzipBody;
use crate::codec::accepts_gzip;
use crate::future::ResponseFuture;
use crate::pool::GzipEncoderPool;
use http::{Request, header};
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that gzip-compresses response bodies for clients that
/// declare gzip in `Accept-Encoding`.
#[derive(Debug, Clone)]
pub struct GzipService<S> {
    inner: S,
    pool: GzipEncoderPool,
}

impl<S> GzipService<S> {
    /// Wraps `inner`, drawing encoders from `pool`.
    pub fn new(inner: S, pool: GzipEncoderPool) -> Self {
        Self { inner, pool }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GzipService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: http_body::Body,
    ResBody::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = http::Response<GzipBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let pool = accepts_gzip(req.headers()).then(|| self.pool.clone());

        if pool.is_some() {
            // A nested compression layer must negotiate nothing: the
            // wrapped handler never sees the client's Accept-Encoding.
            req.headers_mut().remove(header::ACCEPT_ENCODING);
        }

        ResponseFuture::new(self.inner.call(req), pool)
    }
}
