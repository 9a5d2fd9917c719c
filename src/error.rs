use std::error::Error as StdError;

/// Errors surfaced by the middleware and the response bodies it produces.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A body write was attempted against a status code that forbids a
    /// response body (informational, `204 No Content`, `205 Reset Content`).
    #[error("content forbidden")]
    ContentForbidden,

    /// The underlying connection offers no hijack capability.
    #[error("connection does not support hijacking")]
    HijackUnsupported,

    /// The gzip encoder failed.
    #[error("gzip encoding failed")]
    Compress(#[from] flate2::CompressError),

    /// The wrapped service's body failed while being read.
    #[error("{0}")]
    Upstream(Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn upstream<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error::Upstream(err.into())
    }
}
