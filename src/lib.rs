//! Transparent gzip compression for Tower HTTP services.
//!
//! This crate provides a Tower layer that rewrites responses on the fly:
//! when a request's `Accept-Encoding` declares gzip, the response body is
//! compressed through a pooled streaming encoder and labeled
//! `Content-Encoding: gzip`, with no change to the wrapped service.
//!
//! # Example
//!
//! ```ignore
//! use tower_gzip::GzipLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(GzipLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Compression rules
//!
//! The middleware will **not** compress responses when:
//! - No `Accept-Encoding` value contains `gzip` (case-insensitive; any
//!   value containing the token matches, see [`accepts_gzip`])
//! - The status code forbids a body (informational, 204, 205); body writes
//!   against such a response fail with [`Error::ContentForbidden`]
//! - `Content-Encoding` is already set by the wrapped service
//! - `Content-Range` is present (partial responses stay byte-addressable)
//! - The wrapped service never produces a non-empty body chunk
//!
//! The decision is made at the first body byte: headers are withheld until
//! the body is known to be non-empty, so an empty response is never
//! labeled as gzip.
//!
//! # Response modifications
//!
//! When compression is applied:
//! - `Content-Encoding` is set to `gzip`
//! - `Content-Length` is removed (compressed size is unknown)
//! - `Accept-Ranges` is removed
//! - `Vary` gains `Accept-Encoding`
//!
//! `Accept-Encoding` is stripped from the request before it reaches the
//! wrapped service, so stacked compression layers never double-compress.
//!
//! # Connection hijacking
//!
//! Protocol upgrades bypass compression: `101 Switching Protocols` passes
//! through untouched, and with the `hijack` feature the [`hijack`]
//! function hands the raw connection capability to the caller.

#![deny(missing_docs)]

mod body;
mod codec;
mod error;
mod future;
#[cfg(feature = "hijack")]
mod hijack;
mod layer;
mod pool;
mod service;

pub use body::GzipBody;
pub use codec::accepts_gzip;
pub use error::Error;
pub use future::ResponseFuture;
#[cfg(feature = "hijack")]
pub use hijack::hijack;
pub use layer::GzipLayer;
pub use pool::GzipEncoderPool;
pub use service::GzipService;
