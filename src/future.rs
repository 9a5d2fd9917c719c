use crate::body::{GzipBody, copy_to_bytes};
use crate::error::Error;
use crate::pool::GzipEncoderPool;
use bytes::{Buf, Bytes};
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, header};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Future for gzip service responses.
    ///
    /// Once the inner service resolves, the response is classified; on the
    /// compression path the future keeps polling the body until the first
    /// non-empty data frame (or the end of the stream) is known, so the
    /// header set it resolves with is already final. A handler that writes
    /// nothing therefore never announces `Content-Encoding: gzip`.
    pub struct ResponseFuture<F, B> {
        #[pin]
        inner: F,
        pool: Option<GzipEncoderPool>,
        peek: Option<Peek<B>>,
    }
}

/// Response parts held back while the body is peeked for its first byte.
struct Peek<B> {
    parts: Parts,
    body: Pin<Box<B>>,
    pool: GzipEncoderPool,
}

/// What the peek observed first.
enum Peeked {
    Chunk(Bytes),
    End,
    Trailers(HeaderMap),
    Failed(Error),
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(inner: F, pool: Option<GzipEncoderPool>) -> Self {
        Self {
            inner,
            pool,
            peek: None,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Output = Result<Response<GzipBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if this.peek.is_none() {
            let response = ready!(this.inner.as_mut().poll(cx))?;

            let Some(pool) = this.pool.take() else {
                // Negotiation declined: hand the response through untouched.
                return Poll::Ready(Ok(response.map(GzipBody::passthrough)));
            };

            let (mut parts, body) = response.into_parts();

            if denies_body(parts.status) {
                parts.headers.remove(header::CONTENT_ENCODING);
                parts.headers.remove(header::CONTENT_LENGTH);
                let response = Response::from_parts(parts, GzipBody::suppressed(body));
                return Poll::Ready(Ok(response));
            }

            if parts.headers.contains_key(header::CONTENT_ENCODING)
                || parts.headers.contains_key(header::CONTENT_RANGE)
            {
                // Already encoded, or a partial response whose byte ranges
                // must stay byte-addressable.
                let response = Response::from_parts(parts, GzipBody::passthrough(body));
                return Poll::Ready(Ok(response));
            }

            *this.peek = Some(Peek {
                parts,
                body: Box::pin(body),
                pool,
            });
        }

        let peeked = {
            let Some(peek) = this.peek.as_mut() else {
                return Poll::Pending;
            };
            loop {
                match ready!(peek.body.as_mut().poll_frame(cx)) {
                    None => break Peeked::End,
                    Some(Err(e)) => break Peeked::Failed(Error::upstream(e)),
                    Some(Ok(frame)) => match frame.into_data() {
                        Ok(data) => {
                            let chunk = copy_to_bytes(data);
                            if !chunk.is_empty() {
                                break Peeked::Chunk(chunk);
                            }
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                break Peeked::Trailers(trailers);
                            }
                        }
                    },
                }
            }
        };

        let Peek {
            mut parts,
            body,
            pool,
        } = this.peek.take().expect("peek state present");

        parts.headers.remove(header::CONTENT_LENGTH);
        let body = match peeked {
            Peeked::Chunk(chunk) => {
                commit_headers(&mut parts.headers);
                GzipBody::compressed(body, pool.acquire(), chunk)
            }
            Peeked::End => GzipBody::drained(None, None),
            Peeked::Trailers(trailers) => GzipBody::drained(Some(trailers), None),
            Peeked::Failed(error) => GzipBody::drained(None, Some(error)),
        };

        Poll::Ready(Ok(Response::from_parts(parts, body)))
    }
}

/// Status codes whose responses must not carry a body (RFC 9110:
/// informational, 204, 205).
fn denies_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::RESET_CONTENT
}

/// Header edits that become true the moment the first body byte exists.
fn commit_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static("gzip"),
    );

    // Byte ranges no longer line up once the body is recoded.
    headers.remove(header::ACCEPT_RANGES);

    add_vary_accept_encoding(headers);
}

/// Adds `Accept-Encoding` to the `Vary` header unless already covered.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary) = vary.to_str() {
            let covered = vary.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body::Frame;
    use std::collections::VecDeque;
    use std::pin::pin;

    struct TestBody {
        frames: VecDeque<Frame<Bytes>>,
    }

    impl TestBody {
        fn new(frames: Vec<Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }

        fn data(chunks: &[&'static str]) -> Self {
            Self::new(
                chunks
                    .iter()
                    .map(|c| Frame::data(Bytes::from_static(c.as_bytes())))
                    .collect(),
            )
        }
    }

    impl Body for TestBody {
        type Data = Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            match self.frames.pop_front() {
                Some(frame) => Poll::Ready(Some(Ok(frame))),
                None => Poll::Ready(None),
            }
        }
    }

    fn drive(
        response: Response<TestBody>,
        pool: Option<GzipEncoderPool>,
    ) -> Response<GzipBody<TestBody>> {
        let future = ResponseFuture::new(
            std::future::ready(Ok::<_, std::convert::Infallible>(response)),
            pool,
        );
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match pin!(future).poll(&mut cx) {
            Poll::Ready(Ok(response)) => response,
            _ => panic!("future did not resolve"),
        }
    }

    fn negotiated() -> Option<GzipEncoderPool> {
        Some(GzipEncoderPool::default())
    }

    fn response(status: u16, body: TestBody) -> Response<TestBody> {
        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        response
    }

    #[test]
    fn declined_negotiation_is_untouched() {
        let mut resp = response(200, TestBody::data(&["hello"]));
        resp.headers_mut()
            .insert(header::CONTENT_LENGTH, "5".parse().unwrap());
        let wrapped = drive(resp, None);

        assert!(wrapped.body().is_passthrough());
        assert!(!wrapped.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(wrapped.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
    }

    #[test]
    fn first_byte_commits_compression() {
        let mut resp = response(200, TestBody::data(&["hello world"]));
        resp.headers_mut()
            .insert(header::CONTENT_LENGTH, "11".parse().unwrap());
        resp.headers_mut()
            .insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
        let wrapped = drive(resp, negotiated());

        assert!(wrapped.body().is_compressed());
        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );
        assert!(!wrapped.headers().contains_key(header::CONTENT_LENGTH));
        assert!(!wrapped.headers().contains_key(header::ACCEPT_RANGES));
        assert_eq!(
            wrapped.headers().get(header::VARY).unwrap(),
            "accept-encoding"
        );
    }

    #[test]
    fn empty_body_stays_unencoded() {
        let wrapped = drive(response(200, TestBody::new(vec![])), negotiated());

        assert!(wrapped.body().is_drained());
        assert!(!wrapped.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[test]
    fn empty_chunks_stay_unencoded() {
        let body = TestBody::new(vec![
            Frame::data(Bytes::new()),
            Frame::data(Bytes::new()),
        ]);
        let wrapped = drive(response(200, body), negotiated());

        assert!(wrapped.body().is_drained());
        assert!(!wrapped.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[test]
    fn trailers_without_data_stay_unencoded() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());
        let body = TestBody::new(vec![Frame::trailers(trailers)]);
        let wrapped = drive(response(200, body), negotiated());

        assert!(wrapped.body().is_drained());
        assert!(!wrapped.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[test]
    fn bodyless_status_is_suppressed() {
        for status in [100, 101, 204, 205] {
            let mut resp = response(status, TestBody::data(&["oops"]));
            resp.headers_mut()
                .insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
            resp.headers_mut()
                .insert(header::CONTENT_LENGTH, "4".parse().unwrap());
            let wrapped = drive(resp, negotiated());

            assert!(wrapped.body().is_suppressed(), "status {status}");
            assert!(!wrapped.headers().contains_key(header::CONTENT_ENCODING));
            assert!(!wrapped.headers().contains_key(header::CONTENT_LENGTH));
        }
    }

    #[test]
    fn already_encoded_response_is_untouched() {
        let mut resp = response(200, TestBody::data(&["precompressed"]));
        resp.headers_mut()
            .insert(header::CONTENT_ENCODING, "br".parse().unwrap());
        let wrapped = drive(resp, negotiated());

        assert!(wrapped.body().is_passthrough());
        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "br"
        );
    }

    #[test]
    fn range_response_is_untouched() {
        let mut resp = response(206, TestBody::data(&["partial"]));
        resp.headers_mut()
            .insert(header::CONTENT_RANGE, "bytes 0-6/100".parse().unwrap());
        let wrapped = drive(resp, negotiated());

        assert!(wrapped.body().is_passthrough());
        assert!(!wrapped.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[test]
    fn vary_header_appended_to_existing() {
        let mut resp = response(200, TestBody::data(&["hello"]));
        resp.headers_mut()
            .insert(header::VARY, "origin".parse().unwrap());
        let wrapped = drive(resp, negotiated());

        let values: Vec<_> = wrapped
            .headers()
            .get_all(header::VARY)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["origin", "accept-encoding"]);
    }

    #[test]
    fn vary_header_not_duplicated() {
        let mut resp = response(200, TestBody::data(&["hello"]));
        resp.headers_mut()
            .insert(header::VARY, "Accept-Encoding".parse().unwrap());
        let wrapped = drive(resp, negotiated());

        assert_eq!(
            wrapped.headers().get(header::VARY).unwrap(),
            "Accept-Encoding"
        );
    }

    #[test]
    fn vary_star_left_alone() {
        let mut resp = response(200, TestBody::data(&["hello"]));
        resp.headers_mut().insert(header::VARY, "*".parse().unwrap());
        let wrapped = drive(resp, negotiated());

        assert_eq!(wrapped.headers().get(header::VARY).unwrap(), "*");
    }
}
