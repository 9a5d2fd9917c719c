use crate::error::Error;
use crate::pool::PooledEncoder;
use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// The response body produced by [`GzipService`](crate::GzipService).
    ///
    /// Depending on negotiation and the response itself, frames either pass
    /// through untouched, stream through a pooled gzip encoder, or are
    /// rejected outright (bodyless status codes).
    pub struct GzipBody<B> {
        #[pin]
        kind: Kind<B>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<B> {
        // Negotiation declined or the response is exempt; untouched frames.
        Passthrough {
            #[pin]
            inner: B,
        },
        // The status code forbids a body; every data frame is rejected
        // before it can reach the wire.
        Suppressed {
            #[pin]
            inner: B,
        },
        // Streaming the inner body through the encoder. The first data
        // chunk was already pulled while the headers were held back.
        Compressed {
            inner: Pin<Box<B>>,
            stream: GzipStream,
        },
        // The handler produced no body bytes; at most a peeked trailers
        // frame or error remains to be replayed.
        Drained {
            trailers: Option<HeaderMap>,
            error: Option<Error>,
        },
    }
}

impl<B> GzipBody<B> {
    pub(crate) fn passthrough(inner: B) -> Self {
        Self {
            kind: Kind::Passthrough { inner },
        }
    }

    pub(crate) fn suppressed(inner: B) -> Self {
        Self {
            kind: Kind::Suppressed { inner },
        }
    }

    pub(crate) fn compressed(inner: Pin<Box<B>>, encoder: PooledEncoder, first: Bytes) -> Self {
        Self {
            kind: Kind::Compressed {
                inner,
                stream: GzipStream {
                    encoder,
                    first: Some(first),
                    pending_trailers: None,
                    phase: Phase::Streaming,
                },
            },
        }
    }

    pub(crate) fn drained(trailers: Option<HeaderMap>, error: Option<Error>) -> Self {
        Self {
            kind: Kind::Drained { trailers, error },
        }
    }
}

#[cfg(test)]
impl<B> GzipBody<B> {
    pub(crate) fn is_passthrough(&self) -> bool {
        matches!(self.kind, Kind::Passthrough { .. })
    }

    pub(crate) fn is_suppressed(&self) -> bool {
        matches!(self.kind, Kind::Suppressed { .. })
    }

    pub(crate) fn is_compressed(&self) -> bool {
        matches!(self.kind, Kind::Compressed { .. })
    }

    pub(crate) fn is_drained(&self) -> bool {
        matches!(self.kind, Kind::Drained { .. })
    }
}

impl<B> Body for GzipBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project().kind.project() {
            KindProj::Passthrough { inner } => match ready!(inner.poll_frame(cx)) {
                Some(Ok(frame)) => Poll::Ready(Some(Ok(frame.map_data(copy_to_bytes)))),
                Some(Err(e)) => Poll::Ready(Some(Err(Error::upstream(e)))),
                None => Poll::Ready(None),
            },
            KindProj::Suppressed { mut inner } => loop {
                match ready!(inner.as_mut().poll_frame(cx)) {
                    None => return Poll::Ready(None),
                    Some(Err(e)) => return Poll::Ready(Some(Err(Error::upstream(e)))),
                    Some(Ok(frame)) => {
                        if frame.is_data() {
                            return Poll::Ready(Some(Err(Error::ContentForbidden)));
                        }
                        if let Ok(trailers) = frame.into_trailers() {
                            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                        }
                    }
                }
            },
            KindProj::Compressed { inner, stream } => stream.poll_frame(cx, inner.as_mut()),
            KindProj::Drained { trailers, error } => {
                if let Some(e) = error.take() {
                    return Poll::Ready(Some(Err(e)));
                }
                if let Some(t) = trailers.take() {
                    return Poll::Ready(Some(Ok(Frame::trailers(t))));
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Passthrough { inner } | Kind::Suppressed { inner } => inner.is_end_stream(),
            Kind::Compressed { stream, .. } => matches!(stream.phase, Phase::Done),
            Kind::Drained { trailers, error } => trailers.is_none() && error.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Passthrough { inner } => inner.size_hint(),
            Kind::Suppressed { .. } | Kind::Drained { .. } => SizeHint::with_exact(0),
            // Compressed size is unknown in advance.
            Kind::Compressed { .. } => SizeHint::default(),
        }
    }
}

/// Phase machine for an actively compressed body.
enum Phase {
    Streaming,
    Finishing,
    Trailers,
    Done,
}

struct GzipStream {
    encoder: PooledEncoder,
    first: Option<Bytes>,
    pending_trailers: Option<HeaderMap>,
    phase: Phase,
}

impl GzipStream {
    fn poll_frame<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.phase {
                Phase::Done => return Poll::Ready(None),

                Phase::Trailers => {
                    self.phase = Phase::Done;
                    if let Some(trailers) = self.pending_trailers.take() {
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                }

                Phase::Finishing => {
                    let mut out = Vec::new();
                    if let Err(e) = self.encoder.finish(&mut out) {
                        self.phase = Phase::Done;
                        return Poll::Ready(Some(Err(e.into())));
                    }
                    self.phase = if self.pending_trailers.is_some() {
                        Phase::Trailers
                    } else {
                        Phase::Done
                    };
                    if !out.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(out.into()))));
                    }
                }

                Phase::Streaming => {
                    if let Some(first) = self.first.take() {
                        match self.deflate_chunk(&first) {
                            Ok(Some(frame)) => return Poll::Ready(Some(Ok(frame))),
                            Ok(None) => continue,
                            Err(e) => {
                                self.phase = Phase::Done;
                                return Poll::Ready(Some(Err(e)));
                            }
                        }
                    }
                    match ready!(inner.as_mut().poll_frame(cx)) {
                        None => self.phase = Phase::Finishing,
                        Some(Err(e)) => {
                            self.phase = Phase::Done;
                            return Poll::Ready(Some(Err(Error::upstream(e))));
                        }
                        Some(Ok(frame)) => match frame.into_data() {
                            Ok(data) => {
                                let chunk = copy_to_bytes(data);
                                if chunk.is_empty() {
                                    continue;
                                }
                                match self.deflate_chunk(&chunk) {
                                    Ok(Some(frame)) => return Poll::Ready(Some(Ok(frame))),
                                    Ok(None) => {}
                                    Err(e) => {
                                        self.phase = Phase::Done;
                                        return Poll::Ready(Some(Err(e)));
                                    }
                                }
                            }
                            Err(frame) => {
                                // Trailers end the data stream; they are
                                // re-emitted after the compressed tail.
                                if let Ok(trailers) = frame.into_trailers() {
                                    self.pending_trailers = Some(trailers);
                                    self.phase = Phase::Finishing;
                                }
                            }
                        },
                    }
                }
            }
        }
    }

    /// Feeds one chunk through the encoder; `None` when deflate buffered
    /// all of it and produced no output yet.
    fn deflate_chunk(&mut self, input: &[u8]) -> Result<Option<Frame<Bytes>>, Error> {
        let mut out = Vec::new();
        self.encoder.write(input, &mut out)?;
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Frame::data(out.into())))
        }
    }
}

pub(crate) fn copy_to_bytes<D: Buf>(mut data: D) -> Bytes {
    data.copy_to_bytes(data.remaining())
}
