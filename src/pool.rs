use crate::codec::GzipEncoder;
use flate2::Compression;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

/// A shared pool of reusable gzip encoders.
///
/// Encoders are created lazily when a checkout finds the pool empty and
/// are handed back by the checkout guard's drop, rewound, so the next
/// request starts a clean stream while the deflate allocation is kept.
/// Clones share the same pool; the number of live encoders is bounded only
/// by the peak number of concurrent checkouts.
#[derive(Clone)]
pub struct GzipEncoderPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    level: Compression,
    idle: Mutex<Vec<GzipEncoder>>,
}

impl GzipEncoderPool {
    /// Creates an empty pool whose encoders compress at `level`.
    pub fn new(level: Compression) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                level,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The compression level of this pool's encoders.
    pub fn level(&self) -> Compression {
        self.inner.level
    }

    /// Checks an encoder out; the returned guard hands it back on drop.
    pub(crate) fn acquire(&self) -> PooledEncoder {
        let encoder = self
            .idle()
            .pop()
            .unwrap_or_else(|| GzipEncoder::new(self.inner.level));
        PooledEncoder {
            encoder: Some(encoder),
            pool: self.clone(),
        }
    }

    fn idle(&self) -> MutexGuard<'_, Vec<GzipEncoder>> {
        // Encoders are rewound before they re-enter the pool, so a
        // poisoning panic leaves no torn state behind.
        match self.inner.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_len(&self) -> usize {
        self.idle().len()
    }
}

impl Default for GzipEncoderPool {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl fmt::Debug for GzipEncoderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipEncoderPool")
            .field("level", &self.inner.level)
            .finish_non_exhaustive()
    }
}

/// Checkout guard; rewinds and returns the encoder when dropped.
///
/// Dropping happens on every exit path, including unwinding and a response
/// body abandoned mid-stream, so a checked-out encoder can never leak or
/// stay bound to a finished response.
pub(crate) struct PooledEncoder {
    encoder: Option<GzipEncoder>,
    pool: GzipEncoderPool,
}

impl Deref for PooledEncoder {
    type Target = GzipEncoder;

    fn deref(&self) -> &GzipEncoder {
        self.encoder.as_ref().expect("encoder present until drop")
    }
}

impl DerefMut for PooledEncoder {
    fn deref_mut(&mut self) -> &mut GzipEncoder {
        self.encoder.as_mut().expect("encoder present until drop")
    }
}

impl Drop for PooledEncoder {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.reset();
            self.pool.idle().push(encoder);
        }
    }
}

impl fmt::Debug for PooledEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEncoder").finish_non_exhaustive()
    }
}
