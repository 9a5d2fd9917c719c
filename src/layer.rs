use crate::pool::GzipEncoderPool;
use crate::service::GzipService;
use flate2::Compression;
use tower::Layer;

/// A Tower layer that gzip-compresses HTTP response bodies.
///
/// The layer owns the encoder pool; every service it produces shares that
/// pool, so concurrent requests across all wrapped routes reuse the same
/// warmed-up encoders.
#[derive(Debug, Clone)]
pub struct GzipLayer {
    pool: GzipEncoderPool,
}

impl GzipLayer {
    /// Creates a layer with its own pool at the default compression level.
    pub fn new() -> Self {
        Self {
            pool: GzipEncoderPool::default(),
        }
    }

    /// Sets the compression level by giving the layer a fresh pool.
    pub fn level(self, level: Compression) -> Self {
        Self {
            pool: GzipEncoderPool::new(level),
        }
    }

    /// Uses `pool` instead of the layer's own, sharing encoders with every
    /// other layer built from the same pool.
    pub fn with_pool(self, pool: GzipEncoderPool) -> Self {
        Self { pool }
    }
}

impl Default for GzipLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for GzipLayer {
    type Service = GzipService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GzipService::new(inner, self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_replaces_the_pool() {
        let layer = GzipLayer::new().level(Compression::best());
        assert_eq!(layer.pool.level(), Compression::best());
    }

    #[test]
    fn services_share_the_layer_pool() {
        let pool = GzipEncoderPool::default();
        let layer = GzipLayer::new().with_pool(pool.clone());
        let _a: GzipService<()> = layer.layer(());
        let _b: GzipService<()> = layer.layer(());
        drop(pool.acquire());
        assert_eq!(pool.idle_len(), 1);
    }
}
