use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use http::{HeaderMap, header};
use std::fmt;

/// gzip member header: deflate method, no flags, no mtime, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];

/// Spare output capacity reserved per deflate step.
const OUTPUT_CHUNK: usize = 8 * 1024;

/// Returns true when any `Accept-Encoding` value declares gzip.
///
/// Every instance of the header is considered, and matching is
/// case-insensitive substring containment per value, so compound values
/// such as `br, gzip;q=0.8` are accepted. The flip side is that a value
/// like `supergzip` also matches; callers that need exact token matching
/// should parse the header themselves.
///
/// ```
/// use http::HeaderMap;
/// use http::header::ACCEPT_ENCODING;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(ACCEPT_ENCODING, "br;q=1.0, GZIP;q=0.8".parse().unwrap());
/// assert!(tower_gzip::accepts_gzip(&headers));
/// ```
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("gzip"))
}

/// Streaming gzip encoder with rewindable state.
///
/// Produces one gzip member: the header on the first `write`, a raw
/// deflate stream, and the CRC32/ISIZE trailer on `finish`. `reset`
/// rewinds the deflate state and checksum in place, so the instance can
/// encode another stream without giving up its allocation.
pub(crate) struct GzipEncoder {
    deflate: Compress,
    crc: Crc,
    header_written: bool,
}

impl GzipEncoder {
    pub(crate) fn new(level: Compression) -> Self {
        Self {
            deflate: Compress::new(level, false),
            crc: Crc::new(),
            header_written: false,
        }
    }

    /// Compresses `input` to the end of `out`.
    ///
    /// May append nothing when deflate buffers the whole chunk.
    pub(crate) fn write(
        &mut self,
        input: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), flate2::CompressError> {
        if !self.header_written {
            out.extend_from_slice(&GZIP_HEADER);
            self.header_written = true;
        }
        self.crc.update(input);

        let mut consumed = 0;
        while consumed < input.len() {
            let in_before = self.deflate.total_in();
            let out_before = out.len();
            out.reserve(OUTPUT_CHUNK);
            self.deflate
                .compress_vec(&input[consumed..], out, FlushCompress::None)?;
            consumed += (self.deflate.total_in() - in_before) as usize;
            if self.deflate.total_in() == in_before && out.len() == out_before {
                break;
            }
        }
        Ok(())
    }

    /// Flushes the deflate tail and appends the gzip trailer.
    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), flate2::CompressError> {
        if !self.header_written {
            out.extend_from_slice(&GZIP_HEADER);
            self.header_written = true;
        }
        loop {
            out.reserve(OUTPUT_CHUNK);
            let status = self.deflate.compress_vec(&[], out, FlushCompress::Finish)?;
            if matches!(status, Status::StreamEnd) {
                break;
            }
        }
        out.extend_from_slice(&self.crc.sum().to_le_bytes());
        out.extend_from_slice(&self.crc.amount().to_le_bytes());
        Ok(())
    }

    /// Rewinds to a fresh stream, keeping the deflate allocation.
    pub(crate) fn reset(&mut self) {
        self.deflate.reset();
        self.crc.reset();
        self.header_written = false;
    }
}

impl fmt::Debug for GzipEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipEncoder")
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}
