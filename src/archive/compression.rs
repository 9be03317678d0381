// Per-entry payload compression for the package container.
//
// Provides a pluggable `CompressBackend` trait with built-in implementations:
//   - LZMA (via lzma-rs, feature-gated `lzma`)
//   - Zlib/Deflate (via flate2, feature-gated `zlib`)
//   - NoCompression (passthrough)
//   - External/custom compressors via the trait
//
// The archive header stores one compressor ID for the whole payload:
//   ID 0 = stored
//   ID 2 = LZMA
//   ID 3 = Zlib
//
// An entry is stored compressed only when that makes it strictly smaller, so
// `stored_len < size` in the entry table means "compressed". Decompression is
// streamed and never produces more than the recorded `size`.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::error::ArchiveError;

/// Compressor ID for stored (uncompressed) payloads.
pub const STORED_ID: u8 = 0;
/// Compressor ID for LZMA.
pub const LZMA_ID: u8 = 2;
/// Compressor ID for Zlib/Deflate.
pub const ZLIB_ID: u8 = 3;

/// Minimum entry size worth compressing.
const MIN_COMPRESS_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// CompressBackend trait
// ---------------------------------------------------------------------------

/// A pluggable compressor for payload entries.
///
/// # Implementing a custom backend
///
/// ```no_run
/// use pkgdelta::archive::compression::CompressBackend;
/// use pkgdelta::error::ArchiveError;
///
/// struct MyCompressor;
///
/// impl CompressBackend for MyCompressor {
///     fn id(&self) -> u8 { 42 }
///     fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
///         Ok(data.to_vec()) // placeholder
///     }
///     fn decompress(
///         &self,
///         input: &mut dyn std::io::Read,
///         output: &mut dyn std::io::Write,
///         _size: u64,
///     ) -> Result<(), ArchiveError> {
///         std::io::copy(input, output)?; // placeholder
///         Ok(())
///     }
/// }
/// ```
///
/// Archives are read back through [`backend_for_id`], so a custom backend can
/// only be written under one of the built-in IDs (see [`is_readable_id`]).
pub trait CompressBackend: Send + Sync {
    /// The compressor ID stored in the archive header.
    fn id(&self) -> u8;

    /// Compress an entry. Returns compressed bytes.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Stream-decompress an entry previously compressed by `compress()`.
    ///
    /// `size` is the uncompressed length from the entry table. `output`
    /// rejects writes past it, so implementations must not buffer more than
    /// that themselves.
    fn decompress(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        size: u64,
    ) -> Result<(), ArchiveError>;

    /// Whether this entry is worth compressing. Default: skip if < 32 bytes.
    fn should_compress(&self, data: &[u8]) -> bool {
        data.len() >= MIN_COMPRESS_SIZE
    }
}

// ---------------------------------------------------------------------------
// LZMA backend
// ---------------------------------------------------------------------------

/// LZMA compressor (ID 2).
#[cfg(feature = "lzma")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LzmaBackend;

#[cfg(feature = "lzma")]
impl CompressBackend for LzmaBackend {
    fn id(&self) -> u8 {
        LZMA_ID
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut input = io::Cursor::new(data);
        let mut output = Vec::new();
        lzma_rs::lzma_compress(&mut input, &mut output)?;
        Ok(output)
    }

    fn decompress(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        size: u64,
    ) -> Result<(), ArchiveError> {
        // The dictionary buffer grows with the output; cap it at the entry size.
        let options = lzma_rs::decompress::Options {
            memlimit: Some(usize::try_from(size).unwrap_or(usize::MAX).saturating_add(1)),
            ..Default::default()
        };
        let mut input = io::BufReader::new(input);
        let mut sink = output;
        lzma_rs::lzma_decompress_with_options(&mut input, &mut sink, &options).map_err(
            |e| match e {
                lzma_rs::error::Error::IoError(e) => decode_error("LZMA", e),
                e => ArchiveError::Invalid(format!("LZMA decompression failed: {e}")),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Zlib backend
// ---------------------------------------------------------------------------

/// Zlib/Deflate compressor (ID 3).
///
/// Uses zlib format (deflate + zlib header), not raw deflate,
/// so the stream is self-describing and includes a checksum.
#[cfg(feature = "zlib")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibBackend {
    level: flate2::Compression,
}

#[cfg(feature = "zlib")]
impl ZlibBackend {
    /// Create a Zlib backend with the given compression level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level),
        }
    }
}

#[cfg(feature = "zlib")]
impl Default for ZlibBackend {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(feature = "zlib")]
impl CompressBackend for ZlibBackend {
    fn id(&self) -> u8 {
        ZLIB_ID
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::write::ZlibEncoder;

        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        _size: u64,
    ) -> Result<(), ArchiveError> {
        let mut decoder = flate2::read::ZlibDecoder::new(input);
        io::copy(&mut decoder, output).map_err(|e| decode_error("Zlib", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// No-compression backend
// ---------------------------------------------------------------------------

/// Passthrough "compressor" that stores entries as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl CompressBackend for NoCompression {
    fn id(&self) -> u8 {
        STORED_ID
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        _size: u64,
    ) -> Result<(), ArchiveError> {
        io::copy(input, output)?;
        Ok(())
    }

    fn should_compress(&self, _data: &[u8]) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Entry-level helpers
// ---------------------------------------------------------------------------

/// Compress a single entry, keeping the compressed form only if it is
/// strictly smaller than the input.
pub fn compress_entry(backend: &dyn CompressBackend, data: &[u8]) -> io::Result<Vec<u8>> {
    if !backend.should_compress(data) {
        return Ok(data.to_vec());
    }

    let compressed = backend.compress(data)?;

    if compressed.len() < data.len() {
        Ok(compressed)
    } else {
        Ok(data.to_vec())
    }
}

/// Reverse of [`compress_entry`]: streams `stored_len` bytes from `input`
/// into `output`, decompressing unless the entry was stored raw. `size` is the
/// uncompressed length recorded in the entry table; producing more or fewer
/// bytes is an error, and decoding stops as soon as the limit is passed.
pub fn decompress_entry(
    backend: &dyn CompressBackend,
    input: &mut dyn Read,
    stored_len: u64,
    size: u64,
    output: &mut dyn Write,
) -> Result<(), ArchiveError> {
    let mut input = input.take(stored_len);
    let mut bounded = BoundedWriter {
        inner: output,
        written: 0,
        limit: size,
    };

    if stored_len == size {
        io::copy(&mut input, &mut bounded)?;
        if bounded.written != size {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("entry truncated after {} of {size} bytes", bounded.written),
            )));
        }
    } else {
        backend.decompress(&mut input, &mut bounded, size)?;
        if bounded.written != size {
            return Err(ArchiveError::Invalid(format!(
                "entry decompressed to {} bytes, expected {size}",
                bounded.written
            )));
        }
    }
    Ok(())
}

/// Forwards to `inner` but fails once more than `limit` bytes are written.
struct BoundedWriter<'a> {
    inner: &'a mut dyn Write,
    written: u64,
    limit: u64,
}

impl Write for BoundedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry exceeds its recorded size of {} bytes", self.limit),
            ));
        }
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Corrupt streams are format errors; anything else came from the sink.
fn decode_error(codec: &str, e: io::Error) -> ArchiveError {
    match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            ArchiveError::Invalid(format!("{codec} decompression failed: {e}"))
        }
        _ => ArchiveError::Io(e),
    }
}

/// Look up a decompression backend by the compressor ID in the header.
pub fn backend_for_id(id: u8) -> Result<Box<dyn CompressBackend>, ArchiveError> {
    match id {
        STORED_ID => Ok(Box::new(NoCompression)),

        #[cfg(feature = "lzma")]
        LZMA_ID => Ok(Box::new(LzmaBackend)),

        #[cfg(not(feature = "lzma"))]
        LZMA_ID => Err(ArchiveError::Unsupported(
            "LZMA payloads require the 'lzma' feature".into(),
        )),

        #[cfg(feature = "zlib")]
        ZLIB_ID => Ok(Box::new(ZlibBackend::default())),

        #[cfg(not(feature = "zlib"))]
        ZLIB_ID => Err(ArchiveError::Unsupported(
            "Zlib payloads require the 'zlib' feature".into(),
        )),

        id => Err(ArchiveError::Unsupported(format!(
            "unsupported compressor ID: {id}"
        ))),
    }
}

/// Whether archives written under compressor `id` can be opened by this build.
pub fn is_readable_id(id: u8) -> bool {
    backend_for_id(id).is_ok()
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// The payload compression algorithm to write with.
#[derive(Clone, Default)]
pub enum PayloadCompression {
    /// Store entries uncompressed.
    #[default]
    None,
    /// LZMA (ID 2).
    #[cfg(feature = "lzma")]
    Lzma,
    /// Zlib/Deflate (ID 3).
    #[cfg(feature = "zlib")]
    Zlib {
        /// Zlib compression level (0-9). Default: 6.
        level: u32,
    },
    /// A custom backend provided by the caller.
    Custom(Arc<dyn CompressBackend>),
}

impl std::fmt::Debug for PayloadCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            #[cfg(feature = "lzma")]
            Self::Lzma => write!(f, "Lzma"),
            #[cfg(feature = "zlib")]
            Self::Zlib { level } => write!(f, "Zlib {{ level: {level} }}"),
            Self::Custom(b) => write!(f, "Custom(id={})", b.id()),
        }
    }
}

impl PayloadCompression {
    /// Return the backend implementation.
    pub fn backend(&self) -> Box<dyn CompressBackend> {
        match self {
            Self::None => Box::new(NoCompression),
            #[cfg(feature = "lzma")]
            Self::Lzma => Box::new(LzmaBackend),
            #[cfg(feature = "zlib")]
            Self::Zlib { level } => Box::new(ZlibBackend::new(*level)),
            Self::Custom(b) => Box::new(ArcBackend(b.clone())),
        }
    }

    /// The writer setting matching a header compressor ID, if built in.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            STORED_ID => Some(Self::None),
            #[cfg(feature = "lzma")]
            LZMA_ID => Some(Self::Lzma),
            #[cfg(feature = "zlib")]
            ZLIB_ID => Some(Self::Zlib { level: 6 }),
            _ => None,
        }
    }
}

/// Wrapper to make `Arc<dyn CompressBackend>` implement `CompressBackend`.
struct ArcBackend(Arc<dyn CompressBackend>);

impl CompressBackend for ArcBackend {
    fn id(&self) -> u8 {
        self.0.id()
    }
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        self.0.compress(data)
    }
    fn decompress(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        size: u64,
    ) -> Result<(), ArchiveError> {
        self.0.decompress(input, output, size)
    }
    fn should_compress(&self, data: &[u8]) -> bool {
        self.0.should_compress(data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
