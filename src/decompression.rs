use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;

type ChainReader = Chain<Cursor<Vec<u8>>, File>;
type GzipReader = BufReader<MultiGzDecoder<ChainReader>>;
type ZstdReader = BufReader<zstd::Decoder<'static, BufReader<ChainReader>>>;
type PlainReader = BufReader<ChainReader>;

/// Streaming decompression wrapper for source files
/// Detects gzip (1F 8B 08) and zstd (28 B5 2F FD) compression using magic bytes
pub enum DecompressionReader {
    Gzip(GzipReader),
    Zstd(ZstdReader),
    /// Passthrough for non-compressed files
    Plain(PlainReader),
}

impl std::fmt::Debug for DecompressionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecompressionReader::Gzip(_) => write!(f, "DecompressionReader::Gzip"),
            DecompressionReader::Zstd(_) => write!(f, "DecompressionReader::Zstd"),
            DecompressionReader::Plain(_) => write!(f, "DecompressionReader::Plain"),
        }
    }
}

impl BufRead for DecompressionReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            DecompressionReader::Gzip(reader) => reader.fill_buf(),
            DecompressionReader::Zstd(reader) => reader.fill_buf(),
            DecompressionReader::Plain(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            DecompressionReader::Gzip(reader) => reader.consume(amt),
            DecompressionReader::Zstd(reader) => reader.consume(amt),
            DecompressionReader::Plain(reader) => reader.consume(amt),
        }
    }
}

impl Read for DecompressionReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            DecompressionReader::Gzip(reader) => reader.read(buf),
            DecompressionReader::Zstd(reader) => reader.read(buf),
            DecompressionReader::Plain(reader) => reader.read(buf),
        }
    }
}

fn is_gzip(head: &[u8]) -> bool {
    head.len() >= 3 && head[0] == 0x1F && head[1] == 0x8B && head[2] == 0x08
}

fn is_zstd(head: &[u8]) -> bool {
    head.len() >= 4 && head[0] == 0x28 && head[1] == 0xB5 && head[2] == 0x2F && head[3] == 0xFD
}

/// Read up to four bytes without giving up on short reads from pipes
fn read_head<R: Read>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(head[..filled].to_vec())
}

fn detect_compression_file(mut file: File) -> std::io::Result<DecompressionReader> {
    let head = read_head(&mut file)?;
    let gzip = is_gzip(&head);
    let zstd = is_zstd(&head);

    // Put the read bytes back in front using a cursor chain
    let chained = Cursor::new(head).chain(file);

    if gzip {
        Ok(DecompressionReader::Gzip(BufReader::new(
            MultiGzDecoder::new(chained),
        )))
    } else if zstd {
        let decoder = zstd::Decoder::new(chained)?;
        Ok(DecompressionReader::Zstd(BufReader::new(decoder)))
    } else {
        Ok(DecompressionReader::Plain(BufReader::new(chained)))
    }
}

/// Magic bytes detection for any Read type (used for stdin)
pub fn maybe_decompress<R: Read + Send + 'static>(
    mut reader: R,
) -> std::io::Result<Box<dyn Read + Send>> {
    let head = read_head(&mut reader)?;
    let gzip = is_gzip(&head);
    let zstd = is_zstd(&head);
    let chained = Cursor::new(head).chain(reader);

    if gzip {
        Ok(Box::new(MultiGzDecoder::new(chained)))
    } else if zstd {
        Ok(Box::new(zstd::Decoder::new(chained)?))
    } else {
        Ok(Box::new(chained))
    }
}

/// Stream that runs [`maybe_decompress`] on its first read.
///
/// Opening stdin this way never blocks; the magic bytes are read by whichever
/// thread consumes the stream.
pub struct DeferredDecompress<R> {
    pending: Option<R>,
    inner: Option<Box<dyn Read + Send>>,
}

impl<R> DeferredDecompress<R> {
    pub fn new(reader: R) -> Self {
        DeferredDecompress {
            pending: Some(reader),
            inner: None,
        }
    }
}

impl<R: Read + Send + 'static> Read for DeferredDecompress<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some(reader) = self.pending.take() {
            self.inner = Some(maybe_decompress(reader)?);
        }
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Err(std::io::Error::other(
                "source failed while detecting compression",
            )),
        }
    }
}

impl DecompressionReader {
    /// Open `path` with compression auto-detected from its magic bytes
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if let Some(extension) = path_ref.extension().and_then(|ext| ext.to_str()) {
            if extension.eq_ignore_ascii_case("zip") {
                return Err(anyhow!(
                    "ZIP sources are not supported, only gzip and zstd are decompressed on the fly. Extract it first: unzip {}",
                    path_ref.display()
                ));
            }
        }

        let file = File::open(path_ref)
            .with_context(|| format!("failed to open source {}", path_ref.display()))?;

        detect_compression_file(file)
            .with_context(|| format!("failed to detect compression of {}", path_ref.display()))
    }
}
