use flate2::write::DeflateDecoder;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{ArchiveError, IoResultExt, Result};
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Compressed bytes read from the archive per step.
const CHUNK_SIZE: usize = 64 * 1024;

/// ZIP member reader: decompresses and verifies individual entries.
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Start decoding a member. Fails for encrypted members and unknown methods.
    pub async fn open_member<'a>(&'a self, entry: &'a ZipFileEntry) -> Result<MemberReader<'a, R>> {
        if entry.is_encrypted() {
            return Err(ArchiveError::corrupt(
                &entry.file_name,
                "encrypted members are not supported",
            ));
        }
        let decoder = match entry.compression_method {
            CompressionMethod::Stored => Decoder::Stored,
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(Vec::new())),
            CompressionMethod::Unknown(method) => {
                return Err(ArchiveError::corrupt(
                    &entry.file_name,
                    format!("unsupported compression method {method}"),
                ));
            }
        };

        let data_offset = self.parser.get_data_offset(entry).await?;
        Ok(MemberReader {
            reader: &**self.parser.reader(),
            entry,
            next_offset: data_offset,
            remaining: entry.compressed_size,
            decoder: Some(decoder),
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            buf: Vec::new(),
        })
    }

    /// Decompress a member into memory and verify its CRC-32.
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut member = self.open_member(entry).await?;
        // Declared sizes are untrusted; grow past the first 64 MiB on demand.
        let mut data = Vec::with_capacity(entry.uncompressed_size.min(1 << 26) as usize);
        while let Some(chunk) = member.next_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Stream a member to `output_path`, creating parent directories and
    /// replacing any existing file. A member that fails verification midway
    /// leaves what was written so far.
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.with_path(parent)?;
            }
        }

        if entry.is_directory {
            return fs::create_dir_all(output_path).await.with_path(output_path);
        }

        let mut member = self.open_member(entry).await?;
        let mut file = fs::File::create(output_path).await.with_path(output_path)?;
        while let Some(chunk) = member.next_chunk().await? {
            file.write_all(&chunk).await.with_path(output_path)?;
        }
        file.flush().await.with_path(output_path)?;

        Ok(())
    }
}

enum Decoder {
    Stored,
    Deflate(DeflateDecoder<Vec<u8>>),
}

impl Decoder {
    fn feed(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Decoder::Stored => Ok(chunk.to_vec()),
            Decoder::Deflate(decoder) => {
                decoder.write_all(chunk)?;
                Ok(std::mem::take(decoder.get_mut()))
            }
        }
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Decoder::Stored => Ok(Vec::new()),
            Decoder::Deflate(decoder) => decoder.finish(),
        }
    }
}

/// Decoded contents of one member, pulled a chunk at a time.
///
/// Size and CRC-32 are checked as data arrives; the last chunk is only
/// handed out once the whole member verified.
pub struct MemberReader<'a, R: ReadAt> {
    reader: &'a R,
    entry: &'a ZipFileEntry,
    next_offset: u64,
    remaining: u64,
    /// `None` once the member is exhausted.
    decoder: Option<Decoder>,
    hasher: crc32fast::Hasher,
    produced: u64,
    buf: Vec<u8>,
}

impl<R: ReadAt> MemberReader<'_, R> {
    /// The next run of decoded bytes, possibly empty; `None` at the end.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.decoder.is_none() {
            return Ok(None);
        }

        if self.remaining > 0 {
            let n = self.remaining.min(CHUNK_SIZE as u64) as usize;
            self.buf.resize(n, 0);
            self.reader.read_exact_at(self.next_offset, &mut self.buf).await?;
            self.next_offset += n as u64;
            self.remaining -= n as u64;

            let decoded = match self.decoder.as_mut() {
                Some(decoder) => decoder.feed(&self.buf).map_err(|e| inflate_error(self.entry, e))?,
                None => Vec::new(),
            };
            return self.account(decoded).map(Some);
        }

        let tail = match self.decoder.take() {
            Some(decoder) => decoder.finish().map_err(|e| inflate_error(self.entry, e))?,
            None => return Ok(None),
        };
        let tail = self.account(tail)?;
        self.verify()?;
        Ok(Some(tail))
    }

    fn account(&mut self, decoded: Vec<u8>) -> Result<Vec<u8>> {
        self.produced += decoded.len() as u64;
        if self.produced > self.entry.uncompressed_size {
            return Err(ArchiveError::corrupt(
                &self.entry.file_name,
                format!(
                    "decoded more than the declared {} bytes",
                    self.entry.uncompressed_size
                ),
            ));
        }
        self.hasher.update(&decoded);
        Ok(decoded)
    }

    fn verify(&self) -> Result<()> {
        if self.produced != self.entry.uncompressed_size {
            return Err(ArchiveError::corrupt(
                &self.entry.file_name,
                format!(
                    "expected {} bytes, decoded {}",
                    self.entry.uncompressed_size, self.produced
                ),
            ));
        }
        let crc = self.hasher.clone().finalize();
        if crc != self.entry.crc32 {
            return Err(ArchiveError::corrupt(
                &self.entry.file_name,
                format!("CRC mismatch (stored {:08x}, computed {crc:08x})", self.entry.crc32),
            ));
        }
        Ok(())
    }
}

fn inflate_error(entry: &ZipFileEntry, e: io::Error) -> ArchiveError {
    ArchiveError::corrupt(&entry.file_name, format!("inflate failed: {e}"))
}
