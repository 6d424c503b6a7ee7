//! Streaming ZIP writer.
//!
//! A member is written as a placeholder local header followed by its data in
//! chunks. CRC-32 and sizes are computed as the data passes, then the local
//! header is rewritten in place, so neither data descriptors nor a full copy
//! of the member in memory are needed. The central directory and EOCD are
//! only written by [`ZipWriter::finish`]; an output abandoned before that
//! point is not a readable archive.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, SeekFrom, Write};
use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use super::structures::{CompressionMethod, DosDateTime, EndOfCentralDirectory, MemberHeader};

/// Largest value a ZIP32 size or offset field can hold.
const ZIP32_LIMIT: u64 = 0xFFFF_FFFF;
const MAX_ENTRIES: usize = 0xFFFF;

/// A member already written, kept for the central directory.
struct CentralRecord {
    header: MemberHeader,
    lfh_offset: u32,
}

/// The member currently receiving data.
struct OpenMember {
    header: MemberHeader,
    lfh_offset: u64,
    /// `None` when storing.
    encoder: Option<DeflateEncoder<Vec<u8>>>,
    hasher: crc32fast::Hasher,
    uncompressed: u64,
    compressed: u64,
}

pub struct ZipWriter<W: AsyncWrite + AsyncSeek + Unpin> {
    out: W,
    /// Bytes written so far; the offset of the next local header.
    offset: u64,
    records: Vec<CentralRecord>,
    current: Option<OpenMember>,
    level: Compression,
}

impl<W: AsyncWrite + AsyncSeek + Unpin> ZipWriter<W> {
    /// `level` is a zlib compression level, 0 (store) through 9.
    pub fn new(out: W, level: u32) -> Self {
        Self {
            out,
            offset: 0,
            records: Vec::new(),
            current: None,
            level: Compression::new(level.min(9)),
        }
    }

    /// Begin a file member. Any member still open is finished first.
    pub async fn start_member(&mut self, name: &str, modified: DosDateTime) -> io::Result<()> {
        self.finish_member().await?;

        let method = if self.level.level() > 0 {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Stored
        };
        let header = MemberHeader {
            file_name: name.to_string(),
            compression_method: method,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            modified,
            is_directory: false,
        };
        let lfh_offset = self.write_local_header(&header).await?;

        self.current = Some(OpenMember {
            encoder: (method == CompressionMethod::Deflate)
                .then(|| DeflateEncoder::new(Vec::new(), self.level)),
            header,
            lfh_offset,
            hasher: crc32fast::Hasher::new(),
            uncompressed: 0,
            compressed: 0,
        });
        Ok(())
    }

    /// Append a chunk to the member opened by [`start_member`](Self::start_member).
    pub async fn write_data(&mut self, chunk: &[u8]) -> io::Result<()> {
        let member = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::other("write_data called with no open member"))?;

        member.hasher.update(chunk);
        member.uncompressed += chunk.len() as u64;
        if member.uncompressed > ZIP32_LIMIT {
            return Err(too_large(format!("member '{}' exceeds 4 GiB", member.header.file_name)));
        }

        let written = match member.encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(chunk)?;
                let deflated = std::mem::take(encoder.get_mut());
                self.out.write_all(&deflated).await?;
                deflated.len()
            }
            None => {
                self.out.write_all(chunk).await?;
                chunk.len()
            }
        };
        member.compressed += written as u64;
        self.offset += written as u64;
        Ok(())
    }

    /// Flush the open member's compressor and patch its local header with
    /// the final CRC and sizes. Does nothing when no member is open.
    pub async fn finish_member(&mut self) -> io::Result<()> {
        let Some(mut member) = self.current.take() else {
            return Ok(());
        };

        if let Some(encoder) = member.encoder.take() {
            let tail = encoder.finish()?;
            self.out.write_all(&tail).await?;
            member.compressed += tail.len() as u64;
            self.offset += tail.len() as u64;
        }
        if member.compressed > ZIP32_LIMIT {
            return Err(too_large(format!("member '{}' exceeds 4 GiB", member.header.file_name)));
        }

        let mut header = member.header;
        header.crc32 = member.hasher.finalize();
        header.compressed_size = member.compressed as u32;
        header.uncompressed_size = member.uncompressed as u32;

        let end = self.offset;
        self.out.seek(SeekFrom::Start(member.lfh_offset)).await?;
        self.out.write_all(&header.local_header()?).await?;
        self.out.seek(SeekFrom::Start(end)).await?;

        self.records.push(CentralRecord {
            header,
            lfh_offset: member.lfh_offset as u32,
        });
        Ok(())
    }

    /// Write a whole file member from memory.
    pub async fn add_member(&mut self, name: &str, data: &[u8], modified: DosDateTime) -> io::Result<()> {
        self.start_member(name, modified).await?;
        self.write_data(data).await?;
        self.finish_member().await
    }

    /// Write a zero-length directory member; a trailing `/` is added if missing.
    pub async fn add_directory(&mut self, name: &str, modified: DosDateTime) -> io::Result<()> {
        self.finish_member().await?;

        let file_name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        let header = MemberHeader {
            file_name,
            compression_method: CompressionMethod::Stored,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            modified,
            is_directory: true,
        };
        let lfh_offset = self.write_local_header(&header).await?;
        self.records.push(CentralRecord {
            header,
            lfh_offset: lfh_offset as u32,
        });
        Ok(())
    }

    /// Check the ZIP32 limits and write `header` at the current offset.
    /// Returns where it was written.
    async fn write_local_header(&mut self, header: &MemberHeader) -> io::Result<u64> {
        if header.file_name.len() > u16::MAX as usize {
            return Err(too_large(format!("member name is {} bytes long", header.file_name.len())));
        }
        if self.records.len() >= MAX_ENTRIES {
            return Err(too_large(format!("archive cannot hold more than {MAX_ENTRIES} members")));
        }
        if self.offset > ZIP32_LIMIT {
            return Err(too_large("archive exceeds 4 GiB".to_string()));
        }

        let lfh_offset = self.offset;
        let local = header.local_header()?;
        self.out.write_all(&local).await?;
        self.offset += local.len() as u64;
        Ok(lfh_offset)
    }

    /// Finish any open member, write the central directory and EOCD, flush,
    /// and hand back the sink.
    pub async fn finish(mut self) -> io::Result<W> {
        self.finish_member().await?;

        let cd_offset = self.offset;
        let mut cd_size = 0u64;
        for record in &self.records {
            let central = record.header.central_header(record.lfh_offset)?;
            self.out.write_all(&central).await?;
            cd_size += central.len() as u64;
        }

        if cd_offset > ZIP32_LIMIT || cd_offset + cd_size > ZIP32_LIMIT {
            return Err(too_large("archive exceeds 4 GiB".to_string()));
        }

        let entries = self.records.len() as u16;
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        };
        self.out.write_all(&eocd.to_bytes()?).await?;
        self.out.flush().await?;
        Ok(self.out)
    }
}

fn too_large(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{msg} (ZIP64 output is not supported)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{CompressionMethod, ZipExtractor};
    use crate::io::ReadAt;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::Arc;

    /// In-memory archive for parser tests.
    struct MemReader(Vec<u8>);

    #[async_trait]
    impl ReadAt for MemReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> crate::error::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    async fn build(level: u32) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()), level);
        writer.add_directory("docs", DosDateTime::EPOCH).await.unwrap();
        writer
            .add_member("docs/a.txt", &b"hello".repeat(200), DosDateTime::EPOCH)
            .await
            .unwrap();
        writer.add_member("docs/empty", b"", DosDateTime::EPOCH).await.unwrap();
        writer.finish().await.unwrap().into_inner()
    }

    #[tokio::test]
    async fn written_archive_reads_back() {
        let extractor = ZipExtractor::new(Arc::new(MemReader(build(6).await)));
        let entries = extractor.list_files().await.unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["docs/", "docs/a.txt", "docs/empty"]);
        assert!(entries[0].is_directory);
        assert_eq!(entries[1].compression_method, CompressionMethod::Deflate);
        assert!(entries[1].compressed_size < entries[1].uncompressed_size);

        let data = extractor.extract_to_memory(&entries[1]).await.unwrap();
        assert_eq!(data, b"hello".repeat(200));
        assert!(extractor.extract_to_memory(&entries[2]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn level_zero_stores() {
        let extractor = ZipExtractor::new(Arc::new(MemReader(build(0).await)));
        let entries = extractor.list_files().await.unwrap();
        assert_eq!(entries[1].compression_method, CompressionMethod::Stored);
        assert_eq!(entries[1].compressed_size, 1000);
    }

    #[tokio::test]
    async fn chunked_member_patches_header() {
        let chunk: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()), 6);
        writer.start_member("big.bin", DosDateTime::EPOCH).await.unwrap();
        for _ in 0..8 {
            writer.write_data(&chunk).await.unwrap();
        }
        // Starting the next member finishes this one.
        writer.start_member("tail", DosDateTime::EPOCH).await.unwrap();
        writer.write_data(b"end").await.unwrap();
        let bytes = writer.finish().await.unwrap().into_inner();

        let expected = chunk.repeat(8);
        let extractor = ZipExtractor::new(Arc::new(MemReader(bytes)));
        let entries = extractor.list_files().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uncompressed_size, expected.len() as u64);
        assert_eq!(entries[0].crc32, crc32fast::hash(&expected));
        assert_eq!(extractor.extract_to_memory(&entries[0]).await.unwrap(), expected);
        assert_eq!(extractor.extract_to_memory(&entries[1]).await.unwrap(), b"end");
    }

    #[tokio::test]
    async fn write_data_without_member_fails() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()), 6);
        assert!(writer.write_data(b"orphan").await.is_err());
    }

    #[tokio::test]
    async fn corrupted_payload_fails_crc() {
        let mut bytes = build(0).await;
        // Stored payload of docs/a.txt starts right after its local header.
        let lfh_docs = 30 + "docs/".len();
        let payload = lfh_docs + 30 + "docs/a.txt".len();
        bytes[payload] ^= 0xFF;

        let extractor = ZipExtractor::new(Arc::new(MemReader(bytes)));
        let entries = extractor.list_files().await.unwrap();
        let err = extractor.extract_to_memory(&entries[1]).await.unwrap_err();
        assert!(err.to_string().contains("CRC mismatch"), "{err}");
    }

    #[tokio::test]
    async fn unfinished_archive_is_not_an_archive() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()), 6);
        writer.add_member("a", b"data", DosDateTime::EPOCH).await.unwrap();
        // Only local records: no central directory was written.
        let partial = writer.out.get_ref().clone();

        let extractor = ZipExtractor::new(Arc::new(MemReader(partial)));
        let err = extractor.list_files().await.unwrap_err();
        assert!(matches!(err, crate::error::ArchiveError::NotAnArchive(_)));
    }

    #[tokio::test]
    async fn archive_comment_is_skipped() {
        let mut bytes = build(6).await;
        // Patch the comment length and append a comment.
        let len = bytes.len();
        bytes[len - 2..].copy_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(b"comment");

        let extractor = ZipExtractor::new(Arc::new(MemReader(bytes)));
        assert_eq!(extractor.list_files().await.unwrap().len(), 3);
    }
}
