//! Archive container codec.
//!
//! Path-level entry points over the [`zip`](crate::zip) module: list an
//! archive, read members by name, and write a new archive. Readers and writers
//! own their file handles and release them when dropped, so every exit path
//! closes the archive.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, BufWriter};

use crate::error::{ArchiveError, IoResultExt, Result};
use crate::io::LocalFileReader;
use crate::zip::{CompressionMethod, DosDateTime, ZipExtractor, ZipFileEntry, ZipWriter};

/// Bytes read from a member source per write.
const COPY_CHUNK: usize = 64 * 1024;

/// One member of an archive, as captured when the archive was listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated member name; directories end with `/`.
    pub path: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub modified: NaiveDateTime,
    pub method: CompressionMethod,
    pub crc32: u32,
}

impl ArchiveEntry {
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }
}

impl From<&ZipFileEntry> for ArchiveEntry {
    fn from(entry: &ZipFileEntry) -> Self {
        Self {
            path: entry.file_name.clone(),
            uncompressed_size: entry.uncompressed_size,
            compressed_size: entry.compressed_size,
            modified: entry.last_modified.to_naive(),
            method: entry.compression_method,
            crc32: entry.crc32,
        }
    }
}

/// List the members of the archive at `path`, in central directory order.
pub async fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let reader = ArchiveReader::open(path).await?;
    Ok(reader.entries().collect())
}

/// An open archive, read by member name.
pub struct ArchiveReader {
    extractor: ZipExtractor<LocalFileReader>,
    entries: Vec<ZipFileEntry>,
    /// Member name to index in `entries`; a duplicated name resolves to its last copy.
    by_name: HashMap<String, usize>,
}

impl ArchiveReader {
    /// Open and index an archive. Fails with [`ArchiveError::NotAnArchive`]
    /// when the file is missing or is not a ZIP container.
    pub async fn open(path: &Path) -> Result<Self> {
        let extractor = ZipExtractor::new(Arc::new(LocalFileReader::new(path)?));
        let entries = extractor.list_files().await.map_err(|e| match e {
            ArchiveError::NotAnArchive(reason) => {
                ArchiveError::NotAnArchive(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.file_name.clone(), i))
            .collect();

        Ok(Self {
            extractor,
            entries,
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = ArchiveEntry> + '_ {
        self.entries.iter().map(ArchiveEntry::from)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.file_name.as_str())
    }

    fn lookup(&self, name: &str) -> Result<&ZipFileEntry> {
        self.by_name
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ArchiveError::MemberNotFound(name.to_string()))
    }

    pub fn entry(&self, name: &str) -> Result<ArchiveEntry> {
        self.lookup(name).map(ArchiveEntry::from)
    }

    /// Decompressed contents of a member. Directory members read as empty.
    pub async fn read_member(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.lookup(name)?;
        if entry.is_directory {
            return Ok(Vec::new());
        }
        self.extractor.extract_to_memory(entry).await
    }

    /// Stream one member to disk below `dest_dir`, preserving its relative
    /// path. Returns the path written.
    pub async fn extract_member(&self, name: &str, dest_dir: &Path) -> Result<PathBuf> {
        let entry = self.lookup(name)?;
        let target = member_destination(dest_dir, name)?;
        self.extractor.extract_to_file(entry, &target).await?;
        Ok(target)
    }
}

/// Resolve a member name below `dest_dir`, refusing names that are absolute
/// or climb out with `..`.
pub fn member_destination(dest_dir: &Path, name: &str) -> Result<PathBuf> {
    let unsafe_path = || ArchiveError::UnsafePath(name.to_string());
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(unsafe_path());
    }

    let mut target = dest_dir.to_path_buf();
    let mut depth = 0usize;
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            _ => {}
        }
        // Reject drive prefixes and anything else the platform treats specially.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => target.push(part),
            _ => return Err(unsafe_path()),
        }
        depth += 1;
    }

    if depth == 0 {
        return Err(unsafe_path());
    }
    Ok(target)
}

/// A new archive being written.
///
/// Output goes to a temporary file next to the destination and is renamed
/// into place by [`finish`](Self::finish). Dropping the writer without
/// finishing deletes the temporary file; the destination path is never left
/// holding a half-written archive.
pub struct ArchiveWriter {
    zip: ZipWriter<BufWriter<tokio::fs::File>>,
    temp: TempPath,
    dest: PathBuf,
}

impl ArchiveWriter {
    pub async fn create(dest: &Path, compression_level: u32) -> Result<Self> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix(".xip-").suffix(".partial");
        #[cfg(unix)]
        builder.permissions(archive_permissions(dest));
        let (file, temp) = builder.tempfile_in(dir).with_path(dir)?.into_parts();

        Ok(Self {
            zip: ZipWriter::new(BufWriter::new(tokio::fs::File::from_std(file)), compression_level),
            temp,
            dest: dest.to_path_buf(),
        })
    }

    /// Add a file member, streaming its contents from `source` until EOF.
    pub async fn write_member<S>(&mut self, name: &str, source: &mut S, modified: NaiveDateTime) -> Result<()>
    where
        S: AsyncRead + Unpin + ?Sized,
    {
        self.zip
            .start_member(name, DosDateTime::from_naive(modified))
            .await
            .with_path(&self.dest)?;

        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            // Read failures are reported against the member being written.
            let n = source.read(&mut buf).await.with_path(Path::new(name))?;
            if n == 0 {
                break;
            }
            self.zip.write_data(&buf[..n]).await.with_path(&self.dest)?;
        }
        self.zip.finish_member().await.with_path(&self.dest)
    }

    /// Copy member `name` of `reader` into this archive under the same name
    /// and timestamp, decoding and re-encoding it a chunk at a time.
    pub async fn copy_from(&mut self, reader: &ArchiveReader, name: &str) -> Result<()> {
        let entry = reader.lookup(name)?;
        self.zip
            .start_member(name, entry.last_modified)
            .await
            .with_path(&self.dest)?;

        let mut member = reader.extractor.open_member(entry).await?;
        while let Some(chunk) = member.next_chunk().await? {
            self.zip.write_data(&chunk).await.with_path(&self.dest)?;
        }
        self.zip.finish_member().await.with_path(&self.dest)
    }

    pub async fn write_directory(&mut self, name: &str, modified: NaiveDateTime) -> Result<()> {
        self.zip
            .add_directory(name, DosDateTime::from_naive(modified))
            .await
            .with_path(&self.dest)
    }

    /// Write the central directory and move the archive into place.
    pub async fn finish(self) -> Result<()> {
        let Self { zip, temp, dest } = self;
        let file = zip.finish().await.with_path(&dest)?.into_inner();
        file.sync_all().await.with_path(&dest)?;
        drop(file);

        temp.persist(&dest).map_err(|e| ArchiveError::Io {
            source: e.error,
            path: dest.clone(),
        })
    }
}

/// Mode for a finished archive: whatever the destination already has, or
/// `0o666` (less the umask) for a new file.
#[cfg(unix)]
fn archive_permissions(dest: &Path) -> std::fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(dest)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| std::fs::Permissions::from_mode(0o666))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_destination_stays_inside() {
        let base = Path::new("/out");
        assert_eq!(
            member_destination(base, "docs/sub/b.txt").unwrap(),
            Path::new("/out/docs/sub/b.txt")
        );
        assert_eq!(member_destination(base, "docs/").unwrap(), Path::new("/out/docs"));
        assert_eq!(member_destination(base, "./a//b").unwrap(), Path::new("/out/a/b"));
    }

    #[test]
    fn member_destination_rejects_escapes() {
        let base = Path::new("/out");
        for name in ["../evil", "a/../../evil", "/etc/passwd", "\\share\\x", "", "./"] {
            assert!(
                matches!(member_destination(base, name), Err(ArchiveError::UnsafePath(_))),
                "{name:?} should be rejected"
            );
        }
    }

    fn noon() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|d| d.and_hms_opt(12, 30, 44))
            .unwrap()
    }

    #[tokio::test]
    async fn directories_and_members_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mixed.xip");

        let mut writer = ArchiveWriter::create(&path, 6).await.unwrap();
        writer.write_directory("docs", noon()).await.unwrap();
        writer.write_directory("docs/empty/", noon()).await.unwrap();
        writer
            .write_member("docs/a.txt", &mut &b"hello"[..], noon())
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let entries = list_entries(&path).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(names, ["docs/", "docs/empty/", "docs/a.txt"]);
        assert!(entries[0].is_directory() && entries[1].is_directory());
        assert_eq!(entries[1].uncompressed_size, 0);
        assert_eq!(entries[2].modified, noon());

        let out = tmp.path().join("out");
        let reader = ArchiveReader::open(&path).await.unwrap();
        assert!(!reader.is_empty());
        reader.extract_member("docs/empty/", &out).await.unwrap();
        assert!(out.join("docs/empty").is_dir());
        assert!(reader.read_member("docs/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn copy_from_streams_between_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first.xip");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();

        let mut writer = ArchiveWriter::create(&first, 9).await.unwrap();
        writer.write_member("big.bin", &mut payload.as_slice(), noon()).await.unwrap();
        writer.finish().await.unwrap();

        let second = tmp.path().join("second.xip");
        let reader = ArchiveReader::open(&first).await.unwrap();
        let mut writer = ArchiveWriter::create(&second, 0).await.unwrap();
        writer.copy_from(&reader, "big.bin").await.unwrap();
        assert!(matches!(
            writer.copy_from(&reader, "missing").await,
            Err(ArchiveError::MemberNotFound(_))
        ));
        writer.finish().await.unwrap();

        let copy = ArchiveReader::open(&second).await.unwrap();
        let entry = copy.entry("big.bin").unwrap();
        assert_eq!(entry.method, CompressionMethod::Stored);
        assert_eq!(entry.modified, noon());
        assert_eq!(copy.read_member("big.bin").await.unwrap(), payload);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_archive_gets_default_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        // A plain file created the usual way shows what the umask allows.
        let reference = tmp.path().join("reference");
        std::fs::write(&reference, b"").unwrap();
        let default_mode = std::fs::metadata(&reference).unwrap().permissions().mode() & 0o777;

        let fresh = tmp.path().join("fresh.xip");
        ArchiveWriter::create(&fresh, 6).await.unwrap().finish().await.unwrap();
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, default_mode);

        let existing = tmp.path().join("existing.xip");
        std::fs::write(&existing, b"old").unwrap();
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o640)).unwrap();
        ArchiveWriter::create(&existing, 6).await.unwrap().finish().await.unwrap();
        let mode = std::fs::metadata(&existing).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640 & default_mode);
    }
}
