use super::ReadAt;
use crate::error::{ArchiveError, IoResultExt, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Local file reader with random access support
pub struct LocalFileReader {
    file: std::fs::File,
    path: PathBuf,
    size: u64,
}

impl LocalFileReader {
    /// Open `path` for positional reads.
    ///
    /// A missing file or a directory is reported as [`ArchiveError::NotAnArchive`],
    /// any other failure as an I/O error.
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ArchiveError::not_an_archive(format!("{}: file not found", path.display()))
            }
            _ => ArchiveError::Io {
                source: e,
                path: path.to_path_buf(),
            },
        })?;
        let metadata = file.metadata().with_path(path)?;
        if !metadata.is_file() {
            return Err(ArchiveError::not_an_archive(format!(
                "{}: not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset).with_path(&self.path)
        }

        #[cfg(windows)]
        {
            // seek_read moves the cursor but every caller passes an explicit offset
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset).with_path(&self.path)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset)).with_path(&self.path)?;
            file.read(buf).with_path(&self.path)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}
