//! Filesystem paths staged for a new archive.

use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::codec::ArchiveEntry;
use crate::error::{IoResultExt, Result};
use crate::zip::CompressionMethod;

/// Files and directories chosen by the user but not yet archived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedSource {
    paths: Vec<PathBuf>,
}

/// One regular file and the member name it will be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    pub arcname: String,
}

impl StagedSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Expand every staged path into the files an archive would contain,
    /// in the order they would be written.
    ///
    /// A plain file is stored under its base name. A directory is walked
    /// recursively (following symlinks, siblings in name order) and each file
    /// is named relative to the directory's parent, so the directory itself
    /// becomes the top-level folder. Empty directories contribute nothing.
    pub fn resolve(&self) -> Result<Vec<StagedFile>> {
        let mut files = Vec::new();
        for path in &self.paths {
            let metadata = std::fs::metadata(path).with_path(path)?;
            if metadata.is_dir() {
                walk_directory(path, &mut files)?;
            } else {
                let arcname = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned());
                files.push(StagedFile {
                    source: path.clone(),
                    arcname,
                });
            }
        }
        Ok(files)
    }

    /// The staged files as archive entries, for browsing before the archive
    /// exists. Sizes are uncompressed; nothing has been compressed yet.
    pub fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        self.resolve()?
            .into_iter()
            .map(|file| {
                let metadata = std::fs::metadata(&file.source).with_path(&file.source)?;
                Ok(ArchiveEntry {
                    path: file.arcname,
                    uncompressed_size: metadata.len(),
                    compressed_size: metadata.len(),
                    modified: modified_time(&metadata),
                    method: CompressionMethod::Stored,
                    crc32: 0,
                })
            })
            .collect()
    }
}

fn walk_directory(dir: &Path, files: &mut Vec<StagedFile>) -> Result<()> {
    // "." or ".." have no name of their own; resolve them so the folder keeps one.
    let dir = match dir.file_name() {
        Some(_) => dir.to_path_buf(),
        None => std::fs::canonicalize(dir).with_path(dir)?,
    };
    let base = dir.parent().unwrap_or(&dir);

    for entry in WalkDir::new(&dir).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(base).unwrap_or(entry.path());
        files.push(StagedFile {
            source: entry.path().to_path_buf(),
            arcname: to_member_name(relative),
        });
    }
    Ok(())
}

/// Join path components with `/` whatever the platform separator is.
fn to_member_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Local wall-clock modification time, as ZIP timestamps carry no zone.
pub(crate) fn modified_time(metadata: &Metadata) -> NaiveDateTime {
    metadata
        .modified()
        .map(|t| DateTime::<Local>::from(t).naive_local())
        .unwrap_or_else(|_| Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn directory_sources_keep_their_name() {
        let tmp = tempdir().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(docs.join("sub")).unwrap();
        fs::create_dir_all(docs.join("empty")).unwrap();
        fs::write(docs.join("a.txt"), "hello").unwrap();
        fs::write(docs.join("sub/b.txt"), "abc").unwrap();
        let loose = tmp.path().join("loose.bin");
        fs::write(&loose, [1, 2, 3]).unwrap();

        let staged = StagedSource::new([docs.clone(), loose.clone()]);
        let names: Vec<_> = staged.resolve().unwrap().into_iter().map(|f| f.arcname).collect();
        assert_eq!(names, ["docs/a.txt", "docs/sub/b.txt", "loose.bin"]);
    }

    #[test]
    fn staged_entries_report_sizes() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("one.txt");
        fs::write(&file, "12345").unwrap();

        let entries = StagedSource::new([&file]).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "one.txt");
        assert_eq!(entries[0].uncompressed_size, 5);
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = tempdir().unwrap();
        let staged = StagedSource::new([tmp.path().join("nope")]);
        assert!(staged.resolve().is_err());
    }

    #[test]
    fn member_names_use_forward_slashes() {
        let rel: PathBuf = ["a", "b", "c.txt"].iter().collect();
        assert_eq!(to_member_name(&rel), "a/b/c.txt");
    }
}
