//! Bodies of the mutating archive operations.
//!
//! Each body opens what it needs, reports its total before touching any
//! member, and increments once per member. Errors propagate on the first
//! failure; files extracted before it stay on disk.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use super::OpContext;
use super::staging::{StagedSource, modified_time};
use crate::codec::{ArchiveReader, ArchiveWriter};
use crate::error::{IoResultExt, Result};

pub(super) async fn create(sources: &StagedSource, dest: &Path, ctx: &mut OpContext<'_>) -> Result<()> {
    let files = sources.resolve()?;
    ctx.total(files.len());

    let mut writer = ArchiveWriter::create(dest, ctx.compression_level).await?;
    for file in &files {
        let mut source = tokio::fs::File::open(&file.source).await.with_path(&file.source)?;
        let metadata = source.metadata().await.with_path(&file.source)?;
        writer
            .write_member(&file.arcname, &mut source, modified_time(&metadata))
            .await?;
        debug!(member = %file.arcname, bytes = metadata.len(), "added");
        ctx.increment();
    }
    writer.finish().await
}

pub(super) async fn extract_all(archive: &Path, dest_dir: &Path, ctx: &mut OpContext<'_>) -> Result<()> {
    let reader = ArchiveReader::open(archive).await?;
    ctx.total(reader.len());

    tokio::fs::create_dir_all(dest_dir).await.with_path(dest_dir)?;
    for name in reader.member_names() {
        let written = reader.extract_member(name, dest_dir).await?;
        debug!(member = name, path = %written.display(), "extracted");
        ctx.increment();
    }
    Ok(())
}

/// `members` are exact names; folder names are not expanded here.
pub(super) async fn extract_subset(
    archive: &Path,
    members: &[String],
    dest_dir: &Path,
    ctx: &mut OpContext<'_>,
) -> Result<()> {
    let reader = ArchiveReader::open(archive).await?;
    ctx.total(members.len());

    tokio::fs::create_dir_all(dest_dir).await.with_path(dest_dir)?;
    for name in members {
        let written = reader.extract_member(name, dest_dir).await?;
        debug!(member = %name, path = %written.display(), "extracted");
        ctx.increment();
    }
    Ok(())
}

/// Expand selectors into the set of member names they cover. A selector
/// ending in `/` covers every member under that prefix; anything else names
/// one member exactly and is kept even when absent, so the copy reports it.
fn expand_selectors(reader: &ArchiveReader, selectors: &[String]) -> BTreeSet<String> {
    let mut selected = BTreeSet::new();
    for selector in selectors {
        if selector.ends_with('/') {
            selected.extend(
                reader
                    .member_names()
                    .filter(|name| name.starts_with(selector.as_str()))
                    .map(str::to_string),
            );
        } else {
            selected.insert(selector.clone());
        }
    }
    selected
}

pub(super) async fn repack_subset(
    source: &Path,
    selectors: &[String],
    dest: &Path,
    ctx: &mut OpContext<'_>,
) -> Result<()> {
    let reader = ArchiveReader::open(source).await?;
    let selected = expand_selectors(&reader, selectors);
    ctx.total(selected.len());

    let mut writer = ArchiveWriter::create(dest, ctx.compression_level).await?;
    // BTreeSet iteration is sorted, so equal selections give equal archives.
    for name in &selected {
        // Directory markers are counted but carry nothing to copy.
        if !name.ends_with('/') {
            writer.copy_from(&reader, name).await?;
            debug!(member = %name, "copied");
        }
        ctx.increment();
    }
    writer.finish().await
}
