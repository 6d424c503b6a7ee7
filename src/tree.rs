//! Folder-style view over a flat member list.
//!
//! Archives store a flat list of `/`-separated names. [`project`] turns that
//! list into the children of one directory level, synthesizing folders that
//! only exist as shared prefixes of deeper members. Nodes are rebuilt on
//! every navigation and carry no state between calls.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::codec::ArchiveEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The synthetic `..` entry leading to the parent prefix.
    Up,
    Directory,
    File,
}

/// One row of a projected directory level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTreeNode {
    pub name: String,
    pub kind: NodeKind,
    /// Full member path; directories end with `/`. For the up node this is
    /// the parent prefix (empty for the root).
    pub full_path: String,
    /// Size and timestamp of the entry whose path is exactly `full_path`.
    /// `None` for folders synthesized from deeper members.
    pub size: Option<u64>,
    pub modified: Option<NaiveDateTime>,
}

impl PathTreeNode {
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory | NodeKind::Up)
    }

    pub fn is_up(&self) -> bool {
        self.kind == NodeKind::Up
    }
}

/// Project the children of `prefix` (empty for the root, otherwise ending
/// in `/`), sorted by name in byte order, after an up node when `prefix` is
/// not the root.
pub fn project(entries: &[ArchiveEntry], prefix: &str) -> Vec<PathTreeNode> {
    // child name -> is_directory; the first entry seen for a name decides.
    let mut children: BTreeMap<&str, bool> = BTreeMap::new();

    for entry in entries {
        let Some(rest) = entry.path.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() || rest == "/" {
            continue;
        }
        let mut segments = rest.splitn(2, '/');
        let child = segments.next().unwrap_or_default();
        let nested = segments.next().is_some_and(|tail| !tail.is_empty());
        let is_directory = nested || entry.path.ends_with('/');
        children.entry(child).or_insert(is_directory);
    }

    let mut nodes = Vec::with_capacity(children.len() + 1);
    if !prefix.is_empty() {
        nodes.push(PathTreeNode {
            name: "..".to_string(),
            kind: NodeKind::Up,
            full_path: parent_prefix(prefix),
            size: None,
            modified: None,
        });
    }

    for (name, is_directory) in children {
        let full_path = if is_directory {
            format!("{prefix}{name}/")
        } else {
            format!("{prefix}{name}")
        };
        let exact = entries.iter().find(|e| e.path == full_path);
        nodes.push(PathTreeNode {
            name: name.to_string(),
            kind: if is_directory {
                NodeKind::Directory
            } else {
                NodeKind::File
            },
            size: exact.map(|e| e.uncompressed_size),
            modified: exact.map(|e| e.modified),
            full_path,
        });
    }

    nodes
}

/// The prefix one level above `prefix`: `"a/b/"` becomes `"a/"`, `"a/"` becomes `""`.
pub fn parent_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => String::new(),
    }
}

/// Human-readable size with one decimal, blank for zero.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size == 0 {
        return String::new();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::CompressionMethod;
    use chrono::NaiveDate;

    fn entry(path: &str, size: u64) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            uncompressed_size: size,
            compressed_size: size,
            modified: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 6)
                .unwrap(),
            method: CompressionMethod::Deflate,
            crc32: 0,
        }
    }

    fn names(nodes: &[PathTreeNode]) -> Vec<(&str, NodeKind)> {
        nodes.iter().map(|n| (n.name.as_str(), n.kind)).collect()
    }

    #[test]
    fn root_level_synthesizes_folders() {
        let entries = [entry("docs/a.txt", 5), entry("docs/sub/b.txt", 3), entry("readme", 1)];
        let nodes = project(&entries, "");
        assert_eq!(
            names(&nodes),
            [("docs", NodeKind::Directory), ("readme", NodeKind::File)]
        );
        assert_eq!(nodes[0].full_path, "docs/");
        assert_eq!(nodes[0].size, None);
        assert_eq!(nodes[1].size, Some(1));
    }

    #[test]
    fn nested_level_has_up_node() {
        let entries = [entry("docs/sub/b.txt", 3), entry("docs/a.txt", 5)];
        let nodes = project(&entries, "docs/");
        assert_eq!(
            names(&nodes),
            [
                ("..", NodeKind::Up),
                ("a.txt", NodeKind::File),
                ("sub", NodeKind::Directory)
            ]
        );
        assert_eq!(nodes[0].full_path, "");
        assert_eq!(nodes[1].full_path, "docs/a.txt");
        assert_eq!(nodes[1].size, Some(5));
        assert_eq!(nodes[2].full_path, "docs/sub/");
    }

    #[test]
    fn explicit_directory_entries() {
        let entries = [entry("docs/", 0), entry("docs/empty/", 0), entry("docs/a", 1)];

        let root = project(&entries, "");
        assert_eq!(names(&root), [("docs", NodeKind::Directory)]);
        // The directory entry itself matches the node's full path.
        assert_eq!(root[0].size, Some(0));

        let docs = project(&entries, "docs/");
        assert_eq!(
            names(&docs),
            [
                ("..", NodeKind::Up),
                ("a", NodeKind::File),
                ("empty", NodeKind::Directory)
            ]
        );
    }

    #[test]
    fn sorting_is_bytewise() {
        let entries = [entry("b", 1), entry("B", 1), entry("a", 1), entry("_", 1)];
        let order: Vec<_> = project(&entries, "").into_iter().map(|n| n.name).collect();
        assert_eq!(order, ["B", "_", "a", "b"]);
    }

    #[test]
    fn first_occurrence_decides_kind() {
        // "x" appears first as a plain file, then as a folder prefix.
        let entries = [entry("x", 1), entry("x/y", 1)];
        let nodes = project(&entries, "");
        assert_eq!(names(&nodes), [("x", NodeKind::File)]);
    }

    #[test]
    fn projection_is_deterministic() {
        let entries = [entry("d/2", 1), entry("d/1", 1), entry("e/f/g", 1)];
        assert_eq!(project(&entries, "d/"), project(&entries, "d/"));
        assert_eq!(project(&entries, "e/"), project(&entries, "e/"));
    }

    #[test]
    fn parent_prefixes() {
        assert_eq!(parent_prefix("a/b/"), "a/");
        assert_eq!(parent_prefix("a/"), "");
        assert_eq!(parent_prefix(""), "");
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(format_size(0), "");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
