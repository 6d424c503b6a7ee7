//! Archives must be ordinary ZIP files: another ZIP implementation reads what
//! we write, and we read what it writes.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use tempfile::tempdir;
use xip::{ArchiveEngine, ArchiveError, ArchiveReader, EngineConfig, EngineError, StagedSource};
use zip::CompressionMethod;
use zip::write::FileOptions;

fn write_with_zip_crate(path: &Path, members: &[(&str, &[u8], CompressionMethod)], comment: &str) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data, method) in members {
        zip.start_file(*name, FileOptions::default().compression_method(*method))
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.set_comment(comment);
    zip.finish().unwrap();
}

#[tokio::test]
async fn zip_crate_reads_our_archives() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(src.join("nested")).unwrap();
    fs::write(src.join("text.txt"), "lorem ipsum ".repeat(500)).unwrap();
    fs::write(src.join("nested/bytes.bin"), [0u8, 1, 2, 3, 255]).unwrap();

    let archive = tmp.path().join("ours.xip");
    ArchiveEngine::new(EngineConfig::default())
        .create(&StagedSource::new([&src]), &archive, None)
        .await
        .unwrap();

    let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);

    let mut text = String::new();
    zip.by_name("src/text.txt").unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "lorem ipsum ".repeat(500));

    let member = zip.by_name("src/text.txt").unwrap();
    assert_eq!(member.compression(), CompressionMethod::Deflated);
    drop(member);

    let mut bytes = Vec::new();
    zip.by_name("src/nested/bytes.bin").unwrap().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, [0u8, 1, 2, 3, 255]);
}

#[tokio::test]
async fn we_read_zip_crate_archives() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("theirs.zip");
    let big = b"abcdefgh".repeat(4096);
    write_with_zip_crate(
        &archive,
        &[
            ("stored.txt", b"plain", CompressionMethod::Stored),
            ("dir/deflated.bin", &big, CompressionMethod::Deflated),
        ],
        "written by another tool",
    );

    let reader = ArchiveReader::open(&archive).await.unwrap();
    let names: Vec<_> = reader.member_names().collect();
    assert_eq!(names, ["stored.txt", "dir/deflated.bin"]);
    assert_eq!(reader.read_member("stored.txt").await.unwrap(), b"plain");
    assert_eq!(reader.read_member("dir/deflated.bin").await.unwrap(), big);

    let entry = reader.entry("dir/deflated.bin").unwrap();
    assert_eq!(entry.uncompressed_size, big.len() as u64);
    assert!(entry.compressed_size < entry.uncompressed_size);
}

#[tokio::test]
async fn extraction_refuses_escaping_names() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("evil.zip");
    write_with_zip_crate(
        &archive,
        &[("../escaped.txt", b"gotcha", CompressionMethod::Stored)],
        "",
    );

    let out = tmp.path().join("out");
    let err = ArchiveEngine::new(EngineConfig::default())
        .extract_all(&archive, &out, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ExtractFailed(ArchiveError::UnsafePath(_))), "{err}");
    assert!(!tmp.path().join("escaped.txt").exists());
}
