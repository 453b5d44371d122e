//! Archive safety: hostile inputs must be rejected before extraction.

use std::io::{Cursor, Write};

use bindery::error::{ReadError, SecurityError};
use bindery::prelude::*;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn unwrap_buffer(err: ReadError) -> ReadError {
    match err {
        ReadError::Buffer(inner) => *inner,
        other => other,
    }
}

#[test]
fn path_traversal_entry_is_rejected() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("mimetype", opts).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("../evil.txt", opts).unwrap();
    zip.write_all(b"gotcha").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = unwrap_buffer(read_epub_bytes(&bytes, &ReadOptions::default()).unwrap_err());
    match err {
        ReadError::Security(SecurityError::PathTraversal { path }) => {
            assert_eq!(path, "../evil.txt");
        }
        other => panic!("expected PathTraversal, got {other}"),
    }
}

#[test]
fn too_many_entries_is_rejected() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    for i in 0..10_001 {
        zip.start_file(format!("f{i}"), opts).unwrap();
    }
    let bytes = zip.finish().unwrap().into_inner();

    let err = unwrap_buffer(read_epub_bytes(&bytes, &ReadOptions::default()).unwrap_err());
    assert!(matches!(
        err,
        ReadError::Security(SecurityError::TooManyEntries { count: 10_001, .. })
    ));
}

#[test]
fn archive_without_container_is_missing_container() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("mimetype", opts).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = unwrap_buffer(read_epub_bytes(&bytes, &ReadOptions::default()).unwrap_err());
    assert!(matches!(err, ReadError::MissingContainer));
}

#[test]
fn container_without_rootfile_is_missing_package_path() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("META-INF/container.xml", opts).unwrap();
    zip.write_all(b"<container><rootfiles/></container>").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = unwrap_buffer(read_epub_bytes(&bytes, &ReadOptions::default()).unwrap_err());
    assert!(matches!(err, ReadError::MissingPackagePath));
}

#[test]
fn dangling_package_path_is_missing_package_document() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("META-INF/container.xml", opts).unwrap();
    zip.write_all(
        br#"<container><rootfiles><rootfile full-path="EPUB/package.opf"/></rootfiles></container>"#,
    )
    .unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = unwrap_buffer(read_epub_bytes(&bytes, &ReadOptions::default()).unwrap_err());
    assert!(matches!(err, ReadError::MissingPackageDocument(_)));
}
