//! Serialization pipeline: publication → conformant EPUB archive.

use std::io::{Cursor, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{EpubError, WriteError};
use crate::publication::{EpubVersion, Publication};
use crate::{nav, ncx, opf, xhtml};

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Run structural validation first and refuse to emit on errors.
    pub validate: bool,
    /// DEFLATE level for everything but the mimetype entry (0-9).
    pub compression: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            validate: true,
            compression: 9,
        }
    }
}

/// Serialize to in-memory archive bytes.
pub fn write_epub_bytes(
    publication: &Publication,
    version: EpubVersion,
    opts: &ExportOptions,
) -> Result<Vec<u8>, EpubError> {
    let mut cursor = Cursor::new(Vec::new());
    write_epub(publication, version, opts, &mut cursor)?;
    Ok(cursor.into_inner())
}

/// Serialize to any seekable sink.
pub fn write_epub<W: Write + Seek>(
    publication: &Publication,
    version: EpubVersion,
    opts: &ExportOptions,
    writer: W,
) -> Result<(), EpubError> {
    if opts.validate {
        let report = publication.validate();
        if !report.is_valid {
            return Err(WriteError::ValidationRejected {
                errors: report.errors,
            }
            .into());
        }
    }

    let mut zip = ZipWriter::new(writer);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(opts.compression.min(9) as i64));

    // 1. mimetype first, uncompressed (reading systems sniff it at a
    //    fixed offset)
    zip.start_file("mimetype", stored).map_err(WriteError::zip)?;
    zip.write_all(b"application/epub+zip")
        .map_err(WriteError::from)?;

    // 2. container bootstrap
    zip.start_file("META-INF/container.xml", deflated)
        .map_err(WriteError::zip)?;
    zip.write_all(CONTAINER_XML.as_bytes())
        .map_err(WriteError::from)?;

    // 3. stylesheets
    for stylesheet in publication.get_all_stylesheets() {
        zip.start_file(format!("EPUB/{}", stylesheet.filename), deflated)
            .map_err(WriteError::zip)?;
        zip.write_all(stylesheet.content.as_bytes())
            .map_err(WriteError::from)?;
    }

    // 4. chapter documents, reading order
    for chapter in publication.spine_chapters() {
        zip.start_file(format!("EPUB/{}", chapter.filename), deflated)
            .map_err(WriteError::zip)?;
        let markup = xhtml::emit_chapter(publication, chapter, version);
        zip.write_all(markup.as_bytes()).map_err(WriteError::from)?;
    }

    // 5. images
    for image in publication.get_all_images() {
        zip.start_file(format!("EPUB/{}", image.filename), deflated)
            .map_err(WriteError::zip)?;
        zip.write_all(&image.data).map_err(WriteError::from)?;
    }

    // 6. navigation, one format per version
    match version {
        EpubVersion::V3 => {
            zip.start_file(format!("EPUB/{}", opf::NAV_FILENAME), deflated)
                .map_err(WriteError::zip)?;
            zip.write_all(nav::emit_nav(publication).as_bytes())
                .map_err(WriteError::from)?;
        }
        EpubVersion::V2 => {
            zip.start_file(format!("EPUB/{}", opf::NCX_FILENAME), deflated)
                .map_err(WriteError::zip)?;
            zip.write_all(ncx::emit_ncx(publication).as_bytes())
                .map_err(WriteError::from)?;
        }
    }

    // 7. package document
    zip.start_file(opf::PACKAGE_PATH, deflated)
        .map_err(WriteError::zip)?;
    zip.write_all(opf::emit_package(publication, version).as_bytes())
        .map_err(WriteError::from)?;

    zip.finish().map_err(WriteError::zip)?;
    Ok(())
}
