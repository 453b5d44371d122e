//! Package-document codec: `EPUB/package.opf` in both format versions.

use std::fmt::Write as _;

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use crate::error::ReadError;
use crate::publication::{DublinCore, EpubVersion, Publication};

pub(crate) const PACKAGE_PATH: &str = "EPUB/package.opf";
pub(crate) const NAV_FILENAME: &str = "nav.xhtml";
pub(crate) const NCX_FILENAME: &str = "toc.ncx";
pub(crate) const NAV_ID: &str = "nav";
pub(crate) const NCX_ID: &str = "ncx";

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// --- Emission ---

/// Render the package document for the given version.
pub fn emit_package(publication: &Publication, version: EpubVersion) -> String {
    let m = &publication.metadata;
    let mut out = String::new();

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    match version {
        EpubVersion::V3 => {
            let _ = writeln!(
                out,
                "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"pub-id\" xml:lang=\"{}\">",
                escape_xml(&m.language)
            );
        }
        EpubVersion::V2 => {
            out.push_str(
                "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"2.0\" unique-identifier=\"pub-id\">\n",
            );
        }
    }

    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    let _ = writeln!(
        out,
        "    <dc:identifier id=\"pub-id\">{}</dc:identifier>",
        escape_xml(&m.identifier)
    );
    let _ = writeln!(out, "    <dc:title>{}</dc:title>", escape_xml(&m.title));
    let _ = writeln!(out, "    <dc:creator>{}</dc:creator>", escape_xml(&m.creator));
    let _ = writeln!(out, "    <dc:language>{}</dc:language>", escape_xml(&m.language));
    let _ = writeln!(out, "    <dc:date>{}</dc:date>", escape_xml(&m.date));
    if version == EpubVersion::V3 {
        let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let _ = writeln!(
            out,
            "    <meta property=\"dcterms:modified\">{modified}</meta>"
        );
    }
    if let Some(publisher) = &m.publisher {
        let _ = writeln!(out, "    <dc:publisher>{}</dc:publisher>", escape_xml(publisher));
    }
    if let Some(description) = &m.description {
        let _ = writeln!(
            out,
            "    <dc:description>{}</dc:description>",
            escape_xml(description)
        );
    }
    for subject in &m.subjects {
        let _ = writeln!(out, "    <dc:subject>{}</dc:subject>", escape_xml(subject));
    }
    if let Some(rights) = &m.rights {
        let _ = writeln!(out, "    <dc:rights>{}</dc:rights>", escape_xml(rights));
    }
    for contributor in &m.contributors {
        let _ = writeln!(
            out,
            "    <dc:contributor>{}</dc:contributor>",
            escape_xml(contributor)
        );
    }
    if version == EpubVersion::V3 {
        for (tag, value) in [
            ("type", &m.dc_type),
            ("format", &m.format),
            ("source", &m.source),
            ("relation", &m.relation),
            ("coverage", &m.coverage),
        ] {
            if let Some(value) = value {
                let _ = writeln!(out, "    <dc:{tag}>{}</dc:{tag}>", escape_xml(value));
            }
        }
    }
    if version == EpubVersion::V2 {
        if let Some(cover) = publication.cover() {
            let _ = writeln!(
                out,
                "    <meta name=\"cover\" content=\"{}\"/>",
                escape_xml(&cover.id)
            );
        }
    }
    out.push_str("  </metadata>\n");

    out.push_str("  <manifest>\n");
    match version {
        EpubVersion::V3 => {
            let _ = writeln!(
                out,
                "    <item id=\"{NAV_ID}\" href=\"{NAV_FILENAME}\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>"
            );
        }
        EpubVersion::V2 => {
            let _ = writeln!(
                out,
                "    <item id=\"{NCX_ID}\" href=\"{NCX_FILENAME}\" media-type=\"application/x-dtbncx+xml\"/>"
            );
        }
    }
    for chapter in publication.spine_chapters() {
        let _ = writeln!(
            out,
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>",
            escape_xml(&chapter.id),
            escape_xml(&chapter.filename)
        );
    }
    for stylesheet in publication.get_all_stylesheets() {
        let _ = writeln!(
            out,
            "    <item id=\"{}\" href=\"{}\" media-type=\"text/css\"/>",
            escape_xml(&stylesheet.id),
            escape_xml(&stylesheet.filename)
        );
    }
    for image in publication.get_all_images() {
        let properties = if image.is_cover && version == EpubVersion::V3 {
            " properties=\"cover-image\""
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{properties}/>",
            escape_xml(&image.id),
            escape_xml(&image.filename),
            escape_xml(&image.media_type)
        );
    }
    out.push_str("  </manifest>\n");

    match version {
        EpubVersion::V3 => out.push_str("  <spine>\n"),
        EpubVersion::V2 => out.push_str("  <spine toc=\"ncx\">\n"),
    }
    for chapter in publication.spine_chapters() {
        let linear = if chapter.linear { "" } else { " linear=\"no\"" };
        let _ = writeln!(
            out,
            "    <itemref idref=\"{}\"{linear}/>",
            escape_xml(&chapter.id)
        );
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

// --- Extraction ---

#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpineItem {
    pub idref: String,
    pub linear: bool,
}

#[derive(Debug)]
pub struct PackageDoc {
    pub version: EpubVersion,
    pub metadata: DublinCore,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<SpineItem>,
    /// `toc` attribute of the spine (the NCX manifest id, v2).
    pub toc_id: Option<String>,
    /// `<meta name="cover" content="…"/>` manifest id (v2 cover hook).
    pub cover_meta_id: Option<String>,
}

impl PackageDoc {
    pub fn manifest_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// The v3 navigation document, by manifest `properties`.
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| {
            item.properties
                .as_deref()
                .is_some_and(|p| p.split_whitespace().any(|word| word == "nav"))
        })
    }

    /// The v2 NCX, by media type with the spine `toc` attribute as a
    /// fallback.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.media_type == "application/x-dtbncx+xml")
            .or_else(|| self.toc_id.as_deref().and_then(|id| self.manifest_by_id(id)))
    }
}

const METADATA_FIELDS: &[&str] = &[
    "title",
    "creator",
    "language",
    "identifier",
    "date",
    "publisher",
    "description",
    "subject",
    "rights",
    "contributor",
    "type",
    "format",
    "source",
    "relation",
    "coverage",
];

/// Parse a package document. Missing core fields fall back to
/// "Untitled" / "Unknown" / "en".
pub fn parse_package(content: &str, entry: &str) -> Result<PackageDoc, ReadError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();

    let mut version = EpubVersion::V3;
    let mut metadata = DublinCore::new("Untitled", "Unknown");
    let mut creator_seen = false;
    let mut manifest = Vec::new();
    let mut spine = Vec::new();
    let mut toc_id = None;
    let mut cover_meta_id = None;

    let mut in_metadata = false;
    let mut current_field: Option<String> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let local = e.local_name();
                let name = String::from_utf8_lossy(local.as_ref()).to_string();
                match name.as_str() {
                    "package" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"version" {
                                let value = String::from_utf8_lossy(&attr.value);
                                if value.starts_with('2') {
                                    version = EpubVersion::V2;
                                }
                            }
                        }
                    }
                    "metadata" => in_metadata = true,
                    "meta" if in_metadata => {
                        let mut is_cover = false;
                        let mut content_attr = None;
                        for attr in e.attributes().flatten() {
                            let key = attr.key.local_name();
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match key.as_ref() {
                                b"name" if value == "cover" => is_cover = true,
                                b"content" => content_attr = Some(value),
                                _ => {}
                            }
                        }
                        if is_cover {
                            cover_meta_id = content_attr;
                        }
                    }
                    field if in_metadata && METADATA_FIELDS.contains(&field) => {
                        current_field = Some(field.to_string());
                        current_text.clear();
                    }
                    "item" => {
                        let mut item = ManifestItem {
                            id: String::new(),
                            href: String::new(),
                            media_type: String::new(),
                            properties: None,
                        };
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.local_name().as_ref() {
                                b"id" => item.id = value,
                                b"href" => item.href = value,
                                b"media-type" => item.media_type = value,
                                b"properties" => item.properties = Some(value),
                                _ => {}
                            }
                        }
                        manifest.push(item);
                    }
                    "spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"toc" {
                                toc_id = Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                    "itemref" => {
                        let mut idref = String::new();
                        let mut linear = true;
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.local_name().as_ref() {
                                b"idref" => idref = value,
                                b"linear" => linear = value != "no",
                                _ => {}
                            }
                        }
                        if !idref.is_empty() {
                            spine.push(SpineItem { idref, linear });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if current_field.is_some() {
                    current_text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "metadata" {
                    in_metadata = false;
                }
                if let Some(field) = current_field.take() {
                    let text = current_text.trim().to_string();
                    if !text.is_empty() {
                        apply_metadata_field(&mut metadata, &mut creator_seen, &field, text);
                    }
                    current_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::MalformedXml {
                    entry: entry.to_string(),
                    detail: e.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(PackageDoc {
        version,
        metadata,
        manifest,
        spine,
        toc_id,
        cover_meta_id,
    })
}

fn apply_metadata_field(
    metadata: &mut DublinCore,
    creator_seen: &mut bool,
    field: &str,
    text: String,
) {
    match field {
        "title" => metadata.title = text,
        "creator" => {
            if *creator_seen {
                metadata.contributors.push(text);
            } else {
                metadata.creator = text;
                *creator_seen = true;
            }
        }
        "language" => metadata.language = text,
        "identifier" => metadata.identifier = text,
        "date" => metadata.date = text,
        "publisher" => metadata.publisher = Some(text),
        "description" => metadata.description = Some(text),
        "subject" => metadata.subjects.push(text),
        "rights" => metadata.rights = Some(text),
        "contributor" => metadata.contributors.push(text),
        "type" => metadata.dc_type = Some(text),
        "format" => metadata.format = Some(text),
        "source" => metadata.source = Some(text),
        "relation" => metadata.relation = Some(text),
        "coverage" => metadata.coverage = Some(text),
        _ => {}
    }
}
