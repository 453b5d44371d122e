//! Deserialization pipeline: archive bytes → publication.
//!
//! Navigation is the primary source of structure; the spine fills in
//! reading order and catches orphans. A missing or malformed navigation
//! resource is a warning, not an error: extraction falls back to the
//! spine alone.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use zip::ZipArchive;

use crate::error::ReadError;
use crate::nav::{self, NavEntry};
use crate::publication::{
    Chapter, ChapterBody, EpubVersion, ImageOptions, Publication, PublicationOptions,
};
use crate::xhtml;
use crate::{ncx, opf, security};

/// Spine order assigned to navigation targets the spine does not list.
const ORPHAN_ORDER: u32 = 9999;

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub publication: PublicationOptions,
}

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Parse an EPUB file from disk.
pub fn read_epub(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<Publication, ReadError> {
    let wrap = |e: ReadError| ReadError::File(Box::new(e));
    let bytes = std::fs::read(path).map_err(|e| wrap(e.into()))?;
    read_impl(&bytes, opts).map_err(wrap)
}

/// Parse an EPUB from an in-memory buffer.
pub fn read_epub_bytes(bytes: &[u8], opts: &ReadOptions) -> Result<Publication, ReadError> {
    read_impl(bytes, opts).map_err(|e| ReadError::Buffer(Box::new(e)))
}

fn read_impl(bytes: &[u8], opts: &ReadOptions) -> Result<Publication, ReadError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ReadError::MalformedArchive(e.to_string()))?;

    // 1. Safety scan before interpreting anything
    security::check_entry_count(archive.len() as u64)?;
    let mut total_bytes = 0u64;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| ReadError::MalformedArchive(e.to_string()))?;
        security::check_path_traversal(entry.name())?;
        total_bytes = total_bytes.saturating_add(entry.size());
    }
    security::check_total_size(total_bytes)?;

    // 2. Container bootstrap → package path
    let container = read_entry_string(&mut archive, "META-INF/container.xml")
        .map_err(|_| ReadError::MissingContainer)?;
    let package_path = parse_container(&container)?;

    // 3. Package document
    let package_xml = read_entry_string(&mut archive, &package_path)
        .map_err(|_| ReadError::MissingPackageDocument(package_path.clone()))?;
    let package = opf::parse_package(&package_xml, &package_path)?;
    let package_dir = package_path
        .rfind('/')
        .map(|i| package_path[..=i].to_string())
        .unwrap_or_default();

    let mut publication = Publication::new(
        package.metadata.clone(),
        PublicationOptions {
            add_default_stylesheet: false,
            ..opts.publication.clone()
        },
    )
    .map_err(|e| ReadError::MalformedArchive(e.to_string()))?;

    // 4. Spine lookup keyed by manifest href
    let mut spine_info: HashMap<String, (u32, bool)> = HashMap::new();
    let mut spine_hrefs: Vec<String> = Vec::new();
    for (index, item) in package.spine.iter().enumerate() {
        if let Some(manifest) = package.manifest_by_id(&item.idref) {
            let href = normalize_href(&manifest.href);
            spine_info.insert(href.clone(), (index as u32 + 1, item.linear));
            spine_hrefs.push(href);
        }
    }

    let mut ctx = ParseCtx {
        publication: &mut publication,
        package_dir: &package_dir,
        spine_info: &spine_info,
        chapters_by_file: HashMap::new(),
    };

    // 5. Navigation-first tree reconstruction
    let nav_entries = locate_and_parse_nav(&mut archive, &package, &package_dir);
    let nav_present = nav_entries.is_some();
    if let Some(entries) = nav_entries {
        walk_nav_entries(&mut ctx, &mut archive, &entries, None);
    }

    // 6. Spine pass: anything navigation never mentioned becomes a root
    //    chapter
    for href in &spine_hrefs {
        if ctx.chapters_by_file.contains_key(href) {
            continue;
        }
        if nav_present {
            tracing::warn!(
                "Spine item {href} is not referenced by navigation; adding as root chapter"
            );
        }
        create_file_chapter(&mut ctx, &mut archive, href, None, None);
    }

    // 7. Resources
    extract_resources(&mut ctx, &mut archive, &package);

    Ok(publication)
}

struct ParseCtx<'a> {
    publication: &'a mut Publication,
    package_dir: &'a str,
    spine_info: &'a HashMap<String, (u32, bool)>,
    /// href → chapter id, for files already turned into chapters.
    chapters_by_file: HashMap<String, String>,
}

fn locate_and_parse_nav(
    archive: &mut Archive<'_>,
    package: &opf::PackageDoc,
    package_dir: &str,
) -> Option<Vec<NavEntry>> {
    enum Kind {
        Nav,
        Ncx,
    }

    let located = match package.version {
        EpubVersion::V3 => package
            .nav_item()
            .map(|i| (Kind::Nav, i))
            .or_else(|| package.ncx_item().map(|i| (Kind::Ncx, i))),
        EpubVersion::V2 => package
            .ncx_item()
            .map(|i| (Kind::Ncx, i))
            .or_else(|| package.nav_item().map(|i| (Kind::Nav, i))),
    };
    let (kind, item) = match located {
        Some(found) => found,
        None => {
            tracing::warn!("No navigation resource in manifest; using spine order only");
            return None;
        }
    };

    let path = format!("{package_dir}{}", item.href);
    let content = match read_entry_string(archive, &path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Navigation resource {path} unreadable ({e}); using spine order only");
            return None;
        }
    };

    match kind {
        Kind::Nav => {
            let entries = nav::parse_nav(&content);
            if entries.is_none() {
                tracing::warn!(
                    "Navigation document {path} has no usable toc nav; using spine order only"
                );
            }
            entries
        }
        Kind::Ncx => match ncx::parse_ncx(&content, &path) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::warn!("NCX {path} failed to parse ({e}); using spine order only");
                None
            }
        },
    }
}

fn walk_nav_entries(
    ctx: &mut ParseCtx<'_>,
    archive: &mut Archive<'_>,
    entries: &[NavEntry],
    parent: Option<&str>,
) {
    for entry in entries {
        let assigned_parent = match &entry.href {
            None => add_heading_chapter(ctx, entry, parent),
            Some(href) => {
                let href = normalize_href(href);
                let (file, fragment) = match href.split_once('#') {
                    Some((file, fragment)) => (file.to_string(), Some(fragment.to_string())),
                    None => (href, None),
                };
                match fragment {
                    None => add_file_entry(ctx, archive, &file, entry, parent),
                    Some(fragment) => add_fragment_entry(ctx, archive, &file, &fragment, entry, parent),
                }
            }
        };
        let assigned_parent = assigned_parent
            .or_else(|| parent.map(str::to_string));
        walk_nav_entries(ctx, archive, &entry.children, assigned_parent.as_deref());
    }
}

/// A `<span>` heading groups entries without pointing at a file; it
/// becomes an empty chapter so the hierarchy survives.
fn add_heading_chapter(
    ctx: &mut ParseCtx<'_>,
    entry: &NavEntry,
    parent: Option<&str>,
) -> Option<String> {
    let id = format!("chapter-{}", uuid::Uuid::new_v4());
    let filename = ctx.publication.next_chapter_filename();
    ctx.publication.attach_chapter(Chapter {
        id: id.clone(),
        title: entry.label.clone(),
        body: ChapterBody::Inline(String::new()),
        filename,
        parent: parent.map(str::to_string),
        order: ORPHAN_ORDER,
        children: Vec::new(),
        heading_level: 1,
        linear: false,
    });
    Some(id)
}

fn add_file_entry(
    ctx: &mut ParseCtx<'_>,
    archive: &mut Archive<'_>,
    file: &str,
    entry: &NavEntry,
    parent: Option<&str>,
) -> Option<String> {
    if let Some(existing_id) = ctx.chapters_by_file.get(file).cloned() {
        // Duplicate reference: reuse the chapter, move it if the tree
        // disagrees, and let the label win only when NAV titles are
        // enabled.
        let current_parent = ctx
            .publication
            .get_chapter(&existing_id)
            .and_then(|c| c.parent.clone());
        let wanted_parent = parent.map(str::to_string);
        if current_parent != wanted_parent {
            let creates_cycle = wanted_parent
                .as_deref()
                .is_some_and(|p| ctx.publication.creates_parent_cycle(&existing_id, p));
            if creates_cycle {
                tracing::warn!(
                    "Navigation re-parents {file} under its own descendant; keeping its current position"
                );
            } else {
                ctx.publication
                    .reparent_chapter(&existing_id, wanted_parent);
            }
        }
        if nav_titles_enabled(ctx.publication) {
            if let Some(chapter) = ctx.publication.get_chapter_mut(&existing_id) {
                chapter.title = entry.label.clone();
            }
        }
        return Some(existing_id);
    }
    create_file_chapter(ctx, archive, file, parent, Some(entry.label.as_str()))
}

fn add_fragment_entry(
    ctx: &mut ParseCtx<'_>,
    archive: &mut Archive<'_>,
    file: &str,
    fragment: &str,
    entry: &NavEntry,
    parent: Option<&str>,
) -> Option<String> {
    // The backing chapter owns the markup; its title comes from content,
    // never from the fragment label.
    let backing_id = match ctx.chapters_by_file.get(file).cloned() {
        Some(id) => id,
        None => create_file_chapter(ctx, archive, file, None, None)?,
    };
    let backing_filename = ctx
        .publication
        .get_chapter(&backing_id)
        .map(|c| c.filename.clone())
        .unwrap_or_else(|| file.to_string());

    let id = format!("chapter-{}", uuid::Uuid::new_v4());
    ctx.publication.attach_chapter(Chapter {
        id: id.clone(),
        title: entry.label.clone(),
        body: ChapterBody::FragmentOf {
            source: backing_id,
            fragment: fragment.to_string(),
        },
        filename: backing_filename,
        parent: parent.map(str::to_string),
        order: ORPHAN_ORDER,
        children: Vec::new(),
        heading_level: 2,
        linear: true,
    });
    Some(id)
}

fn create_file_chapter(
    ctx: &mut ParseCtx<'_>,
    archive: &mut Archive<'_>,
    file: &str,
    parent: Option<&str>,
    nav_label: Option<&str>,
) -> Option<String> {
    let path = format!("{}{file}", ctx.package_dir);
    let markup = match read_entry_string(archive, &path) {
        Ok(markup) => markup,
        Err(e) => {
            tracing::warn!("Skipping unreadable content document {path}: {e}");
            return None;
        }
    };

    let extracted = xhtml::extract_content(&markup);
    let title = xhtml::choose_title(&extracted, nav_label, &ctx.publication.options)
        .unwrap_or_else(|| format!("Chapter {}", ctx.publication.get_all_chapters().len() + 1));

    let (order, linear) = match ctx.spine_info.get(file) {
        Some(&(order, linear)) => (order, linear),
        None => {
            tracing::warn!("Navigation references {file} which is not in the spine");
            (ORPHAN_ORDER, false)
        }
    };

    let filename = if ctx.publication.chapter_filename_exists(file) {
        ctx.publication.next_chapter_filename()
    } else {
        file.to_string()
    };

    let id = format!("chapter-{}", uuid::Uuid::new_v4());
    ctx.publication.attach_chapter(Chapter {
        id: id.clone(),
        title,
        body: ChapterBody::Inline(extracted.body),
        filename,
        parent: parent.map(str::to_string),
        order,
        children: Vec::new(),
        heading_level: extracted.heading_level,
        linear,
    });
    ctx.chapters_by_file.insert(file.to_string(), id.clone());
    Some(id)
}

fn nav_titles_enabled(publication: &Publication) -> bool {
    publication
        .options
        .title_extraction
        .contains(&crate::publication::TitleSource::Nav)
}

fn extract_resources(
    ctx: &mut ParseCtx<'_>,
    archive: &mut Archive<'_>,
    package: &opf::PackageDoc,
) {
    for item in &package.manifest {
        let path = format!("{}{}", ctx.package_dir, normalize_href(&item.href));

        if item.media_type.starts_with("image/") {
            let data = match read_entry_bytes(archive, &path) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Skipping unreadable image {path}: {e}");
                    continue;
                }
            };
            let is_cover = item
                .properties
                .as_deref()
                .is_some_and(|p| p.split_whitespace().any(|w| w == "cover-image"))
                || package.cover_meta_id.as_deref() == Some(item.id.as_str());
            let opts = ImageOptions::new(crate::media::basename(&item.href), data).cover(is_cover);
            if let Err(e) = ctx.publication.add_image(opts) {
                tracing::warn!("Skipping image {path}: {e}");
            }
        } else if item.media_type == "text/css" {
            match read_entry_string(archive, &path) {
                Ok(content) => ctx
                    .publication
                    .attach_parsed_stylesheet(normalize_href(&item.href), content),
                Err(e) => tracing::warn!("Skipping unreadable stylesheet {path}: {e}"),
            }
        }
    }
}

// --- Container bootstrap ---

fn parse_container(content: &str) -> Result<String, ReadError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"full-path" {
                        return Ok(String::from_utf8_lossy(&attr.value).to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::MalformedXml {
                    entry: "META-INF/container.xml".to_string(),
                    detail: e.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }
    Err(ReadError::MissingPackagePath)
}

// --- Archive helpers ---

fn normalize_href(href: &str) -> String {
    href.strip_prefix("./").unwrap_or(href).to_string()
}

fn read_entry_bytes(archive: &mut Archive<'_>, path: &str) -> Result<Vec<u8>, ReadError> {
    let mut entry = archive
        .by_name(path)
        .map_err(|_| ReadError::MissingContent(format!("Missing archive entry: {path}")))?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}

fn read_entry_string(archive: &mut Archive<'_>, path: &str) -> Result<String, ReadError> {
    let bytes = read_entry_bytes(archive, path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
