//! Navigation codec for EPUB 2: the NCX document.

use std::fmt::Write as _;

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use crate::error::ReadError;
use crate::nav::NavEntry;
use crate::opf::escape_xml;
use crate::publication::{Chapter, Publication};
use crate::xhtml::normalize_text;

const NCX_DOCTYPE: &str = "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">";

// --- Emission ---

/// Render the NCX. `dtb:depth` reflects the deepest navPoint nesting.
pub fn emit_ncx(publication: &Publication) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(NCX_DOCTYPE);
    out.push('\n');
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    let _ = writeln!(
        out,
        "    <meta name=\"dtb:uid\" content=\"{}\"/>",
        escape_xml(&publication.metadata.identifier)
    );
    let _ = writeln!(
        out,
        "    <meta name=\"dtb:depth\" content=\"{}\"/>",
        navigation_depth(publication)
    );
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n");
    out.push_str("  </head>\n");
    let _ = writeln!(
        out,
        "  <docTitle><text>{}</text></docTitle>",
        escape_xml(&publication.metadata.title)
    );
    let _ = writeln!(
        out,
        "  <docAuthor><text>{}</text></docAuthor>",
        escape_xml(&publication.metadata.creator)
    );
    out.push_str("  <navMap>\n");
    let mut play_order = 1;
    for chapter in publication.get_root_chapters() {
        emit_nav_point(&mut out, publication, chapter, &mut play_order, 2);
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn emit_nav_point(
    out: &mut String,
    publication: &Publication,
    chapter: &Chapter,
    play_order: &mut u32,
    indent: usize,
) {
    let pad = "  ".repeat(indent);
    let label = if chapter.title.trim().is_empty() {
        "Untitled"
    } else {
        chapter.title.as_str()
    };
    let _ = writeln!(
        out,
        "{pad}<navPoint id=\"navPoint-{n}\" playOrder=\"{n}\">",
        n = play_order
    );
    let _ = writeln!(
        out,
        "{pad}  <navLabel><text>{}</text></navLabel>",
        escape_xml(label)
    );
    let _ = writeln!(
        out,
        "{pad}  <content src=\"{}\"/>",
        escape_xml(&publication.chapter_href(chapter))
    );
    *play_order += 1;
    for child in &chapter.children {
        if let Some(child) = publication.get_chapter(child) {
            emit_nav_point(out, publication, child, play_order, indent + 1);
        }
    }
    let _ = writeln!(out, "{pad}</navPoint>");
}

fn navigation_depth(publication: &Publication) -> u32 {
    fn depth_of(publication: &Publication, chapter: &Chapter) -> u32 {
        1 + chapter
            .children
            .iter()
            .filter_map(|id| publication.get_chapter(id))
            .map(|child| depth_of(publication, child))
            .max()
            .unwrap_or(0)
    }
    publication
        .get_root_chapters()
        .iter()
        .map(|chapter| depth_of(publication, chapter))
        .max()
        .unwrap_or(1)
}

// --- Extraction ---

/// Parse the `navMap` into the shared navigation-entry tree.
pub fn parse_ncx(content: &str, entry_name: &str) -> Result<Vec<NavEntry>, ReadError> {
    #[derive(Default)]
    struct Frame {
        label: String,
        src: Option<String>,
        children: Vec<NavEntry>,
    }

    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();

    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_label_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"navPoint" => stack.push(Frame::default()),
                    b"text" => in_label_text = !stack.is_empty(),
                    b"content" => {
                        if let Some(frame) = stack.last_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.local_name().as_ref() == b"src" {
                                    frame.src =
                                        Some(String::from_utf8_lossy(&attr.value).to_string());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_label_text {
                    if let Some(frame) = stack.last_mut() {
                        frame.label.push_str(&e.unescape().unwrap_or_default());
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"text" => in_label_text = false,
                b"navPoint" => {
                    if let Some(frame) = stack.pop() {
                        let label = normalize_text(&frame.label);
                        let entry = NavEntry {
                            label: if label.is_empty() { "Untitled".into() } else { label },
                            href: frame.src,
                            children: frame.children,
                        };
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(entry),
                            None => roots.push(entry),
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::MalformedXml {
                    entry: entry_name.to_string(),
                    detail: e.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(roots)
}
