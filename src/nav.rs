//! Navigation codec for EPUB 3: the XHTML nav document.

use std::fmt::Write as _;

use scraper::{ElementRef, Html, Selector};

use crate::opf::escape_xml;
use crate::publication::{Chapter, Publication};
use crate::xhtml::normalize_text;

/// One navigation entry, shared between the v3 nav and v2 NCX parsers.
/// `href` is `None` for `<span>` headings that group entries without
/// linking anywhere.
#[derive(Debug, Clone)]
pub struct NavEntry {
    pub label: String,
    pub href: Option<String>,
    pub children: Vec<NavEntry>,
}

// --- Emission ---

/// Render the navigation document. The table of contents mirrors the
/// chapter tree.
pub fn emit_nav(publication: &Publication) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n");
    out.push_str("<head>\n");
    let _ = writeln!(
        out,
        "  <title>{}</title>",
        escape_xml(&publication.metadata.title)
    );
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for chapter in publication.get_root_chapters() {
        emit_list_item(&mut out, publication, chapter, 3);
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn emit_list_item(out: &mut String, publication: &Publication, chapter: &Chapter, indent: usize) {
    let pad = "  ".repeat(indent);
    let label = if chapter.title.trim().is_empty() {
        "Untitled"
    } else {
        chapter.title.as_str()
    };
    let _ = write!(
        out,
        "{pad}<li><a href=\"{}\">{}</a>",
        escape_xml(&publication.chapter_href(chapter)),
        escape_xml(label)
    );

    let children: Vec<&Chapter> = chapter
        .children
        .iter()
        .filter_map(|id| publication.get_chapter(id))
        .collect();
    if children.is_empty() {
        out.push_str("</li>\n");
        return;
    }
    out.push('\n');
    let _ = writeln!(out, "{pad}  <ol>");
    for child in children {
        emit_list_item(out, publication, child, indent + 2);
    }
    let _ = writeln!(out, "{pad}  </ol>");
    let _ = writeln!(out, "{pad}</li>");
}

// --- Extraction ---

/// Parse the navigation document's table of contents. Returns `None`
/// when no usable `<nav>` with an `<ol>` is present.
pub fn parse_nav(content: &str) -> Option<Vec<NavEntry>> {
    let document = Html::parse_document(content);

    let toc_selector =
        Selector::parse("nav[epub\\:type~='toc'], nav[epub\\:type='toc'], nav[role='doc-toc']")
            .ok()?;
    let any_nav_selector = Selector::parse("nav").ok()?;
    let nav = document
        .select(&toc_selector)
        .next()
        .or_else(|| document.select(&any_nav_selector).next())?;

    let ol_selector = Selector::parse("ol").ok()?;
    let ol = nav.select(&ol_selector).next()?;
    Some(parse_nav_list(&ol))
}

fn parse_nav_list(ol: &ElementRef) -> Vec<NavEntry> {
    let li_selector = Selector::parse(":scope > li")
        .unwrap_or_else(|_| Selector::parse("li").unwrap());
    let a_selector = Selector::parse(":scope > a")
        .unwrap_or_else(|_| Selector::parse("a").unwrap());
    let span_selector = Selector::parse(":scope > span")
        .unwrap_or_else(|_| Selector::parse("span").unwrap());
    let ol_selector = Selector::parse("ol").unwrap();

    let mut entries = Vec::new();
    for li in ol.select(&li_selector) {
        let children = li
            .select(&ol_selector)
            .next()
            .map(|nested| parse_nav_list(&nested))
            .unwrap_or_default();

        if let Some(anchor) = li.select(&a_selector).next() {
            let label = normalize_text(&anchor.text().collect::<String>());
            entries.push(NavEntry {
                label: if label.is_empty() { "Untitled".into() } else { label },
                href: Some(anchor.value().attr("href").unwrap_or("").to_string()),
                children,
            });
        } else if let Some(span) = li.select(&span_selector).next() {
            let label = normalize_text(&span.text().collect::<String>());
            entries.push(NavEntry {
                label: if label.is_empty() { "Untitled".into() } else { label },
                href: None,
                children,
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{ChapterOptions, DublinCore, PublicationOptions};

    #[test]
    fn emits_nested_toc() {
        let mut publication = Publication::new(
            DublinCore::new("T", "A"),
            PublicationOptions::default(),
        )
        .unwrap();
        let part = publication
            .add_chapter(ChapterOptions::new("Part I"))
            .unwrap();
        publication
            .add_chapter(ChapterOptions::new("Chapter 1").parent(part))
            .unwrap();

        let nav = emit_nav(&publication);
        assert!(nav.contains("epub:type=\"toc\""));
        assert!(nav.contains("<a href=\"text/chapter-1.xhtml\">Part I</a>"));
        assert!(nav.contains("<a href=\"text/chapter-2.xhtml\">Chapter 1</a>"));

        let entries = parse_nav(&nav).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "Part I");
        assert_eq!(entries[0].children.len(), 1);
        assert_eq!(entries[0].children[0].label, "Chapter 1");
    }

    #[test]
    fn parses_fragment_hrefs_and_spans() {
        let nav = r#"<html xmlns:epub="http://www.idpf.org/2007/ops"><body>
<nav epub:type="toc"><ol>
  <li><span>Front Matter</span>
    <ol><li><a href="intro.xhtml#preface">  The   Preface </a></li></ol>
  </li>
</ol></nav>
</body></html>"#;
        let entries = parse_nav(nav).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "Front Matter");
        assert!(entries[0].href.is_none());
        assert_eq!(
            entries[0].children[0].href.as_deref(),
            Some("intro.xhtml#preface")
        );
        assert_eq!(entries[0].children[0].label, "The Preface");
    }

    #[test]
    fn missing_toc_nav_is_none() {
        assert!(parse_nav("<html><body><p>no nav here</p></body></html>").is_none());
    }
}
