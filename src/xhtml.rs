//! Per-chapter markup codec: emit content documents, pull chapter
//! bodies and titles back out of parsed ones.

use std::fmt::Write as _;

use scraper::{ElementRef, Html, Selector};

use crate::opf::escape_xml;
use crate::publication::{Chapter, EpubVersion, Publication, PublicationOptions, TitleSource};

const XHTML11_DOCTYPE: &str = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">";

// --- Emission ---

/// Render a chapter's content document.
pub fn emit_chapter(
    publication: &Publication,
    chapter: &Chapter,
    version: EpubVersion,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    match version {
        EpubVersion::V3 => {
            out.push_str("<!DOCTYPE html>\n");
            out.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n");
        }
        EpubVersion::V2 => {
            out.push_str(XHTML11_DOCTYPE);
            out.push('\n');
            out.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\">\n");
        }
    }

    out.push_str("<head>\n");
    let _ = writeln!(out, "  <title>{}</title>", escape_xml(&chapter.title));
    let rel = relative_prefix(&chapter.filename);
    for stylesheet in publication.get_all_stylesheets() {
        let _ = writeln!(
            out,
            "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{rel}{}\"/>",
            escape_xml(&stylesheet.filename)
        );
    }
    out.push_str("</head>\n");
    out.push_str("<body>\n");

    let level = chapter.heading_level.clamp(1, 6);
    match version {
        EpubVersion::V3 => {
            let _ = writeln!(
                out,
                "  <section id=\"{}\" epub:type=\"chapter\">",
                escape_xml(&chapter.id)
            );
            let _ = writeln!(out, "    <h{level}>{}</h{level}>", escape_xml(&chapter.title));
            if !chapter.content().is_empty() {
                let _ = writeln!(out, "{}", chapter.content());
            }
            out.push_str("  </section>\n");
        }
        EpubVersion::V2 => {
            let _ = writeln!(out, "  <div id=\"{}\">", escape_xml(&chapter.id));
            let _ = writeln!(out, "    <h{level}>{}</h{level}>", escape_xml(&chapter.title));
            if !chapter.content().is_empty() {
                let _ = writeln!(out, "{}", chapter.content());
            }
            out.push_str("  </div>\n");
        }
    }

    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

/// `../` once per directory component of the chapter's own path, so
/// resource hrefs resolve from wherever the chapter lives.
fn relative_prefix(filename: &str) -> String {
    "../".repeat(filename.matches('/').count())
}

// --- Extraction ---

/// What a content document yields before title policy is applied.
#[derive(Debug, Default)]
pub struct ExtractedContent {
    pub head_title: Option<String>,
    pub first_h1: Option<String>,
    pub first_h2: Option<String>,
    pub heading_level: u8,
    pub body: String,
}

/// Pull the chapter body and title candidates out of a content document.
///
/// The first `<section>` (v3) or `<div>` (v2) inside the body is treated
/// as the chapter wrapper: its first heading is dropped (it restates the
/// title) and the rest is the body. Without a wrapper the whole body is
/// kept as-is.
pub fn extract_content(markup: &str) -> ExtractedContent {
    let document = Html::parse_document(markup);
    let mut extracted = ExtractedContent {
        heading_level: 1,
        ..ExtractedContent::default()
    };

    if let Ok(selector) = Selector::parse("head > title") {
        if let Some(title) = document.select(&selector).next() {
            let text = normalize_text(&title.text().collect::<String>());
            if !text.is_empty() {
                extracted.head_title = Some(text);
            }
        }
    }
    for (selector_str, slot) in [("h1", 0), ("h2", 1)] {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(heading) = document.select(&selector).next() {
                let text = normalize_text(&heading.text().collect::<String>());
                if !text.is_empty() {
                    if slot == 0 {
                        extracted.first_h1 = Some(text);
                    } else {
                        extracted.first_h2 = Some(text);
                    }
                }
            }
        }
    }

    let body = match Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
    {
        Some(body) => body,
        None => return extracted,
    };

    let wrapper = ["body section", "body div"].iter().find_map(|s| {
        Selector::parse(s)
            .ok()
            .and_then(|selector| document.select(&selector).next())
    });

    match wrapper {
        Some(wrapper) => {
            if let Some(level) = first_heading_level(wrapper) {
                extracted.heading_level = level;
            }
            extracted.body = inner_markup_without_first_heading(wrapper);
        }
        None => {
            if let Some(level) = first_heading_level(body) {
                extracted.heading_level = level;
            }
            extracted.body = inner_markup(body);
        }
    }
    extracted
}

/// Apply the configured title-source preference order.
pub fn choose_title(
    extracted: &ExtractedContent,
    nav_label: Option<&str>,
    options: &PublicationOptions,
) -> Option<String> {
    for source in &options.title_extraction {
        let candidate = match source {
            TitleSource::Head if options.ignore_head_title => None,
            TitleSource::Head => extracted.head_title.clone(),
            TitleSource::Content => extracted.first_h1.clone().or_else(|| extracted.first_h2.clone()),
            TitleSource::Nav => nav_label
                .map(normalize_text)
                .filter(|label| !label.is_empty()),
        };
        if candidate.is_some() {
            return candidate;
        }
    }
    None
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn first_heading_level(el: ElementRef) -> Option<u8> {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if let Some(level) = heading_level(child_el.value().name()) {
                return Some(level);
            }
        }
    }
    None
}

fn inner_markup(el: ElementRef) -> String {
    let mut out = String::new();
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            out.push_str(&child_el.html());
        } else if let Some(text) = child.value().as_text() {
            out.push_str(&text.replace('&', "&amp;").replace('<', "&lt;"));
        }
    }
    out.trim().to_string()
}

fn inner_markup_without_first_heading(el: ElementRef) -> String {
    let mut out = String::new();
    let mut heading_dropped = false;
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if !heading_dropped && heading_level(child_el.value().name()).is_some() {
                heading_dropped = true;
                continue;
            }
            out.push_str(&child_el.html());
        } else if let Some(text) = child.value().as_text() {
            out.push_str(&text.replace('&', "&amp;").replace('<', "&lt;"));
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{ChapterOptions, DublinCore, PublicationOptions};

    fn publication_with_chapter() -> (Publication, String) {
        let mut publication = Publication::new(
            DublinCore::new("T", "A"),
            PublicationOptions::default(),
        )
        .unwrap();
        let id = publication
            .add_chapter(
                ChapterOptions::new("Chapter One").content("<p>Hello &amp; welcome.</p>"),
            )
            .unwrap();
        (publication, id)
    }

    #[test]
    fn v3_document_shape() {
        let (publication, id) = publication_with_chapter();
        let chapter = publication.get_chapter(&id).unwrap();
        let markup = emit_chapter(&publication, chapter, EpubVersion::V3);
        assert!(markup.contains("xmlns:epub=\"http://www.idpf.org/2007/ops\""));
        assert!(markup.contains("epub:type=\"chapter\""));
        assert!(markup.contains("<h1>Chapter One</h1>"));
        assert!(markup.contains("href=\"../css/styles.css\""));
        assert!(markup.contains("<p>Hello &amp; welcome.</p>"));
    }

    #[test]
    fn v2_document_shape() {
        let (publication, id) = publication_with_chapter();
        let chapter = publication.get_chapter(&id).unwrap();
        let markup = emit_chapter(&publication, chapter, EpubVersion::V2);
        assert!(markup.contains("XHTML 1.1"));
        assert!(markup.contains("<div id="));
        assert!(!markup.contains("epub:type"));
    }

    #[test]
    fn extraction_round_trips_emission() {
        let (publication, id) = publication_with_chapter();
        let chapter = publication.get_chapter(&id).unwrap();
        let markup = emit_chapter(&publication, chapter, EpubVersion::V3);
        let extracted = extract_content(&markup);
        assert_eq!(extracted.head_title.as_deref(), Some("Chapter One"));
        assert_eq!(extracted.first_h1.as_deref(), Some("Chapter One"));
        assert_eq!(extracted.heading_level, 1);
        assert_eq!(extracted.body, "<p>Hello &amp; welcome.</p>");
    }

    #[test]
    fn no_wrapper_returns_whole_body() {
        let markup = "<html><head><title>X</title></head><body><p>one</p><p>two</p></body></html>";
        let extracted = extract_content(markup);
        assert_eq!(extracted.body, "<p>one</p><p>two</p>");
    }

    #[test]
    fn title_preference_order() {
        let extracted = ExtractedContent {
            head_title: Some("Head".into()),
            first_h1: Some("H1".into()),
            ..ExtractedContent::default()
        };
        let default = PublicationOptions::default();
        assert_eq!(
            choose_title(&extracted, Some("Nav"), &default).as_deref(),
            Some("Head")
        );

        let skip_head = PublicationOptions {
            ignore_head_title: true,
            ..PublicationOptions::default()
        };
        assert_eq!(
            choose_title(&extracted, Some("Nav"), &skip_head).as_deref(),
            Some("H1")
        );

        let nav_first = PublicationOptions {
            title_extraction: vec![TitleSource::Nav, TitleSource::Head],
            ..PublicationOptions::default()
        };
        assert_eq!(
            choose_title(&extracted, Some("  Nav  Label "), &nav_first).as_deref(),
            Some("Nav Label")
        );
    }
}
