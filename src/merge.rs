//! Merge pipeline: splice one publication's chapters under a new
//! section of another, copying resources and rewriting references.
//!
//! Resources are deduplicated by content digest across every merge that
//! shares a [`MergeContext`]. The reference rewriter works on raw markup
//! text with per-resource patterns; only `src` attributes are touched.

use std::collections::HashMap;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::BuildError;
use crate::media;
use crate::publication::{
    Chapter, ChapterBody, ChapterOptions, DublinCore, ImageOptions, Publication,
    PublicationOptions, StylesheetOptions, DEFAULT_STYLESHEET_ID,
};

#[derive(Debug, Clone)]
pub struct SectionOptions {
    pub title: String,
    pub heading_level: u8,
}

impl SectionOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            heading_level: 1,
        }
    }

    pub fn heading_level(mut self, level: u8) -> Self {
        self.heading_level = level;
        self
    }
}

/// Dedup state shared across consecutive merges into one destination.
#[derive(Debug, Default)]
pub struct MergeContext {
    seen_stylesheets: HashMap<[u8; 32], String>,
    seen_images: HashMap<[u8; 32], String>,
}

/// Copy `source` into `dest` under a freshly created section chapter.
/// Returns the section's chapter id.
pub fn add_publication_as_chapter(
    dest: &mut Publication,
    source: &Publication,
    section: SectionOptions,
    book_number: usize,
    ctx: &mut MergeContext,
) -> Result<String, BuildError> {
    let section_id = dest.add_chapter(
        ChapterOptions::new(section.title).heading_level(section.heading_level),
    )?;

    // Stylesheets, deduplicated on content. The built-in default never
    // travels; the destination has its own.
    let mut stylesheet_map: Vec<(String, String)> = Vec::new();
    for stylesheet in source.get_all_stylesheets() {
        if stylesheet.id == DEFAULT_STYLESHEET_ID {
            continue;
        }
        let digest: [u8; 32] = Sha256::digest(stylesheet.content.as_bytes()).into();
        let new_filename = match ctx.seen_stylesheets.get(&digest) {
            Some(existing) => existing.clone(),
            None => {
                let renamed = format!(
                    "book{book_number}-{}",
                    media::basename(&stylesheet.filename)
                );
                let id = dest.add_stylesheet(StylesheetOptions::new(
                    renamed,
                    stylesheet.content.clone(),
                ))?;
                let stored = dest
                    .get_stylesheet(&id)
                    .map(|s| s.filename.clone())
                    .unwrap_or_default();
                ctx.seen_stylesheets.insert(digest, stored.clone());
                stored
            }
        };
        stylesheet_map.push((stylesheet.filename.clone(), new_filename));
    }

    // Images, deduplicated on raw bytes. Cover flags never survive the
    // copy; only the destination's own cover, if any, remains one.
    let mut image_map: Vec<(String, String)> = Vec::new();
    for image in source.get_all_images() {
        let digest: [u8; 32] = Sha256::digest(&image.data).into();
        let new_filename = match ctx.seen_images.get(&digest) {
            Some(existing) => existing.clone(),
            None => {
                let renamed =
                    format!("book{book_number}-{}", media::basename(&image.filename));
                let id = dest.add_image(ImageOptions::new(renamed, image.data.clone()))?;
                let stored = dest
                    .get_image(&id)
                    .map(|i| i.filename.clone())
                    .unwrap_or_default();
                ctx.seen_images.insert(digest, stored.clone());
                stored
            }
        };
        image_map.push((image.filename.clone(), new_filename));
    }

    // Chapter tree, re-rooted under the new section.
    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut fragment_fixups: Vec<(String, String)> = Vec::new();
    for root in source.get_root_chapters() {
        copy_chapter(
            dest,
            source,
            root,
            &section_id,
            &stylesheet_map,
            &image_map,
            &mut id_map,
            &mut fragment_fixups,
        );
    }

    // Fragment chapters point at their backing chapter by id; retarget
    // them at the copies.
    for (new_id, old_source_id) in fragment_fixups {
        let (new_source_id, new_source_filename) = match id_map.get(&old_source_id) {
            Some(mapped) => (
                mapped.clone(),
                dest.get_chapter(mapped).map(|c| c.filename.clone()),
            ),
            None => (String::new(), None),
        };
        if let Some(chapter) = dest.get_chapter_mut(&new_id) {
            if new_source_id.is_empty() {
                chapter.body = ChapterBody::Inline(String::new());
            } else {
                if let ChapterBody::FragmentOf { source, .. } = &mut chapter.body {
                    *source = new_source_id;
                }
                if let Some(filename) = new_source_filename {
                    chapter.filename = filename;
                }
            }
        }
    }

    Ok(section_id)
}

/// Build a fresh publication with one section per source, titled
/// "Book 1", "Book 2", ….
pub fn merge_publications(
    metadata: DublinCore,
    sources: &[&Publication],
) -> Result<Publication, BuildError> {
    let mut dest = Publication::new(metadata, PublicationOptions::default())?;
    let mut ctx = MergeContext::default();
    for (index, source) in sources.iter().enumerate() {
        let section = SectionOptions::new(format!("Book {}", index + 1));
        add_publication_as_chapter(&mut dest, source, section, index + 1, &mut ctx)?;
    }
    Ok(dest)
}

#[allow(clippy::too_many_arguments)]
fn copy_chapter(
    dest: &mut Publication,
    source: &Publication,
    chapter: &Chapter,
    parent_id: &str,
    stylesheet_map: &[(String, String)],
    image_map: &[(String, String)],
    id_map: &mut HashMap<String, String>,
    fragment_fixups: &mut Vec<(String, String)>,
) {
    let new_id = format!("chapter-{}", uuid::Uuid::new_v4());
    id_map.insert(chapter.id.clone(), new_id.clone());

    let body = match &chapter.body {
        ChapterBody::Inline(markup) => {
            let rewritten = rewrite_references(markup, stylesheet_map, image_map);
            ChapterBody::Inline(rewritten)
        }
        ChapterBody::FragmentOf {
            source: backing,
            fragment,
        } => {
            fragment_fixups.push((new_id.clone(), backing.clone()));
            ChapterBody::FragmentOf {
                source: backing.clone(),
                fragment: fragment.clone(),
            }
        }
    };

    let filename = dest.next_chapter_filename();
    let order = 1 + dest
        .get_all_chapters()
        .iter()
        .map(|c| c.order)
        .max()
        .unwrap_or(0);
    dest.attach_chapter(Chapter {
        id: new_id.clone(),
        title: chapter.title.clone(),
        body,
        filename,
        parent: Some(parent_id.to_string()),
        order,
        children: Vec::new(),
        heading_level: chapter.heading_level,
        linear: chapter.linear,
    });

    for child_id in &chapter.children {
        if let Some(child) = source.get_chapter(child_id) {
            copy_chapter(
                dest,
                source,
                child,
                &new_id,
                stylesheet_map,
                image_map,
                id_map,
                fragment_fixups,
            );
        }
    }
}

/// Rewrite embedded `src` references in raw markup. Every map entry is
/// matched in four spellings: the old path and its basename, each with
/// and without a `../` prefix. `href` attributes are deliberately left
/// alone, matching the markup the chapter emitter produces.
fn rewrite_references(
    markup: &str,
    stylesheet_map: &[(String, String)],
    image_map: &[(String, String)],
) -> String {
    let mut out = markup.to_string();
    for (old, new) in stylesheet_map.iter().chain(image_map.iter()) {
        let replacement = format!("src=\"../{new}\"");
        let base = media::basename(old);
        for target in [
            format!(r#"src=["']\.\./{}["']"#, regex::escape(old)),
            format!(r#"src=["']{}["']"#, regex::escape(old)),
            format!(r#"src=["']\.\./{}["']"#, regex::escape(base)),
            format!(r#"src=["']{}["']"#, regex::escape(base)),
        ] {
            if let Ok(re) = Regex::new(&target) {
                out = re.replace_all(&out, replacement.as_str()).into_owned();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publication(title: &str) -> Publication {
        Publication::new(
            DublinCore::new(title, "Author"),
            PublicationOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn rewrites_all_four_spellings() {
        let image_map = vec![(
            "images/img.png".to_string(),
            "images/book1-img.png".to_string(),
        )];
        let markup = concat!(
            r#"<img src="../images/img.png"/>"#,
            r#"<img src='images/img.png'/>"#,
            r#"<img src="../img.png"/>"#,
            r#"<img src="img.png"/>"#,
        );
        let rewritten = rewrite_references(markup, &[], &image_map);
        assert_eq!(
            rewritten,
            r#"<img src="../images/book1-img.png"/>"#.repeat(4)
        );
    }

    #[test]
    fn href_attributes_are_untouched() {
        let stylesheet_map = vec![(
            "css/site.css".to_string(),
            "css/book1-site.css".to_string(),
        )];
        let markup = r#"<link href="../css/site.css"/><img src="../css/site.css"/>"#;
        let rewritten = rewrite_references(markup, &stylesheet_map, &[]);
        assert!(rewritten.contains(r#"href="../css/site.css""#));
        assert!(rewritten.contains(r#"src="../css/book1-site.css""#));
    }

    #[test]
    fn copies_nest_under_section() {
        let mut source = publication("Source");
        let part = source
            .add_chapter(ChapterOptions::new("Part").content(r#"<img src="../images/img.png"/>"#))
            .unwrap();
        source
            .add_chapter(ChapterOptions::new("Leaf").parent(part))
            .unwrap();
        source
            .add_image(ImageOptions::new("img.png", vec![1, 2, 3]))
            .unwrap();

        let mut dest = publication("Dest");
        let mut ctx = MergeContext::default();
        let section_id = add_publication_as_chapter(
            &mut dest,
            &source,
            SectionOptions::new("Book 1"),
            1,
            &mut ctx,
        )
        .unwrap();

        let section = dest.get_chapter(&section_id).unwrap();
        assert_eq!(section.children.len(), 1);
        let copied_part = dest.get_chapter(&section.children[0]).unwrap();
        assert_eq!(copied_part.title, "Part");
        assert_eq!(copied_part.children.len(), 1);
        assert!(copied_part
            .content()
            .contains(r#"src="../images/book1-img.png""#));
        assert_eq!(dest.get_all_images().len(), 1);
        assert_eq!(dest.get_all_images()[0].filename, "images/book1-img.png");
    }
}
