//! The in-memory publication model and its build API.
//!
//! A [`Publication`] owns every chapter, image, and stylesheet it
//! contains. Chapters form a tree stored arena-style: a flat id map plus
//! ordered child-id lists, which keeps the structure serializable and
//! free of cyclic ownership.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, EpubError};
use crate::media;
use crate::validate::{self, ValidationReport};
use crate::writer::{self, ExportOptions};

/// Id of the stylesheet injected at construction time.
pub const DEFAULT_STYLESHEET_ID: &str = "style-default";

/// Filename of the injected default stylesheet.
pub const DEFAULT_STYLESHEET_FILENAME: &str = "css/styles.css";

pub(crate) const DEFAULT_STYLESHEET_CSS: &str = "\
body {
  font-family: serif;
  line-height: 1.5;
  margin: 0 auto;
  padding: 0 1em;
}
h1, h2, h3, h4, h5, h6 {
  font-family: sans-serif;
  line-height: 1.2;
}
p {
  margin: 0 0 1em 0;
  text-indent: 0;
}
img {
  max-width: 100%;
}
";

/// Which EPUB flavor a codec targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpubVersion {
    V2,
    V3,
}

/// Sources consulted when assigning a chapter title during extraction,
/// in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleSource {
    /// The `<title>` element in the document head.
    Head,
    /// The first `<h1>` or `<h2>` in the content.
    Content,
    /// The navigation label pointing at the document.
    Nav,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationOptions {
    /// Inject the built-in stylesheet at construction.
    pub add_default_stylesheet: bool,
    /// Skip the head `<title>` element when extracting chapter titles.
    pub ignore_head_title: bool,
    /// Preference order for chapter title extraction.
    pub title_extraction: Vec<TitleSource>,
}

impl Default for PublicationOptions {
    fn default() -> Self {
        Self {
            add_default_stylesheet: true,
            ignore_head_title: false,
            title_extraction: vec![TitleSource::Head, TitleSource::Content, TitleSource::Nav],
        }
    }
}

/// Dublin Core metadata. `title` and `creator` are required non-empty;
/// `identifier` and `date` are generated when not supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DublinCore {
    pub title: String,
    pub creator: String,
    pub language: String,
    pub identifier: String,
    pub date: String,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub rights: Option<String>,
    pub contributors: Vec<String>,
    pub dc_type: Option<String>,
    pub format: Option<String>,
    pub source: Option<String>,
    pub relation: Option<String>,
    pub coverage: Option<String>,
}

impl DublinCore {
    pub fn new(title: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            creator: creator.into(),
            language: "en".to_string(),
            identifier: String::new(),
            date: String::new(),
            publisher: None,
            description: None,
            subjects: Vec::new(),
            rights: None,
            contributors: Vec::new(),
            dc_type: None,
            format: None,
            source: None,
            relation: None,
            coverage: None,
        }
    }
}

/// Shallow patch applied by [`Publication::set_metadata`]. Unset fields
/// leave the current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
    pub date: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub rights: Option<String>,
    pub contributors: Option<Vec<String>>,
    pub dc_type: Option<String>,
    pub format: Option<String>,
    pub source: Option<String>,
    pub relation: Option<String>,
    pub coverage: Option<String>,
}

/// Where a chapter's markup lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChapterBody {
    /// Markup owned by this chapter.
    Inline(String),
    /// A virtual chapter whose markup is a named anchor inside another
    /// chapter's document.
    FragmentOf { source: String, fragment: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub body: ChapterBody,
    /// Relative path inside the package directory, `text/chapter-N.xhtml`
    /// for chapters minted by the build API.
    pub filename: String,
    pub parent: Option<String>,
    /// Reading-order sort key. Monotonic; holes may appear after deletes.
    pub order: u32,
    pub children: Vec<String>,
    pub heading_level: u8,
    pub linear: bool,
}

impl Chapter {
    /// Inline markup, empty for fragment chapters.
    pub fn content(&self) -> &str {
        match &self.body {
            ChapterBody::Inline(markup) => markup,
            ChapterBody::FragmentOf { .. } => "",
        }
    }

    /// Anchor name for fragment chapters.
    pub fn fragment(&self) -> Option<&str> {
        match &self.body {
            ChapterBody::Inline(_) => None,
            ChapterBody::FragmentOf { fragment, .. } => Some(fragment),
        }
    }

    /// Id of the chapter owning the backing markup, for fragment chapters.
    pub fn source_chapter(&self) -> Option<&str> {
        match &self.body {
            ChapterBody::Inline(_) => None,
            ChapterBody::FragmentOf { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChapterOptions {
    pub title: String,
    pub content: String,
    pub parent: Option<String>,
    pub heading_level: u8,
    pub linear: bool,
}

impl ChapterOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            parent: None,
            heading_level: 1,
            linear: true,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn heading_level(mut self, level: u8) -> Self {
        self.heading_level = level;
        self
    }

    pub fn linear(mut self, linear: bool) -> Self {
        self.linear = linear;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    /// `images/<sanitized>.<ext>`.
    pub filename: String,
    pub data: Vec<u8>,
    pub media_type: String,
    pub alt: Option<String>,
    pub is_cover: bool,
}

#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub filename: String,
    pub data: Vec<u8>,
    pub alt: Option<String>,
    pub is_cover: bool,
}

impl ImageOptions {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
            alt: None,
            is_cover: false,
        }
    }

    pub fn alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn cover(mut self, is_cover: bool) -> Self {
        self.is_cover = is_cover;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stylesheet {
    pub id: String,
    /// `css/<sanitized>.css`.
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct StylesheetOptions {
    pub filename: String,
    pub content: String,
}

impl StylesheetOptions {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// An EPUB publication under construction or reconstruction. One value
/// serves both format versions; the version is chosen at export time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub metadata: DublinCore,
    pub options: PublicationOptions,
    chapters: HashMap<String, Chapter>,
    chapter_ids: Vec<String>,
    root_chapter_ids: Vec<String>,
    images: HashMap<String, Image>,
    image_ids: Vec<String>,
    stylesheets: HashMap<String, Stylesheet>,
    stylesheet_ids: Vec<String>,
    chapter_counter: u32,
}

impl Publication {
    /// Create a publication. Fails when `title` or `creator` is empty;
    /// generates the identifier and date when absent and injects the
    /// default stylesheet unless disabled.
    pub fn new(
        mut metadata: DublinCore,
        options: PublicationOptions,
    ) -> Result<Self, BuildError> {
        if metadata.title.trim().is_empty() {
            return Err(BuildError::InvalidMetadata("title must not be empty".into()));
        }
        if metadata.creator.trim().is_empty() {
            return Err(BuildError::InvalidMetadata(
                "creator must not be empty".into(),
            ));
        }
        if metadata.language.is_empty() {
            metadata.language = "en".to_string();
        }
        if metadata.identifier.is_empty() {
            metadata.identifier = format!("urn:uuid:{}", uuid::Uuid::new_v4());
        }
        if metadata.date.is_empty() {
            metadata.date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        }

        let mut publication = Self {
            metadata,
            options,
            chapters: HashMap::new(),
            chapter_ids: Vec::new(),
            root_chapter_ids: Vec::new(),
            images: HashMap::new(),
            image_ids: Vec::new(),
            stylesheets: HashMap::new(),
            stylesheet_ids: Vec::new(),
            chapter_counter: 0,
        };

        if publication.options.add_default_stylesheet {
            let stylesheet = Stylesheet {
                id: DEFAULT_STYLESHEET_ID.to_string(),
                filename: DEFAULT_STYLESHEET_FILENAME.to_string(),
                content: DEFAULT_STYLESHEET_CSS.to_string(),
            };
            publication.stylesheet_ids.push(stylesheet.id.clone());
            publication.stylesheets.insert(stylesheet.id.clone(), stylesheet);
        }

        Ok(publication)
    }

    // --- Chapters ---

    /// Add a chapter, minting its id, filename, and reading order.
    pub fn add_chapter(&mut self, opts: ChapterOptions) -> Result<String, BuildError> {
        if !(1..=6).contains(&opts.heading_level) {
            return Err(BuildError::InvalidHeadingLevel(opts.heading_level));
        }
        if let Some(parent) = &opts.parent {
            if !self.chapters.contains_key(parent) {
                return Err(BuildError::UnknownParent(parent.clone()));
            }
        }

        let id = format!("chapter-{}", uuid::Uuid::new_v4());
        let chapter = Chapter {
            id: id.clone(),
            title: opts.title,
            body: ChapterBody::Inline(opts.content),
            filename: self.next_chapter_filename(),
            parent: opts.parent,
            order: self.next_order(),
            children: Vec::new(),
            heading_level: opts.heading_level,
            linear: opts.linear,
        };
        self.attach_chapter(chapter);
        Ok(id)
    }

    /// Replace a chapter's markup.
    pub fn set_chapter_content(
        &mut self,
        id: &str,
        content: impl Into<String>,
    ) -> Result<(), BuildError> {
        let chapter = self
            .chapters
            .get_mut(id)
            .ok_or_else(|| BuildError::UnknownChapter(id.to_string()))?;
        chapter.body = ChapterBody::Inline(content.into());
        Ok(())
    }

    /// Append markup to a chapter.
    pub fn append_to_chapter(&mut self, id: &str, content: &str) -> Result<(), BuildError> {
        let chapter = self
            .chapters
            .get_mut(id)
            .ok_or_else(|| BuildError::UnknownChapter(id.to_string()))?;
        match &mut chapter.body {
            ChapterBody::Inline(markup) => markup.push_str(content),
            body @ ChapterBody::FragmentOf { .. } => {
                *body = ChapterBody::Inline(content.to_string());
            }
        }
        Ok(())
    }

    pub fn set_chapter_title(&mut self, id: &str, title: impl Into<String>) -> Result<(), BuildError> {
        let chapter = self
            .chapters
            .get_mut(id)
            .ok_or_else(|| BuildError::UnknownChapter(id.to_string()))?;
        chapter.title = title.into();
        Ok(())
    }

    pub fn get_chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.get(id)
    }

    /// Top-level chapters in navigation order.
    pub fn get_root_chapters(&self) -> Vec<&Chapter> {
        self.root_chapter_ids
            .iter()
            .filter_map(|id| self.chapters.get(id))
            .collect()
    }

    /// Every chapter in insertion order.
    pub fn get_all_chapters(&self) -> Vec<&Chapter> {
        self.chapter_ids
            .iter()
            .filter_map(|id| self.chapters.get(id))
            .collect()
    }

    /// Remove a chapter and its transitive descendants. Surviving
    /// chapters keep their `order` values.
    pub fn delete_chapter(&mut self, id: &str) -> Result<(), BuildError> {
        if !self.chapters.contains_key(id) {
            return Err(BuildError::UnknownChapter(id.to_string()));
        }

        let mut doomed = vec![id.to_string()];
        let mut queue = vec![id.to_string()];
        while let Some(next) = queue.pop() {
            if let Some(chapter) = self.chapters.get(&next) {
                for child in &chapter.children {
                    doomed.push(child.clone());
                    queue.push(child.clone());
                }
            }
        }

        let parent = self.chapters.get(id).and_then(|c| c.parent.clone());
        match parent {
            Some(parent_id) => {
                if let Some(parent) = self.chapters.get_mut(&parent_id) {
                    parent.children.retain(|c| c != id);
                }
            }
            None => self.root_chapter_ids.retain(|c| c != id),
        }

        for dead in &doomed {
            self.chapters.remove(dead);
            self.chapter_ids.retain(|c| c != dead);
        }
        Ok(())
    }

    // --- Images ---

    /// Add an image. The filename is sanitized into `images/`; the media
    /// type is derived from the extension.
    pub fn add_image(&mut self, opts: ImageOptions) -> Result<String, BuildError> {
        let sanitized = media::sanitize_filename(&opts.filename);
        let ext = media::extension(&sanitized).unwrap_or_default();
        if !media::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(BuildError::InvalidImageExtension {
                filename: opts.filename,
            });
        }

        let filename = self.unique_filename(&format!("images/{sanitized}"));
        let id = format!("image-{}", uuid::Uuid::new_v4());
        if opts.is_cover {
            self.clear_cover();
        }
        let image = Image {
            id: id.clone(),
            filename,
            media_type: media::mime_for_extension(&ext).to_string(),
            data: opts.data,
            alt: opts.alt,
            is_cover: opts.is_cover,
        };
        self.image_ids.push(id.clone());
        self.images.insert(id.clone(), image);
        Ok(id)
    }

    pub fn get_image(&self, id: &str) -> Option<&Image> {
        self.images.get(id)
    }

    pub fn get_all_images(&self) -> Vec<&Image> {
        self.image_ids
            .iter()
            .filter_map(|id| self.images.get(id))
            .collect()
    }

    /// Remove an image. References inside existing markup are left alone.
    pub fn delete_image(&mut self, id: &str) -> Result<(), BuildError> {
        self.images
            .remove(id)
            .ok_or_else(|| BuildError::UnknownImage(id.to_string()))?;
        self.image_ids.retain(|i| i != id);
        Ok(())
    }

    /// Promote an image to cover, demoting any current one.
    pub fn set_cover(&mut self, id: &str) -> Result<(), BuildError> {
        if !self.images.contains_key(id) {
            return Err(BuildError::UnknownImage(id.to_string()));
        }
        self.clear_cover();
        if let Some(image) = self.images.get_mut(id) {
            image.is_cover = true;
        }
        Ok(())
    }

    pub fn cover(&self) -> Option<&Image> {
        self.image_ids
            .iter()
            .filter_map(|id| self.images.get(id))
            .find(|image| image.is_cover)
    }

    // --- Stylesheets ---

    /// Add a stylesheet. The filename is sanitized into `css/`.
    pub fn add_stylesheet(&mut self, opts: StylesheetOptions) -> Result<String, BuildError> {
        let mut sanitized = media::sanitize_filename(&opts.filename);
        if !sanitized.ends_with(".css") {
            sanitized = match sanitized.rsplit_once('.') {
                Some((stem, _)) => format!("{stem}.css"),
                None => format!("{sanitized}.css"),
            };
        }
        let filename = self.unique_filename(&format!("css/{sanitized}"));
        let id = format!("style-{}", uuid::Uuid::new_v4());
        let stylesheet = Stylesheet {
            id: id.clone(),
            filename,
            content: opts.content,
        };
        self.stylesheet_ids.push(id.clone());
        self.stylesheets.insert(id.clone(), stylesheet);
        Ok(id)
    }

    pub fn get_stylesheet(&self, id: &str) -> Option<&Stylesheet> {
        self.stylesheets.get(id)
    }

    pub fn get_all_stylesheets(&self) -> Vec<&Stylesheet> {
        self.stylesheet_ids
            .iter()
            .filter_map(|id| self.stylesheets.get(id))
            .collect()
    }

    /// Remove a stylesheet. References inside existing markup are left alone.
    pub fn delete_stylesheet(&mut self, id: &str) -> Result<(), BuildError> {
        self.stylesheets
            .remove(id)
            .ok_or_else(|| BuildError::UnknownStylesheet(id.to_string()))?;
        self.stylesheet_ids.retain(|s| s != id);
        Ok(())
    }

    // --- Metadata ---

    /// Shallow-merge a metadata patch. Applying the same patch twice is
    /// a no-op the second time. A patch carrying a blank title or
    /// creator is rejected whole, leaving the metadata untouched.
    pub fn set_metadata(&mut self, patch: MetadataPatch) -> Result<(), BuildError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(BuildError::InvalidMetadata("title must not be empty".into()));
        }
        if patch.creator.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(BuildError::InvalidMetadata(
                "creator must not be empty".into(),
            ));
        }

        let m = &mut self.metadata;
        if let Some(title) = patch.title {
            m.title = title;
        }
        if let Some(creator) = patch.creator {
            m.creator = creator;
        }
        if let Some(language) = patch.language {
            m.language = language;
        }
        if let Some(identifier) = patch.identifier {
            m.identifier = identifier;
        }
        if let Some(date) = patch.date {
            m.date = date;
        }
        if let Some(publisher) = patch.publisher {
            m.publisher = Some(publisher);
        }
        if let Some(description) = patch.description {
            m.description = Some(description);
        }
        if let Some(subjects) = patch.subjects {
            m.subjects = subjects;
        }
        if let Some(rights) = patch.rights {
            m.rights = Some(rights);
        }
        if let Some(contributors) = patch.contributors {
            m.contributors = contributors;
        }
        if let Some(dc_type) = patch.dc_type {
            m.dc_type = Some(dc_type);
        }
        if let Some(format) = patch.format {
            m.format = Some(format);
        }
        if let Some(source) = patch.source {
            m.source = Some(source);
        }
        if let Some(relation) = patch.relation {
            m.relation = Some(relation);
        }
        if let Some(coverage) = patch.coverage {
            m.coverage = Some(coverage);
        }
        Ok(())
    }

    // --- Validation and export ---

    pub fn validate(&self) -> ValidationReport {
        validate::validate(self)
    }

    /// Serialize to archive bytes.
    pub fn export(
        &self,
        version: EpubVersion,
        opts: &ExportOptions,
    ) -> Result<Vec<u8>, EpubError> {
        writer::write_epub_bytes(self, version, opts)
    }

    /// Serialize straight to a file.
    pub fn export_to_file(
        &self,
        path: impl AsRef<std::path::Path>,
        version: EpubVersion,
        opts: &ExportOptions,
    ) -> Result<(), EpubError> {
        let bytes = writer::write_epub_bytes(self, version, opts)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    // --- Internal plumbing shared with the codecs ---

    fn clear_cover(&mut self) {
        for image in self.images.values_mut() {
            image.is_cover = false;
        }
    }

    fn next_order(&self) -> u32 {
        1 + self
            .chapters
            .values()
            .map(|c| c.order)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn next_chapter_filename(&mut self) -> String {
        loop {
            self.chapter_counter += 1;
            let candidate = format!("text/chapter-{}.xhtml", self.chapter_counter);
            if !self.chapters.values().any(|c| c.filename == candidate) {
                return candidate;
            }
        }
    }

    fn unique_filename(&self, wanted: &str) -> String {
        let taken = |name: &str| {
            self.images.values().any(|i| i.filename == name)
                || self.stylesheets.values().any(|s| s.filename == name)
        };
        if !taken(wanted) {
            return wanted.to_string();
        }
        let (stem, ext) = match wanted.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
            None => (wanted.to_string(), String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{stem}-{n}{ext}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Attach a fully formed chapter record, wiring it into its parent's
    /// child list or the root list. Used by the build API and the
    /// deserialization pipeline.
    pub(crate) fn attach_chapter(&mut self, chapter: Chapter) {
        let id = chapter.id.clone();
        match chapter.parent.clone() {
            Some(parent_id) => {
                if let Some(parent) = self.chapters.get_mut(&parent_id) {
                    parent.children.push(id.clone());
                }
            }
            None => self.root_chapter_ids.push(id.clone()),
        }
        self.chapter_ids.push(id.clone());
        self.chapters.insert(id, chapter);
    }

    /// Whether moving `id` under `new_parent` would close a cycle:
    /// true when `new_parent` is `id` itself or one of its descendants.
    pub(crate) fn creates_parent_cycle(&self, id: &str, new_parent: &str) -> bool {
        let mut current = Some(new_parent.to_string());
        while let Some(next) = current {
            if next == id {
                return true;
            }
            current = self.chapters.get(&next).and_then(|c| c.parent.clone());
        }
        false
    }

    /// Move a chapter under a new parent (or to the root list).
    pub(crate) fn reparent_chapter(&mut self, id: &str, new_parent: Option<String>) {
        let old_parent = match self.chapters.get(id) {
            Some(chapter) => chapter.parent.clone(),
            None => return,
        };
        if old_parent == new_parent {
            return;
        }
        match &old_parent {
            Some(parent_id) => {
                if let Some(parent) = self.chapters.get_mut(parent_id) {
                    parent.children.retain(|c| c != id);
                }
            }
            None => self.root_chapter_ids.retain(|c| c != id),
        }
        match &new_parent {
            Some(parent_id) => {
                if let Some(parent) = self.chapters.get_mut(parent_id) {
                    parent.children.push(id.to_string());
                }
            }
            None => self.root_chapter_ids.push(id.to_string()),
        }
        if let Some(chapter) = self.chapters.get_mut(id) {
            chapter.parent = new_parent;
        }
    }

    pub(crate) fn get_chapter_mut(&mut self, id: &str) -> Option<&mut Chapter> {
        self.chapters.get_mut(id)
    }

    pub(crate) fn chapter_filename_exists(&self, filename: &str) -> bool {
        self.chapters.values().any(|c| c.filename == filename)
    }

    /// Chapters carrying their own markup, ascending reading order with
    /// insertion order breaking ties. This is the spine.
    pub(crate) fn spine_chapters(&self) -> Vec<&Chapter> {
        let mut spine: Vec<&Chapter> = self
            .chapter_ids
            .iter()
            .filter_map(|id| self.chapters.get(id))
            .filter(|c| matches!(c.body, ChapterBody::Inline(_)))
            .collect();
        spine.sort_by_key(|c| c.order);
        spine
    }

    /// Navigation target for a chapter: its own file, or the backing
    /// chapter's file plus the anchor for fragment chapters.
    pub(crate) fn chapter_href(&self, chapter: &Chapter) -> String {
        match &chapter.body {
            ChapterBody::Inline(_) => chapter.filename.clone(),
            ChapterBody::FragmentOf { source, fragment } => {
                let file = self
                    .chapters
                    .get(source)
                    .map(|c| c.filename.as_str())
                    .unwrap_or(chapter.filename.as_str());
                format!("{file}#{fragment}")
            }
        }
    }

    /// Insert a stylesheet parsed from an archive, keeping its original
    /// relative filename so chapter references stay intact.
    pub(crate) fn attach_parsed_stylesheet(&mut self, filename: String, content: String) {
        if self.stylesheets.values().any(|s| s.filename == filename) {
            return;
        }
        let id = format!("style-{}", uuid::Uuid::new_v4());
        let stylesheet = Stylesheet {
            id: id.clone(),
            filename,
            content,
        };
        self.stylesheet_ids.push(id.clone());
        self.stylesheets.insert(id, stylesheet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Publication {
        Publication::new(
            DublinCore::new("Test Book", "Author"),
            PublicationOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_empty_title() {
        let err = Publication::new(
            DublinCore::new("", "Author"),
            PublicationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidMetadata(_)));
    }

    #[test]
    fn new_fills_identifier_and_date() {
        let publication = minimal();
        assert!(publication.metadata.identifier.starts_with("urn:uuid:"));
        assert_eq!(publication.metadata.date.len(), 10);
        assert_eq!(publication.metadata.language, "en");
    }

    #[test]
    fn default_stylesheet_injected_unless_disabled() {
        let publication = minimal();
        assert_eq!(publication.get_all_stylesheets().len(), 1);
        assert_eq!(
            publication.get_all_stylesheets()[0].filename,
            DEFAULT_STYLESHEET_FILENAME
        );

        let bare = Publication::new(
            DublinCore::new("T", "A"),
            PublicationOptions {
                add_default_stylesheet: false,
                ..PublicationOptions::default()
            },
        )
        .unwrap();
        assert!(bare.get_all_stylesheets().is_empty());
    }

    #[test]
    fn chapter_order_and_filenames_are_minted() {
        let mut publication = minimal();
        let a = publication
            .add_chapter(ChapterOptions::new("A"))
            .unwrap();
        let b = publication
            .add_chapter(ChapterOptions::new("B"))
            .unwrap();
        assert_eq!(publication.get_chapter(&a).unwrap().order, 1);
        assert_eq!(publication.get_chapter(&b).unwrap().order, 2);
        assert_eq!(
            publication.get_chapter(&a).unwrap().filename,
            "text/chapter-1.xhtml"
        );
        assert_eq!(
            publication.get_chapter(&b).unwrap().filename,
            "text/chapter-2.xhtml"
        );
    }

    #[test]
    fn unknown_parent_leaves_publication_unchanged() {
        let mut publication = minimal();
        let err = publication
            .add_chapter(ChapterOptions::new("C").parent("chapter-missing"))
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownParent(_)));
        assert!(publication.get_all_chapters().is_empty());
    }

    #[test]
    fn nested_chapters_wire_children() {
        let mut publication = minimal();
        let part = publication
            .add_chapter(ChapterOptions::new("Part I"))
            .unwrap();
        let chapter = publication
            .add_chapter(ChapterOptions::new("Chapter 1").parent(part.clone()))
            .unwrap();
        let section = publication
            .add_chapter(ChapterOptions::new("Section 1.1").parent(chapter.clone()))
            .unwrap();

        let roots = publication.get_root_chapters();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].children, vec![chapter.clone()]);
        assert_eq!(
            publication.get_chapter(&chapter).unwrap().children,
            vec![section]
        );
    }

    #[test]
    fn delete_cascades_and_keeps_order_holes() {
        let mut publication = minimal();
        let part = publication.add_chapter(ChapterOptions::new("Part")).unwrap();
        let _child = publication
            .add_chapter(ChapterOptions::new("Child").parent(part.clone()))
            .unwrap();
        let other = publication.add_chapter(ChapterOptions::new("Other")).unwrap();

        publication.delete_chapter(&part).unwrap();
        assert_eq!(publication.get_all_chapters().len(), 1);
        assert_eq!(publication.get_chapter(&other).unwrap().order, 3);
    }

    #[test]
    fn image_extension_policy() {
        let mut publication = minimal();
        let id = publication
            .add_image(ImageOptions::new("Cover Art.PNG", vec![1, 2, 3]))
            .unwrap();
        let image = publication.get_image(&id).unwrap();
        assert_eq!(image.filename, "images/coverart.png");
        assert_eq!(image.media_type, "image/png");

        let err = publication
            .add_image(ImageOptions::new("notes.txt", vec![0]))
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidImageExtension { .. }));
    }

    #[test]
    fn duplicate_image_filenames_are_uniquified() {
        let mut publication = minimal();
        publication
            .add_image(ImageOptions::new("img.png", vec![1]))
            .unwrap();
        let second = publication
            .add_image(ImageOptions::new("img.png", vec![2]))
            .unwrap();
        assert_eq!(
            publication.get_image(&second).unwrap().filename,
            "images/img-1.png"
        );
    }

    #[test]
    fn set_cover_is_exclusive() {
        let mut publication = minimal();
        let a = publication
            .add_image(ImageOptions::new("a.png", vec![1]).cover(true))
            .unwrap();
        let b = publication
            .add_image(ImageOptions::new("b.png", vec![2]))
            .unwrap();
        publication.set_cover(&b).unwrap();
        assert!(!publication.get_image(&a).unwrap().is_cover);
        assert_eq!(publication.cover().unwrap().id, b);
    }

    #[test]
    fn set_metadata_is_idempotent() {
        let mut publication = minimal();
        let patch = MetadataPatch {
            publisher: Some("House".into()),
            subjects: Some(vec!["Fiction".into()]),
            ..MetadataPatch::default()
        };
        publication.set_metadata(patch.clone()).unwrap();
        let once = publication.metadata.clone();
        publication.set_metadata(patch).unwrap();
        assert_eq!(publication.metadata.publisher, once.publisher);
        assert_eq!(publication.metadata.subjects, once.subjects);
        assert_eq!(publication.metadata.title, "Test Book");
    }

    #[test]
    fn set_metadata_rejects_blank_required_fields() {
        let mut publication = minimal();

        let err = publication
            .set_metadata(MetadataPatch {
                title: Some("  ".into()),
                publisher: Some("House".into()),
                ..MetadataPatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidMetadata(_)));
        assert_eq!(publication.metadata.title, "Test Book");
        assert_eq!(publication.metadata.publisher, None);

        let err = publication
            .set_metadata(MetadataPatch {
                creator: Some(String::new()),
                ..MetadataPatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidMetadata(_)));
        assert_eq!(publication.metadata.creator, "Author");
    }
}
