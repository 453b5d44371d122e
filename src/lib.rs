//! EPUB construction, parsing, and merging.
//!
//! One [`Publication`](publication::Publication) value models a book in
//! memory; the writer serializes it as EPUB 2 or EPUB 3, the reader
//! rebuilds it from either flavor, and the merge pipeline composes
//! several publications into a new one.
//!
//! ```no_run
//! use bindery::prelude::*;
//!
//! # fn main() -> Result<(), EpubError> {
//! let mut book = Publication::new(
//!     DublinCore::new("Spare Parts", "N. Bolts"),
//!     PublicationOptions::default(),
//! )?;
//! book.add_chapter(ChapterOptions::new("One").content("<p>It begins.</p>"))?;
//! book.export_to_file("spare-parts.epub", EpubVersion::V3, &ExportOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod media;
pub mod merge;
pub mod nav;
pub mod ncx;
pub mod opf;
pub mod publication;
pub mod reader;
pub mod security;
pub mod validate;
pub mod writer;
pub mod xhtml;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::merge::{
        add_publication_as_chapter, merge_publications, MergeContext, SectionOptions,
    };
    pub use crate::publication::*;
    pub use crate::reader::{read_epub, read_epub_bytes, ReadOptions};
    pub use crate::validate::ValidationReport;
    pub use crate::writer::{write_epub, write_epub_bytes, ExportOptions};
}
