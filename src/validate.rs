//! Cheap structural validation. This is not a conformance checker; it
//! catches the mistakes that would produce a broken archive.

use serde::Serialize;

use crate::publication::Publication;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate(publication: &Publication) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if publication.metadata.title.trim().is_empty() {
        errors.push("Title is required".to_string());
    }
    if publication.metadata.creator.trim().is_empty() {
        errors.push("Creator/Author is required".to_string());
    }

    let chapters = publication.get_all_chapters();
    if chapters.is_empty() {
        warnings.push("No chapters added to EPUB".to_string());
    }

    for chapter in &chapters {
        if let Some(parent) = &chapter.parent {
            if publication.get_chapter(parent).is_none() {
                errors.push(format!(
                    "Chapter \"{}\" ({}) references non-existent parent \"{}\"",
                    chapter.title, chapter.id, parent
                ));
            }
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}
