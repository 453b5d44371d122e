/// Top-level error type. All public API functions return this or one of
/// the stage-specific enums below.
#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised at the build-API boundary. These are synchronous and
/// leave the publication unchanged.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Unknown parent chapter: {0}")]
    UnknownParent(String),

    #[error("Unknown chapter: {0}")]
    UnknownChapter(String),

    #[error("Unknown image: {0}")]
    UnknownImage(String),

    #[error("Unknown stylesheet: {0}")]
    UnknownStylesheet(String),

    #[error("Unsupported image extension for {filename}: expected one of jpg, jpeg, png, gif, svg, webp")]
    InvalidImageExtension { filename: String },

    #[error("Heading level {0} is out of range 1-6")]
    InvalidHeadingLevel(u8),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} entries, exceeding limit of {limit}")]
    TooManyEntries { count: u64, limit: u64 },

    #[error("Archive decompresses to {bytes} bytes, exceeding limit of {limit}")]
    ArchiveTooLarge { bytes: u64, limit: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Failed to parse EPUB file: {0}")]
    File(#[source] Box<ReadError>),

    #[error("Failed to parse EPUB buffer: {0}")]
    Buffer(#[source] Box<ReadError>),

    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    #[error("Missing META-INF/container.xml")]
    MissingContainer,

    #[error("No rootfile with a full-path attribute in container.xml")]
    MissingPackagePath,

    #[error("Missing package document: {0}")]
    MissingPackageDocument(String),

    #[error("Malformed XML in {entry}: {detail}")]
    MalformedXml { entry: String, detail: String },

    #[error("Missing required content: {0}")]
    MissingContent(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Validation failed: {}", errors.join("; "))]
    ValidationRejected { errors: Vec<String> },

    #[error("Write failed: {detail}")]
    WriteFailed { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WriteError {
    pub(crate) fn zip(e: zip::result::ZipError) -> Self {
        WriteError::WriteFailed {
            detail: e.to_string(),
        }
    }
}
