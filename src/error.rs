//! Error types for loading, rendering and exporting

use thiserror::Error;

/// Result type alias for mdsite operations
pub type Result<T> = std::result::Result<T, Error>;

/// A failed attempt to load an external resource.
///
/// Cloneable because a single failed fetch is delivered to every caller
/// that was waiting on the same in-flight load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to load dependency {identifier}: {cause}")]
pub struct DependencyLoadError {
    pub identifier: String,
    pub cause: String,
}

/// Errors that can occur while rendering or exporting a page
#[derive(Error, Debug)]
pub enum Error {
    /// An external resource could not be fetched (retried on the next call)
    #[error(transparent)]
    DependencyLoad(#[from] DependencyLoadError),

    /// The capture selector matched nothing on the page
    #[error("No element matches selector {selector:?}")]
    ElementNotFound { selector: String },

    /// A required capability is still missing after its dependencies loaded
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Assembling or saving the output document failed
    #[error("Document write failed: {0}")]
    DocumentWrite(String),

    /// Rasterization failed
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Fetching remote content failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::DocumentWrite(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Render(err.to_string())
    }
}

/// The pipeline stage an export failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Configuring,
    EnsuringDependencies,
    Capturing,
    ComputingTransform,
    Writing,
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExportStage::Configuring => "configuration",
            ExportStage::EnsuringDependencies => "dependency loading",
            ExportStage::Capturing => "capture",
            ExportStage::ComputingTransform => "layout",
            ExportStage::Writing => "document write",
        };
        f.write_str(name)
    }
}

/// Single human-readable failure surfaced by `ExportPipeline::export`
#[derive(Error, Debug)]
#[error("Export {stage} failed: {source}")]
pub struct ExportError {
    pub stage: ExportStage,
    #[source]
    pub source: Error,
}

impl ExportError {
    pub fn new(stage: ExportStage, source: Error) -> Self {
        Self { stage, source }
    }
}
