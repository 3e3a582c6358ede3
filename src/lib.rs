//! mdsite
//!
//! Renders remote markdown into a styled page and exports the rendered page
//! as a single-page, image-based PDF.
//!
//! # Overview
//!
//! - **Resource loading**: external capabilities are fetched lazily, at most
//!   once at a time per identifier ([`ResourceLoader`])
//! - **Capture**: a page subtree is laid out at its natural size and
//!   rasterized ([`RenderTarget`])
//! - **Export**: the bitmap is fitted onto a fixed page and written as a
//!   document ([`ExportPipeline`])
//!
//! # Example
//!
//! ```no_run
//! use mdsite::{ExportOptions, ExportPipeline, GlobalScope, Page, ResourceLoader, SiteConfig};
//! use mdsite::rendering::raster::SoftwareRasterizer;
//! use mdsite::writer::PdfWriterFactory;
//! use std::sync::{Arc, RwLock};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let site = SiteConfig::default();
//! let fetcher = Arc::new(mdsite::fetch::HttpFetcher::new(&site.user_agent, None)?);
//! let scope = Arc::new(GlobalScope::with_names(site.bundled_probes()));
//! let loader = ResourceLoader::new(fetcher, scope);
//!
//! let mut page = Page::new("CV").with_mount("cv");
//! page.set_inner_html("#cv", "<h1>Jane Doe</h1><p>Engineer</p>")?;
//!
//! let pipeline = ExportPipeline::new(
//!     loader,
//!     Arc::new(RwLock::new(page)),
//!     Arc::new(SoftwareRasterizer),
//!     Arc::new(PdfWriterFactory::new(&site.output_dir)),
//! )
//! .with_site(&site);
//! pipeline.export(ExportOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod capability;
pub mod error;
pub mod export;
pub mod fetch;
pub mod loader;
pub mod markdown;
pub mod navbar;
pub mod page;
pub mod rendering;
pub mod scope;
pub mod writer;

pub use error::{DependencyLoadError, Error, ExportError, ExportStage, Result};
pub use export::{ExportPipeline, ExportReport, ExportState, LogNotifier, Notifier};
pub use loader::{LoadState, ResourceDescriptor, ResourceLoader};
pub use page::Page;
pub use rendering::{
    compute_transform, CaptureResult, ImageFormat, Orientation, PageConfig, PlacementTransform,
    RenderTarget, MM_PER_PX,
};
pub use scope::GlobalScope;
pub use writer::{PageFormat, Unit};

/// Probe name announcing the rasterizer capability
pub const RASTERIZER_PROBE: &str = "rasterizer";
/// Probe name announcing the document writer capability
pub const WRITER_PROBE: &str = "pdf-writer";
pub const MARKDOWN_PROBE: &str = "markdown";
pub const SANITIZER_PROBE: &str = "sanitizer";

/// Page session configuration
///
/// The default dependency set names the four bundled capabilities by
/// logical identifier. A host that bundles them pre-defines their probes
/// (see [`SiteConfig::bundled_probes`]) and nothing is fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteConfig {
    /// User agent sent with every fetch
    pub user_agent: String,
    /// Containing width for layout, in CSS px
    pub viewport_width: u32,
    /// Where saved documents land
    pub output_dir: PathBuf,
    /// Optional fetch timeout; none by default
    pub timeout_ms: Option<u64>,
    /// Resources required before rendering markdown
    pub markdown_dependencies: Vec<ResourceDescriptor>,
    /// Resources required before exporting
    pub export_dependencies: Vec<ResourceDescriptor>,
    pub rasterizer_probe: String,
    pub writer_probe: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("mdsite/{}", env!("CARGO_PKG_VERSION")),
            viewport_width: 1280,
            output_dir: PathBuf::from("."),
            timeout_ms: None,
            markdown_dependencies: vec![
                ResourceDescriptor::with_probe("mdsite:markdown", MARKDOWN_PROBE),
                ResourceDescriptor::with_probe("mdsite:sanitizer", SANITIZER_PROBE),
            ],
            export_dependencies: vec![
                ResourceDescriptor::with_probe("mdsite:rasterizer", RASTERIZER_PROBE),
                ResourceDescriptor::with_probe("mdsite:pdf-writer", WRITER_PROBE),
            ],
            rasterizer_probe: RASTERIZER_PROBE.to_string(),
            writer_probe: WRITER_PROBE.to_string(),
        }
    }
}

impl SiteConfig {
    /// Probe names of the capabilities this crate ships with.
    pub fn bundled_probes(&self) -> Vec<String> {
        vec![
            MARKDOWN_PROBE.to_string(),
            SANITIZER_PROBE.to_string(),
            self.rasterizer_probe.clone(),
            self.writer_probe.clone(),
        ]
    }
}

/// Fully resolved export settings
///
/// # Examples
///
/// ```
/// let cfg = mdsite::ExportConfig::default();
/// assert_eq!(cfg.selector, "#cv");
/// assert_eq!(cfg.margin, 10.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Root element to capture
    pub selector: String,
    /// Output document filename
    pub filename: String,
    /// Rasterization supersampling factor
    pub scale: f64,
    /// Page margin in millimetres
    pub margin: f64,
    /// Lossy compression level, 0..=1
    pub quality: f64,
    /// Fill behind transparent regions
    pub background_color: String,
    pub use_cors: bool,
    pub allow_taint: bool,
    pub image_format: ImageFormat,
    pub page_format: PageFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            selector: "#cv".to_string(),
            filename: "document.pdf".to_string(),
            scale: 2.0,
            margin: 10.0,
            quality: 0.98,
            background_color: "#ffffff".to_string(),
            use_cors: true,
            allow_taint: false,
            image_format: ImageFormat::Jpeg,
            page_format: PageFormat::A4,
        }
    }
}

/// Caller-supplied overrides; unset fields keep the configured defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportOptions {
    pub selector: Option<String>,
    pub filename: Option<String>,
    pub scale: Option<f64>,
    pub margin: Option<f64>,
    pub quality: Option<f64>,
    pub background_color: Option<String>,
    #[serde(rename = "useCORS")]
    pub use_cors: Option<bool>,
    pub allow_taint: Option<bool>,
    pub image_format: Option<ImageFormat>,
    pub page_format: Option<PageFormat>,
}

impl ExportOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("bad export options: {}", e)))
    }
}

impl ExportConfig {
    /// Merge `options` over `self` and validate the result.
    pub fn merged(&self, options: &ExportOptions) -> Result<ExportConfig> {
        let o = options.clone();
        let cfg = ExportConfig {
            selector: o.selector.unwrap_or_else(|| self.selector.clone()),
            filename: o.filename.unwrap_or_else(|| self.filename.clone()),
            scale: o.scale.unwrap_or(self.scale),
            margin: o.margin.unwrap_or(self.margin),
            quality: o.quality.unwrap_or(self.quality),
            background_color: o
                .background_color
                .unwrap_or_else(|| self.background_color.clone()),
            use_cors: o.use_cors.unwrap_or(self.use_cors),
            allow_taint: o.allow_taint.unwrap_or(self.allow_taint),
            image_format: o.image_format.unwrap_or(self.image_format),
            page_format: o.page_format.unwrap_or(self.page_format),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.selector.trim().is_empty() {
            return Err(Error::Config("selector is empty".into()));
        }
        if self.filename.is_empty()
            || self.filename.starts_with('.')
            || self.filename.contains(['/', '\\'])
        {
            return Err(Error::Config(format!("invalid filename {:?}", self.filename)));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::Config(format!("scale must be positive, got {}", self.scale)));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(Error::Config(format!("quality must be within 0..=1, got {}", self.quality)));
        }
        let (w, h) = self.page_format.size_mm();
        if !(w > 0.0 && h > 0.0) {
            return Err(Error::Config(format!("page size {}x{}mm is not positive", w, h)));
        }
        if !(self.margin >= 0.0 && 2.0 * self.margin < w.min(h)) {
            return Err(Error::Config(format!(
                "margin {}mm leaves no room on a {}x{}mm page",
                self.margin, w, h
            )));
        }
        if rendering::paint::parse_color(&self.background_color).is_none() {
            return Err(Error::Config(format!(
                "unrecognized background color {:?}",
                self.background_color
            )));
        }
        Ok(())
    }

    pub fn page_config(&self) -> PageConfig {
        let (width, height) = self.page_format.size_mm();
        PageConfig {
            width,
            height,
            margin: self.margin,
        }
    }

    pub fn capture_settings(&self) -> rendering::CaptureSettings {
        rendering::CaptureSettings {
            scale: self.scale,
            use_cors: self.use_cors,
            allow_taint: self.allow_taint,
            background_color: self.background_color.clone(),
        }
    }
}
