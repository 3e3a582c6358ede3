//! Export pipeline: dependencies, capture, placement, document write.
//!
//! Stages run strictly in order. Any failure stops the pipeline, is logged
//! and shown to the user through the `Notifier`, and leaves no output file.

use crate::capability::{Capability, CapabilityResolver};
use crate::error::{ExportError, ExportStage};
use crate::loader::{ResourceDescriptor, ResourceLoader};
use crate::page::Page;
use crate::rendering::{PlacementTransform, Rasterizer, RenderTarget};
use crate::writer::{Unit, WriterFactory, WriterOptions};
use crate::{Error, ExportConfig, ExportOptions, SiteConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, PartialEq)]
pub enum ExportState {
    Idle,
    EnsuringDependencies,
    Capturing,
    ComputingTransform,
    Writing,
    Saved,
    Failed(String),
}

/// Surfaces a message to the end user
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier for headless hosts: the message goes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::error!("{}", message);
    }
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub transform: PlacementTransform,
}

pub struct ExportPipeline {
    loader: ResourceLoader,
    page: Arc<RwLock<Page>>,
    rasterizer: CapabilityResolver<dyn Rasterizer>,
    writer: CapabilityResolver<dyn WriterFactory>,
    dependencies: Vec<ResourceDescriptor>,
    defaults: ExportConfig,
    viewport_width: u32,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ExportState>,
}

impl ExportPipeline {
    pub fn new(
        loader: ResourceLoader,
        page: Arc<RwLock<Page>>,
        rasterizer: Arc<dyn Rasterizer>,
        writer: Arc<dyn WriterFactory>,
    ) -> Self {
        let site = SiteConfig::default();
        Self {
            loader,
            page,
            rasterizer: CapabilityResolver::new(site.rasterizer_probe, rasterizer),
            writer: CapabilityResolver::new(site.writer_probe, writer),
            dependencies: site.export_dependencies,
            defaults: ExportConfig::default(),
            viewport_width: site.viewport_width,
            notifier: Arc::new(LogNotifier),
            state: Mutex::new(ExportState::Idle),
        }
    }

    /// Take probes, dependencies and viewport width from `site`.
    pub fn with_site(mut self, site: &SiteConfig) -> Self {
        self.rasterizer = CapabilityResolver::new(
            site.rasterizer_probe.clone(),
            self.rasterizer_provider(),
        );
        self.writer = CapabilityResolver::new(site.writer_probe.clone(), self.writer_provider());
        self.dependencies = site.export_dependencies.clone();
        self.viewport_width = site.viewport_width;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<ResourceDescriptor>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_defaults(mut self, defaults: ExportConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn rasterizer_provider(&self) -> Arc<dyn Rasterizer> {
        self.rasterizer.provider()
    }

    fn writer_provider(&self) -> Arc<dyn WriterFactory> {
        self.writer.provider()
    }

    pub fn state(&self) -> ExportState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn enter(&self, next: ExportState) {
        log::debug!("Export state -> {:?}", next);
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Run one export. Failures are logged and reported through the
    /// notifier before being returned.
    pub async fn export(&self, options: ExportOptions) -> Result<ExportReport, ExportError> {
        self.enter(ExportState::Idle);
        match self.run(&options).await {
            Ok(report) => {
                self.enter(ExportState::Saved);
                log::info!(
                    "Exported {} ({}x{} px, {} page)",
                    report.path.display(),
                    report.pixel_width,
                    report.pixel_height,
                    report.transform.orientation.as_str()
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                self.enter(ExportState::Failed(message.clone()));
                log::error!("{}", message);
                self.notifier.notify(&message);
                Err(e)
            }
        }
    }

    async fn run(&self, options: &ExportOptions) -> Result<ExportReport, ExportError> {
        let config = self
            .defaults
            .merged(options)
            .map_err(|e| ExportError::new(ExportStage::Configuring, e))?;

        self.enter(ExportState::EnsuringDependencies);
        let stage = ExportStage::EnsuringDependencies;
        self.loader
            .ensure(&self.dependencies)
            .await
            .map_err(|e| ExportError::new(stage, e.into()))?;
        let scope = self.loader.scope();
        let rasterizer = match self.rasterizer.resolve(scope) {
            Capability::Available(r) => r,
            Capability::Unavailable => {
                let probe = self.rasterizer.probe().to_string();
                return Err(ExportError::new(stage, Error::CapabilityUnavailable(probe)));
            }
        };
        let factory = match self.writer.resolve(scope) {
            Capability::Available(w) => w,
            Capability::Unavailable => {
                let probe = self.writer.probe().to_string();
                return Err(ExportError::new(stage, Error::CapabilityUnavailable(probe)));
            }
        };

        self.enter(ExportState::Capturing);
        let page = self.page.read().unwrap_or_else(|e| e.into_inner()).clone();
        let target = RenderTarget::new(rasterizer, self.viewport_width);
        let capture = target
            .capture(&page, &config.selector, &config.capture_settings())
            .await
            .map_err(|e| ExportError::new(ExportStage::Capturing, e))?;

        self.enter(ExportState::ComputingTransform);
        let transform = target.compute_transform(&capture, &config.page_config());

        self.enter(ExportState::Writing);
        let write = || -> crate::Result<PathBuf> {
            let data = capture.bitmap.to_image_data(config.image_format, config.quality)?;
            let mut writer = factory.create(WriterOptions {
                orientation: transform.orientation,
                unit: Unit::Mm,
                format: config.page_format,
            })?;
            writer.add_image(
                &data,
                config.image_format,
                transform.x,
                transform.y,
                transform.width,
                transform.height,
            )?;
            writer.save(&config.filename)
        };
        let path = write().map_err(|e| ExportError::new(ExportStage::Writing, e))?;

        Ok(ExportReport {
            path,
            pixel_width: capture.width,
            pixel_height: capture.height,
            transform,
        })
    }
}
