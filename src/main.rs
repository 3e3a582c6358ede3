//! mdsite CLI
//!
//! Usage:
//!   mdsite render --url <MD>    Render remote markdown and print the page HTML
//!   mdsite export --url <MD>    Render remote markdown and export it as a PDF

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use mdsite::fetch::HttpFetcher;
use mdsite::markdown::{FetchRequest, MarkdownRenderer};
use mdsite::rendering::raster::SoftwareRasterizer;
use mdsite::writer::PdfWriterFactory;
use mdsite::{ExportOptions, ExportPipeline, GlobalScope, Page, ResourceLoader, SiteConfig};

#[derive(Parser)]
#[command(name = "mdsite", about = "Render remote markdown and export it as PDF", version)]
struct Cli {
    /// Site configuration file (JSON)
    #[arg(long, global = true)]
    site: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Markdown document to render
    #[arg(long)]
    url: String,

    /// Mount point the markdown is rendered into
    #[arg(long, default_value = "#cv")]
    selector: String,

    /// Drop the "Contact" section from the markdown
    #[arg(long)]
    remove_contact: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered page
    Render {
        #[command(flatten)]
        source: Source,
    },

    /// Export the rendered page as a single-page PDF
    Export {
        #[command(flatten)]
        source: Source,

        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Output filename
        #[arg(long)]
        filename: Option<String>,

        /// Page margin in millimetres
        #[arg(long)]
        margin: Option<f64>,

        /// Rasterization supersampling factor
        #[arg(long)]
        scale: Option<f64>,

        /// JPEG quality, 0 to 1
        #[arg(long)]
        quality: Option<f64>,

        /// Export options file (JSON); flags override it
        #[arg(long)]
        options: Option<PathBuf>,
    },
}

fn load_site(path: Option<&PathBuf>) -> anyhow::Result<SiteConfig> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading site config {}", p.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", p.display()))
        }
        None => Ok(SiteConfig::default()),
    }
}

async fn render_page(site: &SiteConfig, source: &Source) -> anyhow::Result<(ResourceLoader, Page)> {
    let url = url::Url::parse(&source.url).with_context(|| format!("invalid url {:?}", source.url))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported url scheme {:?}", url.scheme());
    }

    let fetcher = Arc::new(HttpFetcher::new(&site.user_agent, site.timeout_ms)?);
    let scope = Arc::new(GlobalScope::with_names(site.bundled_probes()));
    let loader = ResourceLoader::new(fetcher.clone(), scope);

    let mount = source.selector.trim_start_matches('#');
    let mut page = Page::new(mount).with_mount(mount);
    let renderer = MarkdownRenderer::new(loader.clone(), fetcher)
        .with_dependencies(site.markdown_dependencies.clone());
    let mut req = FetchRequest::new(url.as_str());
    req.target_selector = source.selector.clone();
    req.remove_contact_section = source.remove_contact;
    renderer.fetch_and_render(&mut page, &req).await?;
    Ok((loader, page))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut site = load_site(cli.site.as_ref())?;

    match cli.command {
        Commands::Render { source } => {
            let (_, page) = render_page(&site, &source).await?;
            println!("{}", page.to_html());
        }
        Commands::Export {
            source,
            out,
            filename,
            margin,
            scale,
            quality,
            options,
        } => {
            let mut opts = match options {
                Some(p) => {
                    let raw = std::fs::read_to_string(&p)
                        .with_context(|| format!("reading export options {}", p.display()))?;
                    ExportOptions::from_json(&raw)?
                }
                None => ExportOptions::default(),
            };
            opts.selector = Some(source.selector.clone());
            opts.filename = filename.or(opts.filename);
            opts.margin = margin.or(opts.margin);
            opts.scale = scale.or(opts.scale);
            opts.quality = quality.or(opts.quality);
            if let Some(dir) = out {
                site.output_dir = dir;
            }

            let (loader, page) = render_page(&site, &source).await?;
            let pipeline = ExportPipeline::new(
                loader,
                Arc::new(RwLock::new(page)),
                Arc::new(SoftwareRasterizer),
                Arc::new(PdfWriterFactory::new(&site.output_dir)),
            )
            .with_site(&site);

            let report = pipeline.export(opts).await?;
            println!("{}", report.path.display());
        }
    }
    Ok(())
}
