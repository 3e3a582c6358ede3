use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use mdsite::fetch::HttpFetcher;
use mdsite::markdown::{FetchRequest, MarkdownRenderer};
use mdsite::rendering::raster::SoftwareRasterizer;
use mdsite::writer::PdfWriterFactory;
use mdsite::{
    ExportOptions, ExportPipeline, ExportState, GlobalScope, LoadState, Orientation, Page,
    ResourceDescriptor, ResourceLoader, SiteConfig,
};
use tiny_http::{Header, Response, Server};

const CV: &str = "# Jane Doe\n\nSoftware engineer.\n\n## Contact\n\njane@example.com\n\n---\n\n## Experience\n\n- Built things\n- Shipped things\n";

/// Serves a fixed set of paths on an ephemeral port; returns the base URL
/// and a counter of requests for `/lib.js`.
fn start_server() -> (String, Arc<AtomicUsize>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let lib_hits = Arc::new(AtomicUsize::new(0));
    let hits = lib_hits.clone();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let resp = match request.url() {
                "/cv.md" => Response::from_string(CV)
                    .with_header("Content-Type: text/markdown".parse::<Header>().unwrap()),
                "/lib.js" => {
                    hits.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    Response::from_string("window.extra = {};")
                }
                _ => Response::from_string("not found").with_status_code(404),
            };
            let _ = request.respond(resp);
        }
    });
    (format!("http://127.0.0.1:{}", port), lib_hits)
}

fn session(site: &SiteConfig) -> (Arc<HttpFetcher>, ResourceLoader) {
    let fetcher = Arc::new(HttpFetcher::new(&site.user_agent, Some(5_000)).unwrap());
    let scope = Arc::new(GlobalScope::with_names(site.bundled_probes()));
    let loader = ResourceLoader::new(fetcher.clone(), scope);
    (fetcher, loader)
}

#[tokio::test]
async fn fetched_markdown_exports_to_pdf() {
    let (base, _) = start_server();
    let site = SiteConfig::default();
    let (fetcher, loader) = session(&site);
    let out = tempfile::tempdir().unwrap();

    let mut page = Page::new("CV").with_mount("cv");
    let renderer = MarkdownRenderer::new(loader.clone(), fetcher)
        .with_dependencies(site.markdown_dependencies.clone());
    let mut req = FetchRequest::new(format!("{}/cv.md", base));
    req.remove_contact_section = true;
    renderer.fetch_and_render(&mut page, &req).await.unwrap();

    let html = page.to_html();
    assert!(html.contains("Jane Doe"));
    assert!(!html.contains("jane@example.com"));
    assert!(html.contains("role=\"main\""));

    let pipeline = ExportPipeline::new(
        loader,
        Arc::new(RwLock::new(page)),
        Arc::new(SoftwareRasterizer),
        Arc::new(PdfWriterFactory::new(out.path())),
    )
    .with_site(&site);
    let opts = ExportOptions {
        filename: Some("cv.pdf".into()),
        ..Default::default()
    };
    let report = pipeline.export(opts).await.unwrap();

    assert_eq!(pipeline.state(), ExportState::Saved);
    assert_eq!(report.path, out.path().join("cv.pdf"));
    // A short document is wider than tall at the default viewport.
    assert_eq!(report.transform.orientation, Orientation::Landscape);
    assert_eq!(report.transform.y, 10.0);

    let bytes = std::fs::read(&report.path).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    let names: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["cv.pdf".to_string()]);
}

#[tokio::test]
async fn missing_markdown_shows_inline_error() {
    let (base, _) = start_server();
    let site = SiteConfig::default();
    let (fetcher, loader) = session(&site);

    let mut page = Page::new("CV").with_mount("cv");
    let renderer = MarkdownRenderer::new(loader, fetcher);
    renderer
        .fetch_and_render(&mut page, &FetchRequest::new(format!("{}/nope.md", base)))
        .await
        .unwrap();

    let html = page.to_html();
    assert!(html.contains("Error loading content."));
    assert!(html.contains("color:red"));
    assert!(html.contains("role=\"alert\""));
}

#[tokio::test]
async fn remote_dependency_is_fetched_once() {
    let (base, lib_hits) = start_server();
    let site = SiteConfig::default();
    let (_, loader) = session(&site);
    let lib = ResourceDescriptor::with_probe(format!("{}/lib.js", base), "extra");

    let deps = [lib.clone()];
    let (a, b) = tokio::join!(loader.ensure(&deps), loader.ensure(&deps));
    a.unwrap();
    b.unwrap();
    loader.ensure(&deps).await.unwrap();

    assert_eq!(lib_hits.load(Ordering::SeqCst), 1);
    assert_eq!(loader.state(&lib.identifier), LoadState::Loaded);
    assert!(loader.scope().is_defined("extra"));
}

#[tokio::test]
async fn unreachable_dependency_fails_export_without_output() {
    let (base, _) = start_server();
    let mut site = SiteConfig::default();
    site.export_dependencies
        .push(ResourceDescriptor::with_probe(format!("{}/gone.js", base), "gone"));
    let (_, loader) = session(&site);
    let out = tempfile::tempdir().unwrap();

    let page = Page::new("CV").with_mount("cv");
    let pipeline = ExportPipeline::new(
        loader,
        Arc::new(RwLock::new(page)),
        Arc::new(SoftwareRasterizer),
        Arc::new(PdfWriterFactory::new(out.path())),
    )
    .with_site(&site);

    let err = pipeline.export(ExportOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("gone.js"), "{}", err);
    assert!(matches!(pipeline.state(), ExportState::Failed(_)));
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}
