//! Navigation bar host contract.
//!
//! The bar is owned by the host; this crate only hands it options and the
//! callback its action button fires.

use crate::export::ExportPipeline;
use crate::page::{escape_attr, escape_text};
use crate::ExportOptions;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub type Action = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavbarOptions {
    pub show_action_button: bool,
    pub contact_list: Vec<Contact>,
}

pub trait NavbarHost: Send + Sync {
    fn init(&self, options: NavbarOptions, action: Action);
}

/// Wire the bar's action button to `pipeline.export(options)`.
///
/// Each press spawns one export on the runtime current at attach time and
/// returns immediately. Failures are already logged and notified by the
/// pipeline, so the spawned task drops them.
pub fn attach_export<H: NavbarHost + ?Sized>(
    host: &H,
    navbar: NavbarOptions,
    pipeline: Arc<ExportPipeline>,
    options: ExportOptions,
) {
    let handle = tokio::runtime::Handle::current();
    let action: Action = Arc::new(move || {
        let pipeline = pipeline.clone();
        let options = options.clone();
        handle.spawn(async move {
            if pipeline.export(options).await.is_err() {
                log::debug!("Export triggered from navbar did not complete");
            }
        });
    });
    host.init(navbar, action);
}

/// Static markup navbar
///
/// Renders the bar as HTML and fires the stored action on `click`.
#[derive(Default)]
pub struct HtmlNavbar {
    state: Mutex<Option<(NavbarOptions, Action)>>,
}

impl HtmlNavbar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Press the action button. Returns false when there is none.
    pub fn click(&self) -> bool {
        let action = {
            let g = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match g.as_ref() {
                Some((opts, action)) if opts.show_action_button => action.clone(),
                _ => return false,
            }
        };
        action();
        true
    }

    pub fn to_html(&self) -> String {
        let g = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some((opts, _)) = g.as_ref() else {
            return String::new();
        };
        let mut html = String::from("<nav role=\"navigation\"><ul>");
        for c in &opts.contact_list {
            html.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>",
                escape_attr(&c.href),
                escape_text(&c.label)
            ));
        }
        html.push_str("</ul>");
        if opts.show_action_button {
            html.push_str("<button type=\"button\" aria-label=\"Download PDF\">PDF</button>");
        }
        html.push_str("</nav>");
        html
    }
}

impl NavbarHost for HtmlNavbar {
    fn init(&self, options: NavbarOptions, action: Action) {
        log::debug!(
            "Navbar initialised with {} contacts, action button {}",
            options.contact_list.len(),
            if options.show_action_button { "shown" } else { "hidden" }
        );
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some((options, action));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::Notifier;
    use crate::fetch::ResourceFetcher;
    use crate::page::Page;
    use crate::rendering::raster::SoftwareRasterizer;
    use crate::scope::GlobalScope;
    use crate::writer::PdfWriterFactory;
    use crate::{Error, ExportState, ResourceLoader, SiteConfig};
    use async_trait::async_trait;
    use std::sync::RwLock;
    use std::time::Duration;

    struct NoFetch;

    #[async_trait]
    impl ResourceFetcher for NoFetch {
        async fn fetch(&self, url: &str) -> crate::Result<Vec<u8>> {
            Err(Error::Fetch(url.to_string()))
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl Notifier for Collect {
        fn notify(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn navbar_options() -> NavbarOptions {
        NavbarOptions {
            show_action_button: true,
            contact_list: vec![Contact {
                label: "Mail & more".into(),
                href: "mailto:jane@example.com".into(),
            }],
        }
    }

    #[test]
    fn markup_lists_contacts_and_button() {
        let bar = HtmlNavbar::new();
        assert_eq!(bar.to_html(), "");
        bar.init(navbar_options(), Arc::new(|| {}));
        let html = bar.to_html();
        assert!(html.contains("href=\"mailto:jane@example.com\""));
        assert!(html.contains("Mail &amp; more"));
        assert!(html.contains("<button"));
    }

    #[test]
    fn hidden_button_does_not_fire() {
        let bar = HtmlNavbar::new();
        let opts = NavbarOptions { show_action_button: false, ..navbar_options() };
        bar.init(opts, Arc::new(|| panic!("should not fire")));
        assert!(!bar.click());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn click_runs_export_and_failure_is_only_notified() {
        let dir = tempfile::tempdir().unwrap();
        let site = SiteConfig::default();
        let loader = ResourceLoader::new(
            Arc::new(NoFetch),
            Arc::new(GlobalScope::with_names(site.bundled_probes())),
        );
        let page = Page::new("t").with_mount("cv");
        let notes = Arc::new(Collect::default());
        let pipeline = Arc::new(
            ExportPipeline::new(
                loader,
                Arc::new(RwLock::new(page)),
                Arc::new(SoftwareRasterizer),
                Arc::new(PdfWriterFactory::new(dir.path())),
            )
            .with_notifier(notes.clone()),
        );

        let bar = HtmlNavbar::new();
        let missing = ExportOptions { selector: Some("#missing".into()), ..Default::default() };
        attach_export(&bar, navbar_options(), pipeline.clone(), missing);
        assert!(bar.click());

        for _ in 0..100 {
            if !notes.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(pipeline.state(), ExportState::Failed(_)));
        assert_eq!(notes.0.lock().unwrap().len(), 1);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
