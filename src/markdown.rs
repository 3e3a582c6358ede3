//! Markdown to sanitized HTML, mounted into the host page.
//!
//! Formatting and sanitizing are collaborator traits; `CmarkFormatter` and
//! `ScriptStripper` are the bundled implementations.

use crate::fetch::ResourceFetcher;
use crate::loader::{ResourceDescriptor, ResourceLoader};
use crate::page::{escape_attr, escape_text, Page};
use crate::Result;
use pulldown_cmark::{html, Options, Parser};
use scraper::{ElementRef, Html, Node};
use std::sync::Arc;

/// Markdown text to HTML. Pure and synchronous.
pub trait MarkdownFormatter: Send + Sync {
    fn parse(&self, markdown: &str) -> String;
}

/// Strips script-executing content from HTML. Total on well-formed input.
pub trait HtmlSanitizer: Send + Sync {
    fn sanitize(&self, html: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CmarkFormatter;

impl MarkdownFormatter for CmarkFormatter {
    fn parse(&self, markdown: &str) -> String {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_TASKLISTS);
        let parser = Parser::new_ext(markdown, opts);
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

const DROPPED_ELEMENTS: &[&str] = &[
    "script", "iframe", "object", "embed", "frame", "frameset", "base", "link", "meta",
    "template", "noscript",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "br", "col", "hr", "img", "input", "source", "track", "wbr",
];

const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "xlink:href"];

/// Allow-list sanitizer built on the HTML5 parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptStripper;

impl ScriptStripper {
    fn is_script_url(value: &str) -> bool {
        let compact: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.starts_with("javascript:")
            || compact.starts_with("vbscript:")
            || compact.starts_with("data:text/html")
    }

    fn write_children(el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => out.push_str(&escape_text(t)),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        Self::write_element(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(el: ElementRef<'_>, out: &mut String) {
        let name = el.value().name();
        if DROPPED_ELEMENTS.contains(&name) {
            return;
        }
        out.push('<');
        out.push_str(name);
        for (key, value) in el.value().attrs() {
            let lower = key.to_ascii_lowercase();
            if lower.starts_with("on") || lower == "srcdoc" {
                continue;
            }
            if URL_ATTRIBUTES.contains(&lower.as_str()) && Self::is_script_url(value) {
                continue;
            }
            out.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        Self::write_children(el, out);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

impl HtmlSanitizer for ScriptStripper {
    fn sanitize(&self, html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let mut out = String::with_capacity(html.len());
        Self::write_children(fragment.root_element(), &mut out);
        out
    }
}

/// Replace the first `## Contact` section (up to and including the next
/// `---` rule) with a bare rule.
pub fn remove_contact_section(markdown: &str) -> String {
    let Some(start) = markdown.find("## Contact") else {
        return markdown.to_string();
    };
    let Some(rel_end) = markdown[start..].find("---") else {
        return markdown.to_string();
    };
    let end = start + rel_end + 3;
    format!("{}---{}", &markdown[..start], &markdown[end..])
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub markdown: String,
    pub target_selector: String,
    pub remove_contact_section: bool,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub target_selector: String,
    pub remove_contact_section: bool,
    pub error_message: String,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target_selector: "#cv".to_string(),
            remove_contact_section: false,
            error_message: "Error loading content.".to_string(),
        }
    }
}

/// Renders markdown into a page once the formatter/sanitizer resources are loaded.
pub struct MarkdownRenderer {
    loader: ResourceLoader,
    fetcher: Arc<dyn ResourceFetcher>,
    formatter: Box<dyn MarkdownFormatter>,
    sanitizer: Box<dyn HtmlSanitizer>,
    dependencies: Vec<ResourceDescriptor>,
}

impl MarkdownRenderer {
    pub fn new(loader: ResourceLoader, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            loader,
            fetcher,
            formatter: Box::new(CmarkFormatter),
            sanitizer: Box::new(ScriptStripper),
            dependencies: Vec::new(),
        }
    }

    pub fn with_formatter(mut self, formatter: impl MarkdownFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: impl HtmlSanitizer + 'static) -> Self {
        self.sanitizer = Box::new(sanitizer);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<ResourceDescriptor>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn render(&self, page: &mut Page, req: &RenderRequest) -> Result<()> {
        let md = if req.remove_contact_section {
            remove_contact_section(&req.markdown)
        } else {
            req.markdown.clone()
        };
        let html = self.formatter.parse(&md);
        let safe = self.sanitizer.sanitize(&html);

        page.set_inner_html(&req.target_selector, safe)?;
        page.set_attribute(&req.target_selector, "tabindex", "0")?;
        page.set_attribute(&req.target_selector, "role", "main")?;
        page.set_attribute(&req.target_selector, "aria-label", "Markdown content")?;
        page.ensure_skip_link(&req.target_selector, "Skip to main content");
        Ok(())
    }

    /// Fetch remote markdown and render it. Fetch or render failures are
    /// shown inline in the target; dependency failures are returned.
    pub async fn fetch_and_render(&self, page: &mut Page, req: &FetchRequest) -> Result<()> {
        self.loader.ensure(&self.dependencies).await?;

        let outcome = match self.fetcher.fetch_text(&req.url).await {
            Ok(markdown) => self.render(
                page,
                &RenderRequest {
                    markdown,
                    target_selector: req.target_selector.clone(),
                    remove_contact_section: req.remove_contact_section,
                },
            ),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            log::warn!("Rendering {} failed: {}", req.url, e);
            let block = format!(
                "<div style='color:red'>{}: {}</div>",
                escape_text(&req.error_message),
                escape_text(&e.to_string())
            );
            page.set_inner_html(&req.target_selector, block)?;
            page.set_attribute(&req.target_selector, "role", "alert")?;
            page.set_attribute(&req.target_selector, "tabindex", "0")?;
        }
        Ok(())
    }
}
