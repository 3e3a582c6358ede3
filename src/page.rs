//! The host page that rendered content is mounted into.
//!
//! A page is a fixed HTML shell with a set of mount points (elements with
//! an `id`). Content is replaced wholesale per mount, the same way an
//! `innerHTML` assignment would, and the page is re-parsed with `scraper`
//! whenever a selector has to be matched.

use crate::{Error, Result};
use scraper::Html;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
    pub inner_html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipLink {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub title: String,
    /// Author stylesheet emitted into `<head>`
    pub stylesheet: String,
    skip_link: Option<SkipLink>,
    mounts: Vec<Mount>,
}

impl Page {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stylesheet: String::new(),
            skip_link: None,
            mounts: Vec::new(),
        }
    }

    /// Add an empty mount point with the given element id.
    pub fn with_mount(mut self, id: impl Into<String>) -> Self {
        self.mounts.push(Mount {
            id: id.into(),
            attributes: BTreeMap::new(),
            inner_html: String::new(),
        });
        self
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Resolve an id selector (`#name`) to its mount point.
    pub fn mount_mut(&mut self, selector: &str) -> Result<&mut Mount> {
        let id = selector.trim().strip_prefix('#').unwrap_or(selector.trim());
        self.mounts
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    pub fn set_inner_html(&mut self, selector: &str, html: impl Into<String>) -> Result<()> {
        self.mount_mut(selector)?.inner_html = html.into();
        Ok(())
    }

    pub fn set_attribute(&mut self, selector: &str, name: &str, value: &str) -> Result<()> {
        self.mount_mut(selector)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn skip_link(&self) -> Option<&SkipLink> {
        self.skip_link.as_ref()
    }

    /// Insert a skip link unless the page already has one.
    pub fn ensure_skip_link(&mut self, href: &str, text: &str) {
        if self.skip_link.is_none() {
            self.skip_link = Some(SkipLink {
                href: href.to_string(),
                text: text.to_string(),
            });
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
        out.push_str(&format!("<title>{}</title>", escape_text(&self.title)));
        if !self.stylesheet.is_empty() {
            out.push_str(&format!("<style>{}</style>", self.stylesheet));
        }
        out.push_str("</head><body>");
        if let Some(link) = &self.skip_link {
            out.push_str(&format!(
                "<a class=\"skip-link\" href=\"{}\" style=\"position:absolute;left:-999px;top:auto;width:1px;height:1px;overflow:hidden;z-index:100\">{}</a>",
                escape_attr(&link.href),
                escape_text(&link.text)
            ));
        }
        for m in &self.mounts {
            out.push_str(&format!("<div id=\"{}\"", escape_attr(&m.id)));
            for (k, v) in &m.attributes {
                out.push_str(&format!(" {}=\"{}\"", k, escape_attr(v)));
            }
            out.push('>');
            out.push_str(&m.inner_html);
            out.push_str("</div>");
        }
        out.push_str("</body></html>");
        out
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.to_html())
    }
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub(crate) fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
