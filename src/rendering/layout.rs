/// Block layout of a captured subtree at its natural size.
///
/// Width is the containing viewport width; height grows with content and
/// is never clipped to the viewport, so overflowing content is captured in
/// full.

use scraper::{ElementRef, Node};

/// Average advance of one character in CSS px
pub const CHAR_WIDTH: u32 = 8;
/// Line height of body text in CSS px
pub const LINE_HEIGHT: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxModel {
    pub margin: u32,
    pub border: u32,
    pub padding: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    pub box_model: BoxModel,
}

impl LayoutBox {
    pub fn content_width(&self) -> u32 {
        let total = self.box_model.border + self.box_model.padding;
        self.rect.width.saturating_sub(total * 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Heading(u8),
    Paragraph,
    Preformatted,
    Rule,
    Image { src: String },
}

#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub lb: LayoutBox,
    /// Wrapped text, one entry per line
    pub lines: Vec<String>,
    pub elem_type: ElementType,
    /// Text scale relative to body text
    pub scale: f32,
}

/// Laid-out subtree plus its natural (unclipped) size in CSS px
#[derive(Debug, Clone, Default)]
pub struct LayoutTree {
    pub nodes: Vec<LayoutNode>,
    pub width: u32,
    pub height: u32,
}

fn heading_scale(level: u8) -> f32 {
    match level {
        1 => 2.0,
        2 => 1.5,
        3 => 1.25,
        _ => 1.0,
    }
}

fn wrap(text: &str, chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        if cur.len() + word.len() + 1 > chars_per_line && !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

struct Builder {
    width: u32,
    y: u32,
    nodes: Vec<LayoutNode>,
    inline: String,
}

impl Builder {
    fn push_text_block(&mut self, text: &str, elem_type: ElementType, scale: f32, preserve: bool) {
        let padding = 6u32;
        let margin = 8u32;
        let box_width = self.width.saturating_sub(margin * 2);
        let content_w = box_width.saturating_sub(padding * 2);
        let char_w = ((CHAR_WIDTH as f32) * scale).max(1.0) as u32;
        let chars_per_line = (content_w / char_w).max(1) as usize;

        let lines = if preserve {
            text.lines().map(|l| l.trim_end().to_string()).collect::<Vec<_>>()
        } else {
            wrap(text, chars_per_line)
        };
        if lines.iter().all(|l| l.trim().is_empty()) {
            return;
        }

        let line_h = ((LINE_HEIGHT as f32) * scale).ceil() as u32;
        let box_h = lines.len() as u32 * line_h + padding * 2;
        self.y += margin;
        self.nodes.push(LayoutNode {
            lb: LayoutBox {
                rect: Rect {
                    x: margin as i32,
                    y: self.y as i32,
                    width: box_width,
                    height: box_h,
                },
                box_model: BoxModel { margin, border: 0, padding },
            },
            lines,
            elem_type,
            scale,
        });
        self.y += box_h;
    }

    fn push_box(&mut self, elem_type: ElementType, height: u32, margin: u32) {
        self.y += margin;
        self.nodes.push(LayoutNode {
            lb: LayoutBox {
                rect: Rect {
                    x: 8,
                    y: self.y as i32,
                    width: self.width.saturating_sub(16),
                    height,
                },
                box_model: BoxModel { margin, border: 0, padding: 0 },
            },
            lines: Vec::new(),
            elem_type,
            scale: 1.0,
        });
        self.y += height;
    }

    fn flush_inline(&mut self) {
        if self.inline.trim().is_empty() {
            self.inline.clear();
            return;
        }
        let text = std::mem::take(&mut self.inline);
        self.push_text_block(&text, ElementType::Paragraph, 1.0, false);
    }

    fn visit_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => self.inline.push_str(t),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.visit(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_inline();
                let level = name[1..].parse::<u8>().unwrap_or(6);
                let text = el.text().collect::<String>();
                self.push_text_block(&text, ElementType::Heading(level), heading_scale(level), false);
            }
            "p" | "li" | "dt" | "dd" | "th" | "td" | "figcaption" => {
                self.flush_inline();
                let text = el.text().collect::<String>();
                self.push_text_block(&text, ElementType::Paragraph, 1.0, false);
            }
            "pre" => {
                self.flush_inline();
                let text = el.text().collect::<String>();
                self.push_text_block(&text, ElementType::Preformatted, 1.0, true);
            }
            "hr" => {
                self.flush_inline();
                self.push_box(ElementType::Rule, 1, 8);
            }
            "img" => {
                self.flush_inline();
                let height = el
                    .value()
                    .attr("height")
                    .and_then(|h| h.trim_end_matches("px").parse::<u32>().ok())
                    .unwrap_or(120);
                let src = el.value().attr("src").unwrap_or_default().to_string();
                self.push_box(ElementType::Image { src }, height, 8);
            }
            "br" => self.inline.push('\n'),
            "script" | "style" | "template" => {}
            "a" | "span" | "strong" | "em" | "b" | "i" | "code" | "small" | "sup" | "sub" | "abbr"
            | "del" | "s" | "u" | "mark" | "label" | "time" => {
                self.inline.push_str(&el.text().collect::<String>());
            }
            _ => {
                self.flush_inline();
                self.visit_children(el);
                self.flush_inline();
            }
        }
    }
}

/// Lay out `root` and everything below it at the given containing width.
pub fn layout_subtree(root: ElementRef<'_>, width: u32) -> LayoutTree {
    let mut b = Builder {
        width,
        y: 0,
        nodes: Vec::new(),
        inline: String::new(),
    };
    b.visit(root);
    b.flush_inline();
    let height = if b.nodes.is_empty() { 0 } else { b.y + 8 };
    LayoutTree {
        nodes: b.nodes,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn root<'a>(doc: &'a Html, sel: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(sel).unwrap()).next().unwrap()
    }

    #[test]
    fn layout_places_heading_and_paragraphs() {
        let doc = Html::parse_document(
            "<html><body><div id=cv><h1>Heading</h1><p>Hello world</p><hr><p>More text</p></div></body></html>",
        );
        let tree = layout_subtree(root(&doc, "#cv"), 200);
        let kinds: Vec<_> = tree.nodes.iter().map(|n| n.elem_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ElementType::Heading(1),
                ElementType::Paragraph,
                ElementType::Rule,
                ElementType::Paragraph
            ]
        );
        assert_eq!(tree.width, 200);
        assert!(tree.nodes[1].lb.rect.y > tree.nodes[0].lb.rect.y);
    }

    #[test]
    fn height_is_not_clipped_to_viewport() {
        let paras = "<p>line of text</p>".repeat(200);
        let doc = Html::parse_document(&format!("<div id=cv>{}</div>", paras));
        let tree = layout_subtree(root(&doc, "#cv"), 300);
        assert_eq!(tree.nodes.len(), 200);
        assert!(tree.height > 200 * LINE_HEIGHT);
    }

    #[test]
    fn long_paragraph_wraps() {
        let text = "word ".repeat(100);
        let doc = Html::parse_document(&format!("<div id=cv><p>{}</p></div>", text));
        let tree = layout_subtree(root(&doc, "#cv"), 200);
        assert!(tree.nodes[0].lines.len() > 1);
        let max_chars = (tree.nodes[0].lb.content_width() / CHAR_WIDTH) as usize;
        assert!(tree.nodes[0].lines.iter().all(|l| l.len() <= max_chars));
    }

    #[test]
    fn bare_text_becomes_paragraph() {
        let doc = Html::parse_document("<div id=cv>just <strong>some</strong> text</div>");
        let tree = layout_subtree(root(&doc, "#cv"), 400);
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].lines, vec!["just some text".to_string()]);
    }

    #[test]
    fn empty_subtree_has_zero_height() {
        let doc = Html::parse_document("<div id=cv></div>");
        let tree = layout_subtree(root(&doc, "#cv"), 400);
        assert!(tree.nodes.is_empty());
        assert_eq!(tree.height, 0);
    }
}
