/// Display list built from a layout tree

use crate::rendering::layout::{ElementType, LayoutTree, CHAR_WIDTH, LINE_HEIGHT};

pub type Rgba = (u8, u8, u8, u8);

const TEXT: Rgba = (0x22, 0x22, 0x22, 0xff);
const HEADING: Rgba = (0x11, 0x11, 0x11, 0xff);
const CODE_BG: Rgba = (0xf2, 0xf2, 0xf2, 0xff);
const RULE: Rgba = (0xcc, 0xcc, 0xcc, 0xff);
const IMAGE_FILL: Rgba = (0xe4, 0xe4, 0xe4, 0xff);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    /// A run of glyphs, drawn greeked as a bar of the run's advance width
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: f32,
        rgba: Rgba,
    },
}

/// Parse a CSS color: `#rgb`, `#rrggbb`, `#rrggbbaa`, or a few keywords.
pub fn parse_color(s: &str) -> Option<Rgba> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "white" => return Some((255, 255, 255, 255)),
        "black" => return Some((0, 0, 0, 255)),
        "transparent" => return Some((0, 0, 0, 0)),
        _ => {}
    }
    let hex = s.strip_prefix('#')?;
    let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some((digit(0)? * 17, digit(1)? * 17, digit(2)? * 17, 255)),
        6 => Some((byte(0)?, byte(2)?, byte(4)?, 255)),
        8 => Some((byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

pub fn build_display_list(tree: &LayoutTree) -> Vec<PaintCommand> {
    let mut cmds = Vec::new();
    for node in &tree.nodes {
        let r = &node.lb.rect;
        let pad = node.lb.box_model.padding as i32;
        match &node.elem_type {
            ElementType::Rule => cmds.push(PaintCommand::SolidRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height.max(1),
                rgba: RULE,
            }),
            ElementType::Image { .. } => cmds.push(PaintCommand::SolidRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                rgba: IMAGE_FILL,
            }),
            kind => {
                if *kind == ElementType::Preformatted {
                    cmds.push(PaintCommand::SolidRect {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                        rgba: CODE_BG,
                    });
                }
                let rgba = if matches!(kind, ElementType::Heading(_)) { HEADING } else { TEXT };
                let line_h = ((LINE_HEIGHT as f32) * node.scale).ceil() as i32;
                for (i, line) in node.lines.iter().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    cmds.push(PaintCommand::Text {
                        x: r.x + pad,
                        y: r.y + pad + i as i32 * line_h,
                        text: line.clone(),
                        scale: node.scale,
                        rgba,
                    });
                }
            }
        }
    }
    cmds
}

/// Greeked extents of a text run: one bar per word, `(x offset, width)`.
pub fn word_spans(text: &str, scale: f32) -> Vec<(u32, u32)> {
    let adv = (CHAR_WIDTH as f32) * scale;
    let mut spans = Vec::new();
    let mut col = 0usize;
    for (i, ch) in text.char_indices() {
        let starts_word = !ch.is_whitespace()
            && (i == 0 || text[..i].chars().next_back().is_some_and(char::is_whitespace));
        if starts_word {
            let len = text[i..].chars().take_while(|c| !c.is_whitespace()).count();
            spans.push(((col as f32 * adv) as u32, (len as f32 * adv) as u32));
        }
        col += 1;
    }
    spans
}
