//! Translation of the pending part of a [`MarkupTree`] into a standalone SVG document.
//!
//! Only a fixed subset of CSS is understood (see [`resolve_box`] and the paint properties
//! below); unknown properties are ignored. Wrappers become `<g>` groups carrying their
//! `opacity`/`filter`, so their effect applies to everything drawn inside them.

use std::fmt::Write as _;

use base64::Engine as _;

use crate::{
    foundation::{
        core::{Rect, Rgba8, Size},
        error::{SketchError, SketchResult},
    },
    markup::{
        style::{Length, StyleMap},
        tree::{MarkupTree, NodeId, NodeKind},
    },
};

const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_LINE_HEIGHT: f64 = 1.2;

/// Properties that are translated at compose time.
const KNOWN_PROPERTIES: &[&str] = &[
    "position",
    "left",
    "top",
    "right",
    "bottom",
    "width",
    "height",
    "background",
    "background-color",
    "color",
    "opacity",
    "filter",
    "mix-blend-mode",
    "border-radius",
    "font-size",
    "font-weight",
    "font-family",
    "font-style",
    "text-align",
    "line-height",
];

/// An SVG document holding every markup node that has not been composed yet.
#[derive(Clone, Debug)]
pub struct PendingSvg {
    pub source: String,
    pub painted_nodes: usize,
}

/// Build an SVG of the pending markup, or `None` when nothing is pending.
pub fn pending_to_svg(tree: &MarkupTree, size: Size) -> SketchResult<Option<PendingSvg>> {
    let root = tree.root();
    if !tree.has_pending(root) {
        return Ok(None);
    }

    let mut out = String::new();
    let _ = write!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = size.width,
        h = size.height
    );
    let mut painted_nodes = 0usize;
    emit_children(tree, root, size, &mut out, &mut painted_nodes)?;
    out.push_str("</svg>");

    Ok(Some(PendingSvg {
        source: out,
        painted_nodes,
    }))
}

enum Visit {
    Enter(NodeId),
    Close,
}

/// Emit the pending subtrees below `parent`. Walks with an explicit stack so deep wrapper
/// chains do not grow the call stack.
fn emit_children(
    tree: &MarkupTree,
    parent: NodeId,
    size: Size,
    out: &mut String,
    painted: &mut usize,
) -> SketchResult<()> {
    let mut stack: Vec<Visit> = tree
        .children(parent)?
        .iter()
        .rev()
        .map(|c| Visit::Enter(*c))
        .collect();

    while let Some(visit) = stack.pop() {
        let id = match visit {
            Visit::Close => {
                out.push_str("</g>");
                continue;
            }
            Visit::Enter(id) => id,
        };
        if !tree.has_pending(id) {
            continue;
        }
        let node = tree.node(id)?;
        log_unknown_properties(&node.key, &node.style);

        out.push_str("<g");
        out.push_str(&group_attributes(&node.style)?);
        out.push('>');

        let paint_self = !node.is_composed();
        if paint_self {
            *painted += 1;
        }

        match &node.kind {
            NodeKind::Root => {}
            NodeKind::Wrap => {
                if paint_self {
                    emit_background(&node.style, size.rect(), out)?;
                }
                stack.push(Visit::Close);
                stack.extend(node.children().iter().rev().map(|c| Visit::Enter(*c)));
                continue;
            }
            NodeKind::Text(text) => {
                if paint_self {
                    let rect = resolve_box(&node.style, size)?;
                    emit_background(&node.style, rect, out)?;
                    emit_text(&node.style, rect, text, out)?;
                }
            }
            NodeKind::Image { data, .. } => {
                if paint_self {
                    let rect = resolve_box(&node.style, size)?;
                    emit_background(&node.style, rect, out)?;
                    emit_image(rect, data, out);
                }
            }
        }
        out.push_str("</g>");
    }
    Ok(())
}

fn log_unknown_properties(key: &str, style: &StyleMap) {
    for (prop, _) in style.iter() {
        if !KNOWN_PROPERTIES.contains(&prop) {
            tracing::debug!(node = key, property = prop, "ignoring unsupported style property");
        }
    }
}

fn group_attributes(style: &StyleMap) -> SketchResult<String> {
    let mut attrs = String::new();
    if let Some(op) = style.get("opacity") {
        let _ = write!(attrs, r#" opacity="{}""#, parse_opacity(op)?);
    }
    let mut css = String::new();
    if let Some(filter) = style.get("filter") {
        let _ = write!(css, "filter:{filter};");
    }
    if let Some(blend) = style.get("mix-blend-mode") {
        let _ = write!(css, "mix-blend-mode:{blend};");
    }
    if !css.is_empty() {
        let _ = write!(attrs, r#" style="{}""#, escape_xml(&css));
    }
    Ok(attrs)
}

/// `opacity` as a number (`0.5`) or a percentage (`50%`), clamped to `0..=1`.
pub fn parse_opacity(value: &str) -> SketchResult<f64> {
    let v = value.trim();
    let parsed = match v.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().map(|p| p / 100.0),
        None => v.parse::<f64>(),
    };
    match parsed {
        Ok(o) if o.is_finite() => Ok(o.clamp(0.0, 1.0)),
        _ => Err(SketchError::validation(format!("invalid opacity '{value}'"))),
    }
}

/// Reject paint values that would only fail once the markup is composed.
pub fn check_paint(style: &StyleMap) -> SketchResult<()> {
    if let Some(op) = style.get("opacity") {
        parse_opacity(op)?;
    }
    Ok(())
}

fn emit_background(style: &StyleMap, rect: Rect, out: &mut String) -> SketchResult<()> {
    let Some(bg) = style
        .get("background-color")
        .or_else(|| style.get("background"))
    else {
        return Ok(());
    };
    let color = Rgba8::parse_css(bg)?;
    if color.a == 0 || rect.width() <= 0.0 || rect.height() <= 0.0 {
        return Ok(());
    }
    let (fill, fill_opacity) = color.to_svg_paint();
    let radius = match style.get("border-radius") {
        Some(r) => Length::parse(r)?.resolve(rect.width().min(rect.height())),
        None => 0.0,
    };
    let _ = write!(
        out,
        r#"<rect x="{}" y="{}" width="{}" height="{}" rx="{radius}" ry="{radius}" fill="{fill}" fill-opacity="{fill_opacity}"/>"#,
        rect.x0,
        rect.y0,
        rect.width(),
        rect.height(),
    );
    Ok(())
}

fn emit_text(style: &StyleMap, rect: Rect, text: &str, out: &mut String) -> SketchResult<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let font_size = match style.get("font-size") {
        Some(v) => Length::parse(v)?.resolve(DEFAULT_FONT_SIZE),
        None => DEFAULT_FONT_SIZE,
    };
    let line_height = match style.get("line-height") {
        Some(v) if v.trim().ends_with("px") || v.trim().ends_with('%') => {
            Length::parse(v)?.resolve(font_size)
        }
        Some(v) => {
            let factor: f64 = v.trim().parse().map_err(|_| {
                SketchError::validation(format!("invalid line-height '{v}'"))
            })?;
            factor * font_size
        }
        None => font_size * DEFAULT_LINE_HEIGHT,
    };
    let color = match style.get("color") {
        Some(c) => Rgba8::parse_css(c)?,
        None => Rgba8::BLACK,
    };
    let (fill, fill_opacity) = color.to_svg_paint();
    let (anchor, x) = match style.get("text-align").unwrap_or("left") {
        "center" => ("middle", (rect.x0 + rect.x1) / 2.0),
        "right" | "end" => ("end", rect.x1),
        _ => ("start", rect.x0),
    };
    let family = style.get("font-family").unwrap_or("sans-serif");
    let weight = style.get("font-weight").unwrap_or("normal");
    let font_style = style.get("font-style").unwrap_or("normal");

    let _ = write!(
        out,
        r#"<text font-size="{font_size}" font-family="{}" font-weight="{}" font-style="{}" fill="{fill}" fill-opacity="{fill_opacity}" text-anchor="{anchor}" dominant-baseline="central">"#,
        escape_xml(family),
        escape_xml(weight),
        escape_xml(font_style),
    );
    for (i, line) in text.lines().enumerate() {
        let y = rect.y0 + line_height * (i as f64 + 0.5);
        let _ = write!(
            out,
            r#"<tspan x="{x}" y="{y}">{}</tspan>"#,
            escape_xml(line)
        );
    }
    out.push_str("</text>");
    Ok(())
}

fn emit_image(rect: Rect, data: &[u8], out: &mut String) {
    let mime = image::guess_format(data)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    let _ = write!(
        out,
        r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="none" href="data:{mime};base64,{encoded}"/>"#,
        rect.x0,
        rect.y0,
        rect.width(),
        rect.height(),
    );
}

/// Resolve the absolutely positioned box of a node inside a container of `size`.
///
/// Missing edges default to the container edges: with neither `left` nor `right` the box
/// starts at 0, with neither `width` nor the opposite edge it stretches to the far edge.
pub fn resolve_box(style: &StyleMap, size: Size) -> SketchResult<Rect> {
    let cw = f64::from(size.width);
    let ch = f64::from(size.height);
    let len = |key: &str, basis: f64| -> SketchResult<Option<f64>> {
        match style.get(key) {
            Some("auto") | None => Ok(None),
            Some(v) => Ok(Some(Length::parse(v)?.resolve(basis))),
        }
    };

    let (x0, x1) = span(len("left", cw)?, len("width", cw)?, len("right", cw)?, cw);
    let (y0, y1) = span(len("top", ch)?, len("height", ch)?, len("bottom", ch)?, ch);
    Ok(Rect::new(x0, y0, x1.max(x0), y1.max(y0)))
}

fn span(start: Option<f64>, extent: Option<f64>, end: Option<f64>, container: f64) -> (f64, f64) {
    match (start, extent, end) {
        (Some(s), Some(e), _) => (s, s + e),
        (Some(s), None, Some(end)) => (s, container - end),
        (Some(s), None, None) => (s, container),
        (None, Some(e), Some(end)) => (container - end - e, container - end),
        (None, Some(e), None) => (0.0, e),
        (None, None, Some(end)) => (0.0, container - end),
        (None, None, None) => (0.0, container),
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
