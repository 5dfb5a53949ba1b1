use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt::Write;

use crate::layout::Swatch;
use crate::render::{EdgeKey, EdgeVisual, NodeVisual, Scene};
use crate::viewport::ViewportTransform;

/// A retained scene that serializes to a standalone SVG document.
///
/// Elements keep their insertion order, so an update never changes z-order.
#[derive(Debug, Default)]
pub struct SvgScene {
    nodes: Vec<(String, NodeVisual)>,
    node_index: HashMap<String, usize>,
    edges: Vec<(EdgeKey, EdgeVisual)>,
    edge_index: HashMap<EdgeKey, usize>,
}

impl SvgScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&NodeVisual> {
        self.node_index.get(id).map(|&i| &self.nodes[i].1)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&EdgeVisual> {
        self.edge_index.get(key).map(|&i| &self.edges[i].1)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn to_svg(&self, viewport: &ViewportTransform, width: f64, height: f64) -> String {
        let mut out = String::with_capacity(1024 + 512 * self.nodes.len());
        let _ = writeln!(
            out,
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}" style="background:#010101">"##,
            fmt_num(width),
            fmt_num(height),
            fmt_num(width),
            fmt_num(height)
        );
        out.push_str(GLOW_FILTER);
        let _ = writeln!(
            out,
            r#"<g class="main-container" transform="{}">"#,
            viewport.to_svg_transform()
        );

        for (key, edge) in &self.edges {
            let _ = writeln!(
                out,
                r#"<line class="link" data-source="{}" data-target="{}" x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-opacity="{}" stroke-width="{}"/>"#,
                escape(&key.source),
                escape(&key.target),
                fmt_num(edge.from.x),
                fmt_num(edge.from.y),
                fmt_num(edge.to.x),
                fmt_num(edge.to.y),
                edge.swatch.hex(),
                fmt_num(edge.opacity),
                fmt_num(edge.width)
            );
        }

        for (id, node) in &self.nodes {
            let hex = hex_path(node.radius);
            let _ = writeln!(
                out,
                r#"<g class="node" data-id="{}" transform="translate({},{})">"#,
                escape(id),
                fmt_num(node.position.x),
                fmt_num(node.position.y)
            );
            let _ = writeln!(out, r##"<path class="hex-base" d="{}" fill="#000" fill-opacity="0.95"/>"##, hex);
            let _ = writeln!(
                out,
                r#"<path class="hex-neon" d="{}" fill="none" stroke="{}" stroke-width="{}" filter="url(#neonGlow)" color="{}"/>"#,
                hex,
                node.swatch.hex(),
                fmt_num(node.stroke_width),
                node.swatch.hex()
            );
            let _ = writeln!(
                out,
                r##"<text class="node-label" dy="0.35em" text-anchor="middle" fill="#fff" font-weight="{}" font-size="{}px" letter-spacing="0.12em">{}</text>"##,
                node.font_weight,
                fmt_num(node.font_size),
                escape(&node.label.to_uppercase())
            );
            out.push_str("</g>\n");
        }

        out.push_str("</g>\n");
        write_legend(&mut out, height);
        out.push_str("</svg>\n");
        out
    }
}

impl Scene for SvgScene {
    fn add_node(&mut self, id: &str, visual: &NodeVisual) {
        if let Some(&i) = self.node_index.get(id) {
            self.nodes[i].1 = visual.clone();
            return;
        }
        self.node_index.insert(id.to_string(), self.nodes.len());
        self.nodes.push((id.to_string(), visual.clone()));
    }

    fn update_node(&mut self, id: &str, visual: &NodeVisual) {
        if let Some(&i) = self.node_index.get(id) {
            self.nodes[i].1 = visual.clone();
        }
    }

    fn remove_node(&mut self, id: &str) {
        if let Some(i) = self.node_index.remove(id) {
            self.nodes.remove(i);
            for (_, slot) in self.node_index.iter_mut() {
                if *slot > i {
                    *slot -= 1;
                }
            }
        }
    }

    fn add_edge(&mut self, key: &EdgeKey, visual: &EdgeVisual) {
        if let Some(&i) = self.edge_index.get(key) {
            self.edges[i].1 = visual.clone();
            return;
        }
        self.edge_index.insert(key.clone(), self.edges.len());
        self.edges.push((key.clone(), visual.clone()));
    }

    fn update_edge(&mut self, key: &EdgeKey, visual: &EdgeVisual) {
        if let Some(&i) = self.edge_index.get(key) {
            self.edges[i].1 = visual.clone();
        }
    }

    fn remove_edge(&mut self, key: &EdgeKey) {
        if let Some(i) = self.edge_index.remove(key) {
            self.edges.remove(i);
            for (_, slot) in self.edge_index.iter_mut() {
                if *slot > i {
                    *slot -= 1;
                }
            }
        }
    }
}

const GLOW_FILTER: &str = r#"<defs><filter id="neonGlow" x="-100%" y="-100%" width="300%" height="300%"><feGaussianBlur stdDeviation="4" result="blur"/><feFlood flood-color="currentColor" flood-opacity="0.8"/><feComposite in2="blur" operator="in"/><feMerge><feMergeNode in="blur"/><feMergeNode in="SourceGraphic"/></feMerge></filter></defs>
"#;

/// Point-up hexagon centred on the origin.
pub fn hex_path(radius: f64) -> String {
    let mut d = String::with_capacity(96);
    for i in 0..6 {
        let angle = PI / 3.0 * i as f64 - PI / 2.0;
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(
            d,
            "{}{},{}",
            cmd,
            fmt_num(radius * angle.cos()),
            fmt_num(radius * angle.sin())
        );
    }
    d.push('Z');
    d
}

fn write_legend(out: &mut String, height: f64) {
    let top = (height - 110.0).max(0.0);
    let _ = writeln!(out, r#"<g class="legend" transform="translate(32,{})">"#, fmt_num(top));
    let _ = writeln!(
        out,
        r##"<circle cx="5" cy="5" r="5" fill="{}"/><text x="18" y="9" fill="#ffffff" fill-opacity="0.6" font-size="9px">PROJECT HUB</text>"##,
        Swatch::Root.hex()
    );
    for (i, (swatch, label)) in Swatch::LEGEND.iter().enumerate() {
        let y = 26.0 + i as f64 * 16.0;
        let _ = writeln!(
            out,
            r##"<circle cx="5" cy="{}" r="3" fill="{}"/><text x="18" y="{}" fill="#ffffff" fill-opacity="0.3" font-size="8px">{}</text>"##,
            fmt_num(y),
            swatch.hex(),
            fmt_num(y + 3.0),
            label.to_uppercase()
        );
    }
    out.push_str("</g>\n");
}

/// Trim float noise: integers print without a fraction, others to 2 places.
pub(crate) fn fmt_num(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let s = format!("{:.2}", rounded);
        s.trim_end_matches('0').to_string()
    }
}

fn escape(s: &str) -> String {
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
