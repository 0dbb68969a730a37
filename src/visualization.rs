//! Rendering of fractional relaxation snapshots.
//!
//! Generates SVG diagrams of one intermediate relaxation state: every edge
//! the relaxation selects above a small epsilon is drawn in its agent's
//! color, solid when the selection is integral and dotted otherwise, with
//! the selection value annotated at the edge midpoint. The artificial
//! sequencing edges between one agent's end and the next agent's start are
//! zeroed first; they encode the relaxation's agent chaining, not travel.
//!
//! The selected edge set, styles, and annotated values are deterministic
//! for identical input; pixel output is delegated to `resvg` when that
//! feature is enabled.

use std::fs::File;
use std::io::Write;
use std::path::Path;

#[cfg(feature = "resvg")]
use resvg::render;
#[cfg(feature = "resvg")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "resvg")]
use resvg::usvg;
#[cfg(feature = "resvg")]
use resvg::usvg::TreeParsing;
#[cfg(feature = "resvg")]
use resvg::FitTo;

use crate::error::Error;
use crate::instance::{AgentSet, Instance, OptimizationMode};
use crate::snapshot::FractionalSnapshot;

/// Fixed agent palette, cycled by agent index.
pub const AGENT_PALETTE: [&str; 7] =
    ["#0000ff", "#008000", "#ff0000", "#00bfbf", "#bf00bf", "#bfbf00", "#000000"];

/// One edge the renderer decided to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedEdge {
    pub agent: usize,
    pub from: usize,
    pub to: usize,
    pub value: f64,
    /// Selection value within epsilon of 1: drawn solid instead of dotted.
    pub integral: bool,
}

/// SVG renderer for relaxation snapshots.
pub struct RelaxationRenderer {
    /// Canvas width
    pub width: f64,
    /// Canvas height
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Node radius
    pub node_radius: f64,
    /// Threshold below which an edge is not drawn, and above `1 - epsilon`
    /// of which it counts as integral.
    pub epsilon: f64,
}

impl Default for RelaxationRenderer {
    fn default() -> Self {
        RelaxationRenderer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 4.0,
            epsilon: 1e-10,
        }
    }
}

impl RelaxationRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the artificial inter-agent sequencing edges: for each chain
    /// position i, the edge from agent i's end to agent (i+1 mod A)'s start,
    /// across all agent layers.
    pub fn suppress_artificial_edges(snapshot: &mut FractionalSnapshot, agents: &AgentSet) {
        let a = agents.len();
        for i in 0..a {
            let end = agents.end_positions()[i];
            let start = agents.start_positions()[(i + 1) % a];
            snapshot.zero_edge(end, start);
        }
    }

    /// Every (agent, from, to) with selection value above epsilon, in
    /// agent-major order.
    pub fn select_edges(&self, snapshot: &FractionalSnapshot) -> Vec<SelectedEdge> {
        let mut edges = Vec::new();
        for a in 0..snapshot.agents() {
            for s in 0..snapshot.nodes() {
                for t in 0..snapshot.nodes() {
                    let value = snapshot.value(a, s, t);
                    if value > self.epsilon {
                        edges.push(SelectedEdge {
                            agent: a,
                            from: s,
                            to: t,
                            value,
                            integral: value > 1.0 - self.epsilon,
                        });
                    }
                }
            }
        }
        edges
    }

    /// Translate the minimum coordinate to 0 on both axes, then uniformly
    /// scale the larger extent to 100, preserving aspect ratio.
    pub fn normalize_coords(coords: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let min_x = coords.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let min_y = coords.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_x = coords.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let max_y = coords.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

        let extent = (max_x - min_x).max(max_y - min_y);
        let scale = if extent > 0.0 { 100.0 / extent } else { 1.0 };

        coords
            .iter()
            .map(|&(x, y)| ((x - min_x) * scale, (y - min_y) * scale))
            .collect()
    }

    /// Render one snapshot as an SVG document. The instance must carry node
    /// coordinates.
    pub fn render_svg(
        &self,
        snapshot: &FractionalSnapshot,
        instance: &Instance,
        agents: &AgentSet,
        mode: OptimizationMode,
    ) -> Result<String, Error> {
        let coords = instance
            .coords()
            .ok_or_else(|| Error::MissingCoordinates(instance.name().to_string()))?;

        let mut cleaned = snapshot.clone();
        Self::suppress_artificial_edges(&mut cleaned, agents);
        let edges = self.select_edges(&cleaned);
        let objective = cleaned.objective(instance, mode);
        let points = Self::normalize_coords(coords);

        // Map normalized [0, 100] space onto the canvas, y pointing up.
        let span_x = self.width - 2.0 * self.margin;
        let span_y = self.height - 2.0 * self.margin;
        let place = |x: f64, y: f64| -> (f64, f64) {
            (
                self.margin + x / 100.0 * span_x,
                self.height - self.margin - y / 100.0 * span_y,
            )
        };

        let mut svg = String::new();
        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .node {{ fill: #555555; }}
    .label {{ font-family: Arial; font-size: 9px; fill: #2c3e50; }}
    .value {{ font-family: Arial; font-size: 10px; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ffffff"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        svg.push_str(&format!(
            r#"<text x="{:.2}" y="25" class="title">{} | objective: {:.2}</text>
"#,
            self.margin,
            instance.name(),
            objective
        ));

        for edge in &edges {
            let (x1, y1) = place(points[edge.from].0, points[edge.from].1);
            let (x2, y2) = place(points[edge.to].0, points[edge.to].1);
            let color = AGENT_PALETTE[edge.agent % AGENT_PALETTE.len()];
            let dash = if edge.integral { "" } else { r#" stroke-dasharray="2,4""# };
            svg.push_str(&format!(
                r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="1.5"{}/>
"#,
                x1, y1, x2, y2, color, dash
            ));
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{:.2}" class="value" fill="{}">{:.2}</text>
"#,
                (x1 + x2) / 2.0,
                (y1 + y2) / 2.0,
                color,
                edge.value
            ));
        }

        for (id, &(x, y)) in points.iter().enumerate() {
            let (cx, cy) = place(x, y);
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="{}" class="node"/>
<text x="{:.2}" y="{:.2}" class="label">{}</text>
"#,
                cx,
                cy,
                self.node_radius,
                cx + self.node_radius + 1.0,
                cy - self.node_radius - 1.0,
                id
            ));
        }

        // Start and end anchors in their agent's color: circle for the
        // start, triangle for the end.
        for a in 0..agents.len() {
            let color = AGENT_PALETTE[a % AGENT_PALETTE.len()];
            let (sx, sy) = {
                let p = points[agents.start_positions()[a]];
                place(p.0, p.1)
            };
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="{}" fill="none" stroke="{}" stroke-width="2"/>
"#,
                sx,
                sy,
                self.node_radius + 3.0,
                color
            ));
            let (ex, ey) = {
                let p = points[agents.end_positions()[a]];
                place(p.0, p.1)
            };
            let r = self.node_radius + 3.0;
            svg.push_str(&format!(
                r#"<path d="M {:.2} {:.2} L {:.2} {:.2} L {:.2} {:.2} Z" fill="none" stroke="{}" stroke-width="2"/>
"#,
                ex - r,
                ey - r,
                ex - r,
                ey + r,
                ex + r,
                ey,
                color
            ));
        }

        svg.push_str("</svg>");
        Ok(svg)
    }

    /// Save an SVG document to a file.
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> Result<(), Error> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Rasterize an SVG document to a PNG file.
    #[cfg(feature = "resvg")]
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> Result<(), Error> {
        let opt = usvg::Options::default();
        let rtree = usvg::Tree::from_str(svg, &opt)
            .map_err(|e| Error::Render(format!("usvg parse error: {}", e)))?;
        let mut pixmap = Pixmap::new(self.width.max(1.0) as u32, self.height.max(1.0) as u32)
            .ok_or_else(|| Error::Render("failed to create pixmap".to_string()))?;
        render(&rtree, FitTo::Original, Transform::default(), pixmap.as_mut())
            .ok_or_else(|| Error::Render("rasterization failed".to_string()))?;
        pixmap
            .save_png(path.as_ref())
            .map_err(|e| Error::Render(format!("save_png failed: {}", e)))?;
        Ok(())
    }
}
