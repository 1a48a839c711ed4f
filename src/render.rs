use anyhow::Result;
#[cfg(feature = "server")]
use anyhow::{anyhow, bail};
use std::fmt::Write;
#[cfg(feature = "server")]
use tiny_skia::{Pixmap, Transform};

use crate::canvas::Frame;
use crate::edges::RoutedConnection;
use crate::model::{GroupNode, ServiceNode, Topology};
use crate::selection::EditorState;
use crate::viewport::{ScrollbarMetrics, Viewport};
use crate::{NODE_HEIGHT, NODE_WIDTH};

const STROKE_COLOR: &str = "#1e293b";
const TEXT_COLOR: &str = "#0f172a";
const SELECTED_COLOR: &str = "#f59e0b";

/// Paint target for one frame. Implemented by the SVG backend; other
/// backends (e.g. a 3D scene) draw the same geometry their own way.
pub trait Renderer {
    fn draw_group(&mut self, group: &GroupNode, selected: bool) -> Result<()>;

    fn draw_edge(&mut self, edge: &RoutedConnection, selected: bool) -> Result<()>;

    fn draw_node(&mut self, node: &ServiceNode, selected: bool, pending_source: bool) -> Result<()>;

    fn draw_scrollbars(&mut self, viewport: &Viewport, scrollbars: &ScrollbarMetrics) -> Result<()>;
}

/// Draws groups, then edges, then nodes, then the scrollbars on top.
pub fn paint<R>(renderer: &mut R, topology: &Topology, frame: &Frame, state: &EditorState) -> Result<()>
where
    R: Renderer + ?Sized,
{
    let selected_element = state.selection.element_id();
    let selected_connection = state.selection.connection_id();

    for group in &topology.groups {
        renderer.draw_group(group, selected_element == Some(group.id.as_str()))?;
    }
    for edge in &frame.connections {
        renderer.draw_edge(edge, selected_connection == Some(edge.id.as_str()))?;
    }
    for node in &topology.nodes {
        renderer.draw_node(
            node,
            selected_element == Some(node.id.as_str()),
            state.pending_source.as_deref() == Some(node.id.as_str()),
        )?;
    }
    renderer.draw_scrollbars(&frame.viewport, &frame.scrollbars)
}

fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Accumulates the body of the scene; the document wrapper is added by `finish`.
pub struct SvgRenderer {
    scene: String,
    overlay: String,
    scrollbar_thickness: f32,
}

impl SvgRenderer {
    pub fn new(scrollbar_thickness: f32) -> Self {
        Self {
            scene: String::new(),
            overlay: String::new(),
            scrollbar_thickness,
        }
    }

    pub fn finish(self, viewport: &Viewport, background: &str) -> Result<String> {
        let mut svg = String::new();
        write!(
            svg,
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <marker id="arrow-end" markerWidth="8" markerHeight="8" refX="6" refY="4" orient="auto" markerUnits="strokeWidth">
      <path d="M1,1 L6,4 L1,7 z" fill="context-stroke" />
    </marker>
  </defs>
  <rect width="100%" height="100%" fill="{}" />
  <g class="scene" transform="translate({:.1} {:.1})">
"##,
            viewport.size.width,
            viewport.size.height,
            viewport.size.width,
            viewport.size.height,
            escape_xml(background),
            viewport.offset.x,
            viewport.offset.y,
        )?;
        svg.push_str(&self.scene);
        svg.push_str("  </g>\n");
        svg.push_str(&self.overlay);
        svg.push_str("</svg>\n");
        Ok(svg)
    }
}

impl Renderer for SvgRenderer {
    fn draw_group(&mut self, group: &GroupNode, selected: bool) -> Result<()> {
        let stroke = if selected { SELECTED_COLOR } else { group.color.as_str() };
        writeln!(
            self.scene,
            "    <g class=\"group status-{}\" data-id=\"{}\">",
            group.status.as_str(),
            escape_xml(&group.id)
        )?;
        writeln!(
            self.scene,
            "      <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"12\" ry=\"12\" fill=\"{}\" fill-opacity=\"0.08\" stroke=\"{}\" stroke-width=\"2\" stroke-dasharray=\"6 4\" />",
            group.position.x,
            group.position.y,
            group.size.width,
            group.size.height,
            escape_xml(&group.color),
            escape_xml(stroke)
        )?;
        writeln!(
            self.scene,
            "      <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"13\" font-weight=\"600\">{}</text>",
            group.position.x + 14.0,
            group.position.y + 22.0,
            escape_xml(&group.color),
            escape_xml(&group.name)
        )?;
        self.scene.push_str("    </g>\n");
        Ok(())
    }

    fn draw_edge(&mut self, edge: &RoutedConnection, selected: bool) -> Result<()> {
        let mut classes = format!("edge style-{}", edge.style.as_str());
        if let Some(status) = edge.status {
            write!(classes, " status-{}", status.as_str())?;
        }
        if selected {
            classes.push_str(" selected");
        }
        let stroke = if selected { SELECTED_COLOR } else { STROKE_COLOR };

        writeln!(
            self.scene,
            "    <path class=\"{}\" data-id=\"{}\" d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" marker-end=\"url(#arrow-end)\" />",
            classes,
            escape_xml(&edge.id),
            edge.path.to_svg_path(),
            stroke
        )?;

        if !edge.label.trim().is_empty() {
            writeln!(
                self.scene,
                "    <text class=\"edge-label\" x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"12\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                edge.path.label.x,
                edge.path.label.y,
                TEXT_COLOR,
                escape_xml(&edge.label)
            )?;
        }
        Ok(())
    }

    fn draw_node(&mut self, node: &ServiceNode, selected: bool, pending_source: bool) -> Result<()> {
        let stroke = if selected || pending_source { SELECTED_COLOR } else { STROKE_COLOR };
        let dash = if pending_source { " stroke-dasharray=\"4 3\"" } else { "" };
        writeln!(
            self.scene,
            "    <g class=\"node type-{} status-{}\" data-id=\"{}\">",
            node.service_type.as_str(),
            node.status.as_str(),
            escape_xml(&node.id)
        )?;
        writeln!(
            self.scene,
            "      <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"2\"{} />",
            node.position.x,
            node.position.y,
            NODE_WIDTH,
            NODE_HEIGHT,
            node.service_type.default_fill_color(),
            stroke,
            dash
        )?;
        writeln!(
            self.scene,
            "      <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"13\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
            node.position.x + NODE_WIDTH / 2.0,
            node.position.y + NODE_HEIGHT / 2.0,
            TEXT_COLOR,
            escape_xml(&node.name)
        )?;
        self.scene.push_str("    </g>\n");
        Ok(())
    }

    fn draw_scrollbars(&mut self, viewport: &Viewport, scrollbars: &ScrollbarMetrics) -> Result<()> {
        let thickness = self.scrollbar_thickness;
        writeln!(
            self.overlay,
            "  <rect class=\"scrollbar-thumb horizontal\" x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"{:.1}\" fill=\"#94a3b8\" fill-opacity=\"0.6\" />",
            scrollbars.horizontal.pos,
            viewport.size.height - thickness,
            scrollbars.horizontal.size,
            thickness,
            thickness / 2.0
        )?;
        writeln!(
            self.overlay,
            "  <rect class=\"scrollbar-thumb vertical\" x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"{:.1}\" fill=\"#94a3b8\" fill-opacity=\"0.6\" />",
            viewport.size.width - thickness,
            scrollbars.vertical.pos,
            thickness,
            scrollbars.vertical.size,
            thickness / 2.0
        )?;
        Ok(())
    }
}

pub fn render_svg(topology: &Topology, frame: &Frame, state: &EditorState, background: &str, scrollbar_thickness: f32) -> Result<String> {
    let mut renderer = SvgRenderer::new(scrollbar_thickness);
    paint(&mut renderer, topology, frame, state)?;
    renderer.finish(&frame.viewport, background)
}

#[cfg(feature = "server")]
pub fn render_png(
    topology: &Topology,
    frame: &Frame,
    state: &EditorState,
    background: &str,
    scrollbar_thickness: f32,
    scale: f32,
) -> Result<Vec<u8>> {
    if scale <= 0.0 {
        bail!("scale must be greater than zero when rendering PNG output");
    }

    let svg = render_svg(topology, frame, state, background, scrollbar_thickness)?;

    let mut options = resvg::usvg::Options::default();
    options.font_family = "Inter".to_string();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(&svg, &options)
        .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

    let size = tree.size().to_int_size();
    let scaled_width = (size.width() as f32 * scale).ceil();
    let scaled_height = (size.height() as f32 * scale).ceil();

    if !scaled_width.is_finite() || !scaled_height.is_finite() || scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
        bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
    }
    if scaled_width < 1.0 || scaled_height < 1.0 {
        bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
    }

    let (width, height) = (scaled_width as u32, scaled_height as u32);
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("failed to allocate {width}x{height} surface for PNG export"))?;

    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
}
