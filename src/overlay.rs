// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::f32::consts::PI;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::FontVec;
use canonical_error::{CanonicalError, invalid_argument_error, not_found_error};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::DetectionResult;
use crate::proximity::connect;

// Inner/outer radius ratio of the five-pointed star marker.
const STAR_INNER_RATIO: f32 = 0.382;

#[derive(Clone, Debug, PartialEq)]
pub struct StarsOptions {
    // Outer radius, pixels.
    pub size: u32,
    pub colour: Rgb<u8>,
    pub thickness: u32,
}

impl Default for StarsOptions {
    fn default() -> Self {
        StarsOptions{size: 6, colour: Rgb([255, 255, 0]), thickness: 1}
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoxesOptions {
    pub colour: Rgb<u8>,
    pub thickness: u32,
}

impl Default for BoxesOptions {
    fn default() -> Self {
        BoxesOptions{colour: Rgb([255, 255, 255]), thickness: 1}
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinesOptions {
    pub colour: Rgb<u8>,
    // Max number of lines meeting at any one center.
    pub degree: usize,
    pub thickness: u32,
}

impl Default for LinesOptions {
    fn default() -> Self {
        LinesOptions{colour: Rgb([255, 0, 0]), degree: 2, thickness: 1}
    }
}

/// Text drawn next to each blob's box: its index and area.
#[derive(Clone)]
pub struct LabelsOptions {
    pub font: Arc<FontVec>,
    pub colour: Rgb<u8>,
    // Glyph height, pixels.
    pub scale: f32,
}

impl LabelsOptions {
    pub fn new(font: FontVec) -> Self {
        LabelsOptions{font: Arc::new(font), colour: Rgb([255, 255, 255]), scale: 12.0}
    }
}

impl fmt::Debug for LabelsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelsOptions")
            .field("colour", &self.colour)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

/// Which overlays to draw; `None` disables that overlay.
#[derive(Clone, Debug, Default)]
pub struct OverlayOptions {
    pub stars: Option<StarsOptions>,
    pub boxes: Option<BoxesOptions>,
    pub lines: Option<LinesOptions>,
    pub labels: Option<LabelsOptions>,
}

/// Reads a TrueType/OpenType font for drawing labels.
pub fn load_font(path: &Path) -> Result<FontVec, CanonicalError> {
    let bytes = std::fs::read(path).map_err(|e| not_found_error(
        format!("Cannot read font {:?}: {}", path, e).as_str()))?;
    FontVec::try_from_vec(bytes).map_err(|e| invalid_argument_error(
        format!("Invalid font {:?}: {}", path, e).as_str()))
}

/// Returns an RGB copy of `frame` with stars, boxes, labels and proximity
/// lines drawn for `result`, in that order. Labels need box geometry and are
/// skipped for center-only results.
pub fn render(frame: &DynamicImage, result: &DetectionResult,
              options: &OverlayOptions) -> RgbImage {
    let mut canvas = frame.to_rgb8();
    if let Some(stars) = &options.stars {
        for center in result.centers() {
            draw_star(&mut canvas, *center, stars);
        }
    }
    if let Some(boxes) = &options.boxes {
        for bbox in result.boxes() {
            draw_box(&mut canvas, bbox, boxes);
        }
    }
    if let Some(labels) = &options.labels {
        if result.has_geometry() {
            for (bbox, text) in result.boxes().iter().zip(result.labels()) {
                let (x, y) = label_origin(bbox, labels.scale);
                draw_text_mut(&mut canvas, labels.colour, x, y, labels.scale,
                              labels.font.as_ref(), text);
            }
        }
    }
    if let Some(lines) = &options.lines {
        let centers = result.centers();
        if centers.len() >= 2 {
            for (i, j) in connect(centers, lines.degree) {
                draw_thick_segment(&mut canvas, as_f32(centers[i]), as_f32(centers[j]),
                                   lines.thickness, lines.colour);
            }
        }
    }
    canvas
}

/// Parses "#RRGGBB" (the '#' is optional).
pub fn parse_hex_colour(text: &str) -> Result<Rgb<u8>, CanonicalError> {
    let hex = text.strip_prefix('#').unwrap_or(text);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid_argument_error(
            format!("Colour must be #RRGGBB, got '{}'", text).as_str()));
    }
    let channel = |at: usize| {
        u8::from_str_radix(&hex[at..at + 2], 16).map_err(|e| invalid_argument_error(
            format!("Bad colour '{}': {}", text, e).as_str()))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

// Ten vertices alternating between the outer and inner radius, starting with
// an outer vertex straight above the center.
fn star_vertices(center: (i32, i32), size: u32) -> Vec<(f32, f32)> {
    let (cx, cy) = as_f32(center);
    let outer = size as f32;
    let inner = outer * STAR_INNER_RATIO;
    (0..10).map(|k| {
        let radius = if k % 2 == 0 { outer } else { inner };
        let angle = k as f32 * PI / 5.0 - PI / 2.0;
        (cx + radius * angle.cos(), cy + radius * angle.sin())
    }).collect()
}

fn draw_star(canvas: &mut RgbImage, center: (i32, i32), options: &StarsOptions) {
    let vertices = star_vertices(center, options.size);
    for k in 0..vertices.len() {
        let next = vertices[(k + 1) % vertices.len()];
        draw_thick_segment(canvas, vertices[k], next, options.thickness, options.colour);
    }
}

// Top-left corner of a label: just above the box, or just below it when the
// box is too close to the top edge. The text baseline sits 4 pixels above the
// box or 12 pixels below its bottom edge.
fn label_origin(bbox: &Rect, scale: f32) -> (i32, i32) {
    let baseline = if bbox.top() > 12 {
        bbox.top() - 4
    } else {
        bbox.bottom() + 1 + 12
    };
    (bbox.left() + 2, baseline - scale.round() as i32)
}

// The outline runs through the corners (left, top) and (left + width,
// top + height) inclusive; `thickness` nested outlines are centered on it.
fn draw_box(canvas: &mut RgbImage, bbox: &Rect, options: &BoxesOptions) {
    let thickness = options.thickness.max(1) as i32;
    for offset in -(thickness - 1) / 2..=thickness / 2 {
        let width = bbox.width() as i32 + 1 + 2 * offset;
        let height = bbox.height() as i32 + 1 + 2 * offset;
        if width <= 0 || height <= 0 {
            continue;
        }
        let rect = Rect::at(bbox.left() - offset, bbox.top() - offset)
            .of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, options.colour);
    }
}

// Draws `thickness` one-pixel strokes side by side, centered on the segment
// from `start` to `end`.
fn draw_thick_segment(canvas: &mut RgbImage, start: (f32, f32), end: (f32, f32),
                      thickness: u32, colour: Rgb<u8>) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if length > 0.0 { (-dy / length, dx / length) } else { (0.0, 0.0) };
    let thickness = thickness.max(1);
    // Endpoints are snapped to pixel centers; the line rasterizer truncates.
    let snap = |x: f32, y: f32| (x.round(), y.round());
    for s in 0..thickness {
        let offset = s as f32 - (thickness - 1) as f32 / 2.0;
        draw_line_segment_mut(canvas,
                              snap(start.0 + nx * offset, start.1 + ny * offset),
                              snap(end.0 + nx * offset, end.1 + ny * offset),
                              colour);
    }
}

fn as_f32(point: (i32, i32)) -> (f32, f32) {
    (point.0 as f32, point.1 as f32)
}

// mod tests.
