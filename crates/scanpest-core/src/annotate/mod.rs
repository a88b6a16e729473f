//! Draws detection boxes and labels onto images.
//!
//! Geometry is computed by [`layout`] independently of drawing so it can be
//! inspected without a font. [`render`] never mutates its input.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::models::BoundingBox;
use crate::{Error, Result};

const REFERENCE_EXTENT: f32 = 2000.0;
const BASE_STROKE_WIDTH: f32 = 5.0;
const BASE_TEXT_SIZE: f32 = 40.0;
const LABEL_MARGIN: i32 = 10;

/// Stroke, text size and color scaled to an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationStyle {
    pub stroke_width: u32,
    pub text_size: f32,
    /// Gap between a label and the box below it
    pub label_margin: i32,
    pub color: Rgba<u8>,
}

impl AnnotationStyle {
    /// Scale by `(width + height) / 2000`, so a 1000x1000 image gets a 5px
    /// stroke and 40px text.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_image(width: u32, height: u32) -> Self {
        let scale = (width as f32 + height as f32) / REFERENCE_EXTENT;
        Self {
            stroke_width: ((BASE_STROKE_WIDTH * scale).round() as u32).max(1),
            text_size: (BASE_TEXT_SIZE * scale).max(1.0),
            label_margin: LABEL_MARGIN,
            color: Rgba([255, 0, 0, 255]),
        }
    }
}

/// Pixel rectangle; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelRect {
    #[allow(clippy::cast_sign_loss)]
    pub const fn width(&self) -> u32 {
        (self.right - self.left) as u32
    }

    #[allow(clippy::cast_sign_loss)]
    pub const fn height(&self) -> u32 {
        (self.bottom - self.top) as u32
    }
}

/// Where and how one box is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxAnnotation {
    pub rect: PixelRect,
    /// `"<index> <class> <percent>%"`, index starting at 1
    pub label: String,
    /// Top-left corner of the label text
    pub label_origin: (i32, i32),
}

/// Compute the annotation of every box, in input order.
pub fn layout(
    width: u32,
    height: u32,
    boxes: &[BoundingBox],
    style: &AnnotationStyle,
) -> Vec<BoxAnnotation> {
    boxes
        .iter()
        .enumerate()
        .map(|(index, bbox)| {
            let rect = pixel_rect(width, height, bbox);
            let text_size = text_height(style.text_size);
            let label_y = if rect.top - style.label_margin > text_size {
                rect.top - style.label_margin - text_size
            } else {
                rect.top
            };
            BoxAnnotation {
                rect,
                label: format!(
                    "{} {} {}%",
                    index + 1,
                    bbox.class_name,
                    confidence_percent(bbox.confidence)
                ),
                label_origin: (rect.left, label_y),
            }
        })
        .collect()
}

/// Draw `boxes` onto a copy of `image`. Labels need a font.
pub fn render(image: &DynamicImage, boxes: &[BoundingBox], font: Option<&FontArc>) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    let (width, height) = canvas.dimensions();
    let style = AnnotationStyle::for_image(width, height);

    for annotation in layout(width, height, boxes, &style) {
        draw_stroke(&mut canvas, annotation.rect, &style);
        if let Some(font) = font {
            let (x, y) = annotation.label_origin;
            draw_text_mut(
                &mut canvas,
                style.color,
                x,
                y,
                PxScale::from(style.text_size),
                font,
                &annotation.label,
            );
        }
    }
    canvas
}

/// Load `source`, draw `boxes` and save the result to `output`.
pub fn render_file(
    source: &Path,
    output: &Path,
    boxes: &[BoundingBox],
    font: Option<&FontArc>,
) -> Result<()> {
    let image = image::open(source)?;
    let rendered = DynamicImage::ImageRgba8(render(&image, boxes, font));
    let format = ImageFormat::from_path(output)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if format == ImageFormat::Jpeg {
        // JPEG has no alpha channel
        rendered.to_rgb8().save_with_format(output, format)?;
    } else {
        rendered.save_with_format(output, format)?;
    }
    tracing::debug!(
        "Annotated {} box(es) from {} into {}",
        boxes.len(),
        source.display(),
        output.display()
    );
    Ok(())
}

/// Load a TrueType/OpenType font for labels.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)?;
    FontArc::try_from_vec(bytes)
        .map_err(|error| Error::InvalidInput(format!("invalid font {}: {error}", path.display())))
}

fn draw_stroke(canvas: &mut RgbaImage, rect: PixelRect, style: &AnnotationStyle) {
    let (mut width, mut height) = (rect.width(), rect.height());
    for inset in 0..style.stroke_width {
        if width == 0 || height == 0 {
            break;
        }
        let offset = i32::try_from(inset).unwrap_or(i32::MAX);
        draw_hollow_rect_mut(
            canvas,
            Rect::at(rect.left + offset, rect.top + offset).of_size(width, height),
            style.color,
        );
        width = width.saturating_sub(2);
        height = height.saturating_sub(2);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pixel_rect(width: u32, height: u32, bbox: &BoundingBox) -> PixelRect {
    let scale = |value: f32, extent: u32| -> i32 {
        let extent = f64::from(extent);
        (f64::from(value) * extent).round().clamp(0.0, extent) as i32
    };
    let left = scale(bbox.x1, width);
    let top = scale(bbox.y1, height);
    PixelRect {
        left,
        top,
        right: scale(bbox.x2, width).max(left + 1),
        bottom: scale(bbox.y2, height).max(top + 1),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn text_height(text_size: f32) -> i32 {
    text_size.round() as i32
}

/// Whole percent, truncated.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn confidence_percent(confidence: f32) -> u32 {
    (f64::from(confidence.clamp(0.0, 1.0)) * 100.0) as u32
}
