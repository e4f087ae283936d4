//! Frame overlays.
//!
//! Shapes are always drawn. Text needs a TrueType font, loaded from
//! `display.font_path`; without one, labels and banners are skipped.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut,
};
use imageproc::rect::Rect;

use crate::config::DisplaySettings;
use crate::detect::{BoundingBox, Detection};
use crate::zone::{Point, Zone};

pub const VIOLATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const COMPLIANT_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const ZONE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub const ZONE_CAPTION: &str = "ZONE VIOLATION";
pub const ZONE_BANNER: &str = "ALERT: ZONE VIOLATION DETECTED";

const CENTER_RADIUS: i32 = 4;
const DEFAULT_SCALE: f32 = 18.0;

pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Annotator {
    /// Shapes only.
    pub fn new() -> Self {
        Self {
            font: None,
            scale: PxScale::from(DEFAULT_SCALE),
        }
    }

    pub fn with_font(font: FontArc, scale: f32) -> Self {
        Self {
            font: Some(font),
            scale: PxScale::from(scale),
        }
    }

    pub fn from_settings(settings: &DisplaySettings) -> Result<Self> {
        match &settings.font_path {
            Some(path) => Ok(Self::with_font(load_font(path)?, settings.font_scale)),
            None => Ok(Self::new()),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Box plus `label (0.91)` caption.
    pub fn detection(&self, image: &mut RgbImage, det: &Detection, violation: bool) {
        let color = if violation {
            VIOLATION_COLOR
        } else {
            COMPLIANT_COLOR
        };
        if let Some(rect) = to_rect(&det.bbox, image) {
            draw_hollow_rect_mut(image, rect, color);
        }
        let caption = format!("{} ({:.2})", det.label, det.confidence);
        self.caption_above(image, &det.bbox, &caption, color);
    }

    pub fn center(&self, image: &mut RgbImage, point: Point) {
        draw_filled_circle_mut(
            image,
            (point.x.round() as i32, point.y.round() as i32),
            CENTER_RADIUS,
            CENTER_COLOR,
        );
    }

    /// Closed polygon outline.
    pub fn zone(&self, image: &mut RgbImage, zone: &Zone) {
        let points = zone.points();
        for (i, start) in points.iter().enumerate() {
            let end = points[(i + 1) % points.len()];
            draw_line_segment_mut(image, (start.x, start.y), (end.x, end.y), ZONE_COLOR);
        }
    }

    pub fn zone_violation(&self, image: &mut RgbImage, bbox: &BoundingBox) {
        if let Some(rect) = to_rect(bbox, image) {
            draw_hollow_rect_mut(image, rect, VIOLATION_COLOR);
        }
        self.caption_below(image, bbox, ZONE_CAPTION, VIOLATION_COLOR);
    }

    pub fn zone_banner(&self, image: &mut RgbImage) {
        let Some(font) = &self.font else {
            return;
        };
        let height = (self.scale.y * 1.6).ceil() as u32;
        draw_filled_rect_mut(
            image,
            Rect::at(0, 0).of_size(image.width().max(1), height.max(1)),
            VIOLATION_COLOR,
        );
        let pad = (self.scale.y * 0.3) as i32;
        draw_text_mut(image, TEXT_COLOR, pad, pad, self.scale, font, ZONE_BANNER);
    }

    pub fn people_count(&self, image: &mut RgbImage, count: usize) {
        let Some(font) = &self.font else {
            return;
        };
        let text = format!("People: {}", count);
        let y = image.height() as i32 - (self.scale.y * 1.4) as i32;
        draw_text_mut(image, COMPLIANT_COLOR, 8, y.max(0), self.scale, font, &text);
    }

    fn caption_above(&self, image: &mut RgbImage, bbox: &BoundingBox, text: &str, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let y = (bbox.y1 - self.scale.y - 2.0).max(0.0) as i32;
        draw_text_mut(image, color, bbox.x1.max(0.0) as i32, y, self.scale, font, text);
    }

    fn caption_below(&self, image: &mut RgbImage, bbox: &BoundingBox, text: &str, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let limit = image.height() as f32 - self.scale.y;
        let y = (bbox.y2 + 2.0).min(limit).max(0.0) as i32;
        draw_text_mut(image, color, bbox.x1.max(0.0) as i32, y, self.scale, font, text);
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).map_err(|_| anyhow!("{} is not a usable TrueType font", path.display()))
}

/// Clip a box to the image; `None` when nothing is left to draw.
fn to_rect(bbox: &BoundingBox, image: &RgbImage) -> Option<Rect> {
    let max_x = image.width() as f32 - 1.0;
    let max_y = image.height() as f32 - 1.0;
    let x1 = bbox.x1.clamp(0.0, max_x);
    let y1 = bbox.y1.clamp(0.0, max_y);
    let x2 = bbox.x2.clamp(0.0, max_x);
    let y2 = bbox.y2.clamp(0.0, max_y);
    let width = (x2 - x1).round() as u32;
    let height = (y2 - y1).round() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Rect::at(x1.round() as i32, y1.round() as i32).of_size(width, height))
}
