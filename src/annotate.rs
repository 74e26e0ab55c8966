//! Overlay drawing. Every function here takes a bitmap plus what to draw on
//! it and returns a new bitmap; nothing depends on which backend produced
//! the findings.

use crate::config::MAX_ANNOTATION_SIDE;
use crate::model::{Finding, Region};
use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MASK_FILL: [u8; 3] = [255, 255, 0];
const MASK_FILL_ALPHA: u8 = 100;
const MASK_OUTLINE: [u8; 3] = [255, 255, 0];
const BANNER_TEXT: [u8; 3] = [255, 255, 0];
const TEXT_BACKGROUND_ALPHA: u8 = 180;
const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];

const LABEL_FONT_SIZE: f32 = 24.0;
const DETAIL_FONT_SIZE: f32 = 16.0;
const BOX_FONT_SIZE: f32 = 16.0;
const PADDING: i32 = 10;

// Per-class box colours, cycled by class id
const BOX_PALETTE: [[u8; 3]; 6] = [
    [4, 42, 255],
    [11, 219, 235],
    [243, 243, 243],
    [0, 223, 183],
    [17, 31, 104],
    [255, 111, 221],
];

/// System fonts tried when no font is configured
const FONT_CANDIDATES: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:/Windows/Fonts/arial.ttf",
];

/// Load the overlay font. Without one, text backgrounds are still drawn but
/// the text itself is skipped.
pub fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!("using overlay font {}", path.display());
                return Some(font);
            }
            Err(e) => warn!("ignoring font {}: {e}", path.display()),
        }
    }
    warn!("no overlay font found, annotations will carry no text");
    None
}

/// A mask resized to image dimensions and thresholded at 50%
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    pub fn fit(mask: &GrayImage, width: u32, height: u32) -> Self {
        let resized = if mask.dimensions() == (width, height) {
            mask.clone()
        } else {
            imageops::resize(mask, width, height, FilterType::Lanczos3)
        };
        BinaryMask {
            width,
            height,
            bits: resized.pixels().map(|p| p.0[0] > 127).collect(),
        }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    /// Number of foreground pixels
    pub fn area(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// A pixel sits on the boundary if any 4-connected neighbour differs.
    /// The image edge does not count as a neighbour.
    pub fn is_boundary(&self, x: u32, y: u32) -> bool {
        let here = self.get(x, y);
        (x > 0 && self.get(x - 1, y) != here)
            || (x + 1 < self.width && self.get(x + 1, y) != here)
            || (y > 0 && self.get(x, y - 1) != here)
            || (y + 1 < self.height && self.get(x, y + 1) != here)
    }
}

fn blend(pixel: &mut Rgb<u8>, color: [u8; 3], alpha: u8) {
    let a = alpha as u32;
    for (c, over) in pixel.0.iter_mut().zip(color) {
        *c = ((over as u32 * a + *c as u32 * (255 - a) + 127) / 255) as u8;
    }
}

/// Blend a rectangle with inclusive corners onto the canvas, clipped to it
fn blend_rect(canvas: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: [u8; 3], alpha: u8) {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    let (x0, y0) = (from.0.max(0), from.1.max(0));
    let (x1, y1) = (to.0.min(w - 1), to.1.min(h - 1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            blend(canvas.get_pixel_mut(x as u32, y as u32), color, alpha);
        }
    }
}

/// Paint a semi-transparent fill over the mask and a solid outline on its
/// foreground boundary pixels
pub fn paint_mask(canvas: &mut RgbImage, mask: &BinaryMask) {
    for y in 0..mask.height.min(canvas.height()) {
        for x in 0..mask.width.min(canvas.width()) {
            if !mask.get(x, y) {
                continue;
            }
            let pixel = canvas.get_pixel_mut(x, y);
            if mask.is_boundary(x, y) {
                *pixel = Rgb(MASK_OUTLINE);
            } else {
                blend(pixel, MASK_FILL, MASK_FILL_ALPHA);
            }
        }
    }
}

fn measure(font: Option<&FontVec>, size: f32, text: &str, fallback_char: i32) -> (i32, i32) {
    match font {
        Some(font) => {
            let (w, h) = text_size(PxScale::from(size), font, text);
            (w as i32, h as i32)
        }
        None => (text.chars().count() as i32 * fallback_char, size as i32),
    }
}

fn write_text(canvas: &mut RgbImage, font: Option<&FontVec>, at: (i32, i32), size: f32, color: [u8; 3], text: &str) {
    if let Some(font) = font {
        draw_text_mut(canvas, Rgb(color), at.0, at.1, PxScale::from(size), font, text);
    }
}

fn draw_box(canvas: &mut RgbImage, finding: &Finding, bbox: &[f32; 4], font: Option<&FontVec>) {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
        return;
    }

    let color = BOX_PALETTE[finding.class_id as usize % BOX_PALETTE.len()];
    for t in 0..2 {
        let (bw, bh) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
        if bw <= 0 || bh <= 0 {
            break;
        }
        let rect = Rect::at(x_min + t, y_min + t).of_size(bw as u32 + 1, bh as u32 + 1);
        draw_hollow_rect_mut(canvas, rect, Rgb(color));
    }

    let name = finding
        .class_name
        .clone()
        .unwrap_or_else(|| finding.class_id.to_string());
    let label = format!("{name} {:.2}", finding.confidence);
    let (tw, th) = measure(font, BOX_FONT_SIZE, &label, 8);
    let top = (y_min - th - 4).max(0);
    blend_rect(canvas, (x_min, top), (x_min + tw + 4, top + th + 4), color, 255);
    write_text(canvas, font, (x_min + 2, top + 2), BOX_FONT_SIZE, WHITE, &label);
}

/// Stamp a text banner in the top-left corner
pub fn stamp_banner(canvas: &mut RgbImage, font: Option<&FontVec>, text: &str) {
    let (tw, th) = measure(font, DETAIL_FONT_SIZE, text, 8);
    let at = (PADDING, PADDING);
    match font {
        Some(_) => {
            // black outline under the yellow text
            for (dx, dy) in [(-2, 0), (2, 0), (0, -2), (0, 2), (-1, -1), (1, 1), (-1, 1), (1, -1)] {
                write_text(canvas, font, (at.0 + dx, at.1 + dy), DETAIL_FONT_SIZE, BLACK, text);
            }
            write_text(canvas, font, at, DETAIL_FONT_SIZE, BANNER_TEXT, text);
        }
        None => {
            blend_rect(canvas, (at.0 - 4, at.1 - 4), (at.0 + tw + 4, at.1 + th + 4), BLACK, TEXT_BACKGROUND_ALPHA);
            blend_rect(canvas, (at.0 - 4, at.1 + th + 2), (at.0 + tw + 4, at.1 + th + 4), BANNER_TEXT, 255);
        }
    }
}

/// Draw masks, boxes and labels for a set of detections. `image` is the
/// bitmap the coordinates refer to. When there is nothing to draw and
/// `empty_text` is given, it is stamped as a banner instead.
pub fn annotate_detections(
    image: &RgbImage,
    findings: &[Finding],
    font: Option<&FontVec>,
    empty_text: Option<&str>,
) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();

    for finding in findings {
        if let Some(Region::Mask(mask)) = &finding.region {
            paint_mask(&mut canvas, &BinaryMask::fit(mask, width, height));
        }
    }
    for finding in findings {
        if let Some(Region::BBox(bbox)) = &finding.region {
            draw_box(&mut canvas, finding, bbox, font);
        }
    }

    if let (true, Some(text)) = (findings.is_empty(), empty_text) {
        stamp_banner(&mut canvas, font, text);
    }
    canvas
}

/// Displayed accuracy for a confidence in `[0, 1]`, as a whole percentage
/// truncated towards zero
pub fn percent(confidence: f64) -> u32 {
    (confidence * 100.0).floor().clamp(0.0, 100.0) as u32
}

/// Shrink so that neither side exceeds `MAX_ANNOTATION_SIDE`, keeping the
/// aspect ratio
pub fn cap_size(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    if w <= MAX_ANNOTATION_SIDE && h <= MAX_ANNOTATION_SIDE {
        return image.clone();
    }
    let cap = MAX_ANNOTATION_SIDE as u64;
    let (nw, nh) = if w >= h {
        (cap, (h as u64 * cap / w as u64).max(1))
    } else {
        ((w as u64 * cap / h as u64).max(1), cap)
    };
    let (nw, nh) = (nw as u32, nh as u32);
    imageops::resize(image, nw, nh, FilterType::Lanczos3)
}

/// Text colour for a soil label
pub fn soil_color(label: &str) -> [u8; 3] {
    match label {
        "Alluvial Soil" => [0x4A, 0x90, 0xE2],
        "Black Soil" => [0x2C, 0x3E, 0x50],
        "Clay Soil" => [0xE6, 0x7E, 0x22],
        "Red Soil" => [0xE7, 0x4C, 0x3C],
        _ => WHITE,
    }
}

/// Label and accuracy line on dark backgrounds, on a size-capped copy
pub fn annotate_classification(image: &RgbImage, label: &str, confidence: f64, font: Option<&FontVec>) -> RgbImage {
    let mut canvas = cap_size(image);

    let accuracy = format!("Accuracy {}%", percent(confidence));
    let (tw, th) = measure(font, LABEL_FONT_SIZE, label, 12);
    let (aw, ah) = measure(font, DETAIL_FONT_SIZE, &accuracy, 8);

    blend_rect(
        &mut canvas,
        (PADDING, PADDING),
        (20 + tw + PADDING, 20 + th + PADDING),
        BLACK,
        TEXT_BACKGROUND_ALPHA,
    );
    blend_rect(
        &mut canvas,
        (PADDING, 30 + th + PADDING),
        (20 + aw + PADDING, 50 + th + PADDING + ah),
        BLACK,
        TEXT_BACKGROUND_ALPHA,
    );

    write_text(&mut canvas, font, (15, 15), LABEL_FONT_SIZE, soil_color(label), label);
    write_text(&mut canvas, font, (15, 35 + th + PADDING), DETAIL_FONT_SIZE, WHITE, &accuracy);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::solid;
    use image::Luma;

    fn square_mask(size: u32, from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = (from..to).contains(&x) && (from..to).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_binary_mask_boundary() {
        let mask = BinaryMask::fit(&square_mask(8, 2, 6), 8, 8);
        assert_eq!(mask.area(), 16);
        assert!(mask.is_boundary(2, 2));
        assert!(mask.is_boundary(5, 3));
        assert!(!mask.is_boundary(3, 3));
        // background next to the square is also a transition
        assert!(mask.is_boundary(1, 3));
        assert!(!mask.is_boundary(0, 0));
    }

    #[test]
    fn test_mask_resized_to_image() {
        let mask = BinaryMask::fit(&square_mask(4, 0, 4), 16, 12);
        assert_eq!(mask.area(), 16 * 12);
        // a full mask has no transitions inside the image
        assert!(!mask.is_boundary(0, 0));
        assert!(!mask.is_boundary(15, 11));
    }

    #[test]
    fn test_paint_mask() {
        let mut canvas = solid(8, 8, [0, 0, 0]);
        paint_mask(&mut canvas, &BinaryMask::fit(&square_mask(8, 2, 6), 8, 8));
        assert_eq!(canvas.get_pixel(2, 2).0, MASK_OUTLINE);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0]);
        // background pixels on the transition are left alone
        assert_eq!(canvas.get_pixel(1, 3).0, [0, 0, 0]);
        let inner = canvas.get_pixel(3, 3).0;
        assert_eq!(inner, [100, 100, 0]);
    }

    #[test]
    fn test_empty_detections_get_banner() {
        let image = solid(120, 60, [10, 120, 10]);
        let annotated = annotate_detections(&image, &[], None, Some("No vegetation detected"));
        assert_eq!(annotated.dimensions(), image.dimensions());
        assert_ne!(annotated, image);
        // far corner untouched
        assert_eq!(annotated.get_pixel(119, 59), image.get_pixel(119, 59));
    }

    #[test]
    fn test_box_detection_is_drawn() {
        let image = solid(64, 64, [0, 0, 0]);
        let finding = Finding {
            class_id: 0,
            class_name: Some("vegetation".into()),
            confidence: 0.9,
            region: Some(Region::BBox([10.0, 20.0, 40.0, 50.0])),
        };
        let annotated = annotate_detections(&image, &[finding], None, None);
        assert_eq!(annotated.get_pixel(25, 50).0, BOX_PALETTE[0]);
        assert_eq!(annotated.get_pixel(25, 35).0, [0, 0, 0]);
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let image = solid(16, 16, [0, 0, 0]);
        let finding = Finding {
            class_id: 1,
            class_name: None,
            confidence: 0.5,
            region: Some(Region::BBox([30.0, 30.0, 40.0, 40.0])),
        };
        assert_eq!(annotate_detections(&image, &[finding], None, Some("x")), image);
    }

    #[test]
    fn test_percent_truncates() {
        assert_eq!(percent(0.6), 60);
        // 0.6 + 0.29 is just under 0.89 in binary
        assert_eq!(percent(0.6 + 0.29), 88);
        assert_eq!(percent(0.944), 94);
        assert_eq!(percent(0.946), 94);
        assert_eq!(percent(0.999), 99);
        assert_eq!(percent(1.0), 100);
    }

    #[test]
    fn test_classification_overlay_caps_size() {
        let large = solid(1600, 400, [90, 60, 30]);
        let annotated = annotate_classification(&large, "Red Soil", 0.8, None);
        assert_eq!(annotated.dimensions(), (800, 200));

        let small = solid(300, 200, [90, 60, 30]);
        let annotated = annotate_classification(&small, "Clay Soil", 0.8, None);
        assert_eq!(annotated.dimensions(), (300, 200));
        // the label background darkens the corner
        assert!(annotated.get_pixel(12, 12).0[0] < 90);
        assert_eq!(annotated.get_pixel(299, 199).0, [90, 60, 30]);
    }

    #[test]
    fn test_soil_colors() {
        assert_eq!(soil_color("Clay Soil"), [0xE6, 0x7E, 0x22]);
        assert_eq!(soil_color("Sand"), WHITE);
    }
}
