//! Disk-backed canvas state.
//!
//! The browser saves the canvas as `<name>.png` and its mask as
//! `<name>_mask.png`. Reading never fails: a missing or unreadable file
//! produces an explicit fallback value so the node always emits something.

use std::path::{Component, Path, PathBuf};

use image::metadata::Orientation;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageReader, Rgb, RgbImage};

use crate::error::CanvasError;
use crate::imaging::tensor::{byte_to_unit, unit_to_byte};

/// Side of the blank canvas used when the canvas image cannot be read.
pub const BLANK_CANVAS_SIZE: u32 = 512;

#[derive(Debug, Clone)]
pub struct CanvasStorage {
    input_dir: PathBuf,
    output_dir: PathBuf,
    temp_dir: PathBuf,
}

/// Outcome of reading a canvas. The fallback variants carry the reason.
#[derive(Debug)]
pub enum CanvasLoad {
    Loaded {
        image: RgbImage,
        mask: GrayImage,
    },
    /// Image read fine, mask missing or unreadable: all-zero mask of the image extent.
    MaskFallback {
        image: RgbImage,
        mask: GrayImage,
        reason: CanvasError,
    },
    /// Image missing or unreadable: white blank canvas and all-zero mask.
    BlankFallback {
        image: RgbImage,
        mask: GrayImage,
        reason: CanvasError,
    },
}

impl CanvasLoad {
    pub fn into_parts(self) -> (RgbImage, GrayImage) {
        match self {
            CanvasLoad::Loaded { image, mask }
            | CanvasLoad::MaskFallback { image, mask, .. }
            | CanvasLoad::BlankFallback { image, mask, .. } => (image, mask),
        }
    }

    pub fn fallback(&self) -> Option<String> {
        match self {
            CanvasLoad::Loaded { .. } => None,
            CanvasLoad::MaskFallback { reason, .. } => Some(format!("mask: {reason}")),
            CanvasLoad::BlankFallback { reason, .. } => Some(format!("image: {reason}")),
        }
    }

    pub fn blank() -> (RgbImage, GrayImage) {
        (
            RgbImage::from_pixel(BLANK_CANVAS_SIZE, BLANK_CANVAS_SIZE, Rgb([255, 255, 255])),
            GrayImage::new(BLANK_CANVAS_SIZE, BLANK_CANVAS_SIZE),
        )
    }
}

impl CanvasStorage {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Resolve an annotated name such as `canvas_image.png [output]` to the
    /// image path and its companion mask path.
    pub fn resolve(&self, annotated_name: &str) -> Result<(PathBuf, PathBuf), CanvasError> {
        let trimmed = annotated_name.trim();
        let (name, base) = match trimmed.strip_suffix(']').and_then(|s| s.rsplit_once(" [")) {
            Some((name, "input")) => (name, &self.input_dir),
            Some((name, "output")) => (name, &self.output_dir),
            Some((name, "temp")) => (name, &self.temp_dir),
            Some((_, other)) => {
                return Err(CanvasError::InvalidPath(format!(
                    "unknown directory annotation [{other}]"
                )))
            }
            None => (trimmed, &self.input_dir),
        };

        let relative = Path::new(name);
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(CanvasError::InvalidPath(annotated_name.to_string()));
        }

        let image_path = base.join(relative);
        let stem = relative
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CanvasError::InvalidPath(annotated_name.to_string()))?;
        let mask_path = image_path.with_file_name(format!("{stem}_mask.png"));
        Ok((image_path, mask_path))
    }

    pub fn load(&self, annotated_name: &str) -> CanvasLoad {
        let (image_path, mask_path) = match self.resolve(annotated_name) {
            Ok(paths) => paths,
            Err(reason) => return blank_fallback(reason),
        };

        let image = match read_canvas_image(&image_path) {
            Ok(image) => image,
            Err(reason) => {
                log::warn!(
                    "[CANVAS] Error processing canvas image {}: {}",
                    image_path.display(),
                    reason
                );
                return blank_fallback(reason);
            }
        };

        match read_canvas_mask(&mask_path) {
            Ok(mask) => CanvasLoad::Loaded { image, mask },
            Err(reason) => {
                log::debug!(
                    "[CANVAS] No usable mask at {} ({}), using an empty mask",
                    mask_path.display(),
                    reason
                );
                let mask = GrayImage::new(image.width(), image.height());
                CanvasLoad::MaskFallback { image, mask, reason }
            }
        }
    }
}

fn blank_fallback(reason: CanvasError) -> CanvasLoad {
    let (image, mask) = CanvasLoad::blank();
    CanvasLoad::BlankFallback { image, mask, reason }
}

fn open_oriented(path: &Path) -> Result<DynamicImage, CanvasError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| CanvasError::Decode(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|e| CanvasError::Decode(e.to_string()))?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// RGBA is flattened over mid-gray, everything else converted to RGB.
fn read_canvas_image(path: &Path) -> Result<RgbImage, CanvasError> {
    let image = open_oriented(path)?;
    let rgba_like = matches!(
        image,
        DynamicImage::ImageRgba8(_) | DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_)
    );
    if !rgba_like {
        return Ok(image.to_rgb8());
    }

    let rgba = image.to_rgba8();
    Ok(RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let alpha = byte_to_unit(p[3]);
        let blend = |c: u8| unit_to_byte(byte_to_unit(c) * alpha + (1.0 - alpha) * 0.5);
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    }))
}

fn read_canvas_mask(path: &Path) -> Result<GrayImage, CanvasError> {
    Ok(open_oriented(path)?.to_luma8())
}
