//! Pixel-difference similarity between two logos.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use thiserror::Error;

const CHANNELS: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    #[error("unreadable image {origin}: {reason}")]
    Unreadable { origin: String, reason: String },
    #[error("image {origin} has no pixels")]
    Empty { origin: String },
}

/// Decodes by sniffing the file's bytes; the extension is ignored.
pub fn load_image(path: &Path) -> Result<RgbImage, CompareError> {
    let origin = path.display().to_string();
    let unreadable = |reason: String| CompareError::Unreadable {
        origin: origin.clone(),
        reason,
    };
    let img = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| unreadable(e.to_string()))?
        .decode()
        .map_err(|e| unreadable(e.to_string()))?;
    non_empty(img.to_rgb8(), origin)
}

pub fn decode_image(bytes: &[u8], origin: &str) -> Result<RgbImage, CompareError> {
    let img = image::load_from_memory(bytes).map_err(|e| CompareError::Unreadable {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    non_empty(img.to_rgb8(), origin.to_string())
}

fn non_empty(img: RgbImage, origin: String) -> Result<RgbImage, CompareError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(CompareError::Empty { origin });
    }
    Ok(img)
}

/// Score in `[0, 100]`; both images are stretched to the pairwise max width and height.
pub fn similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    let a = stretch(a, width, height);
    let b = stretch(b, width, height);

    let diff: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    let max_diff = u64::from(width) * u64::from(height) * CHANNELS * 255;

    (max_diff - diff) as f64 / max_diff as f64 * 100.0
}

fn stretch(img: &RgbImage, width: u32, height: u32) -> std::borrow::Cow<'_, RgbImage> {
    if img.dimensions() == (width, height) {
        std::borrow::Cow::Borrowed(img)
    } else {
        std::borrow::Cow::Owned(imageops::resize(img, width, height, FilterType::CatmullRom))
    }
}

pub fn compare_files(a: &Path, b: &Path) -> Result<f64, CompareError> {
    Ok(similarity(&load_image(a)?, &load_image(b)?))
}
