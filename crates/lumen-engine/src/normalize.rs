use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use lumen_contracts::canvas::{best_fit, CanvasGeometry};
use tracing::debug;

use crate::error::{EngineError, Result};

/// PNG bytes plus the geometry they were encoded at. Held only for the
/// duration of one payload assembly.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Letterboxes an arbitrary image onto the best-fit protocol canvas:
/// contain-fit resize (no crop, no stretch), opaque black padding, output
/// at exactly the canvas dimensions, losslessly encoded.
pub fn normalize_to_canvas(path: &Path) -> Result<NormalizedImage> {
    // Canvas selection only needs the header dimensions, not the pixels.
    let (source_width, source_height) = probe_dimensions(path)?;
    let canvas = best_fit(source_width, source_height);
    let decoded = open_image(path)?;
    debug!(
        source = %path.display(),
        canvas = canvas.name,
        "normalizing image to canvas"
    );
    let composed = letterbox(&decoded, canvas);
    Ok(NormalizedImage {
        bytes: encode_png(&composed)?,
        width: canvas.width,
        height: canvas.height,
    })
}

/// Re-encodes an image as PNG at its own decoded dimensions. Used where
/// the request geometry must come from the actual pixels, not from the
/// caller's nominal width/height.
pub fn load_image(path: &Path) -> Result<NormalizedImage> {
    let decoded = open_image(path)?;
    let (width, height) = (decoded.width(), decoded.height());
    Ok(NormalizedImage {
        bytes: encode_png(&decoded.to_rgb8())?,
        width,
        height,
    })
}

/// Reads width/height without decoding pixel data.
pub fn probe_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|source| EngineError::ImageRead {
        path: path.to_path_buf(),
        source,
    })
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| EngineError::ImageRead {
        path: path.to_path_buf(),
        source,
    })
}

fn letterbox(decoded: &DynamicImage, canvas: CanvasGeometry) -> RgbImage {
    let resized = decoded
        .resize(canvas.width, canvas.height, FilterType::Lanczos3)
        .to_rgb8();
    // RgbImage::new zero-fills, which is the opaque black padding.
    let mut composed = RgbImage::new(canvas.width, canvas.height);
    let offset_x = (canvas.width - resized.width()) / 2;
    let offset_y = (canvas.height - resized.height()) / 2;
    image::imageops::replace(&mut composed, &resized, offset_x as i64, offset_y as i64);
    composed
}

pub(crate) fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(EngineError::ImageEncode)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::{load_image, normalize_to_canvas, probe_dimensions};

    fn write_fixture(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut fixture = RgbImage::new(width, height);
        for pixel in fixture.pixels_mut() {
            *pixel = Rgb([200, 40, 90]);
        }
        fixture.save(&path).expect("fixture save");
        path
    }

    #[test]
    fn tall_image_lands_on_the_portrait_canvas() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = write_fixture(&temp, "tall.png", 400, 700);
        let normalized = normalize_to_canvas(&path)?;
        assert_eq!((normalized.width, normalized.height), (1024, 1536));
        let decoded = image::load_from_memory(&normalized.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (1024, 1536));
        Ok(())
    }

    #[test]
    fn wide_image_lands_on_the_landscape_canvas_with_black_bars() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = write_fixture(&temp, "wide.png", 1600, 900);
        let normalized = normalize_to_canvas(&path)?;
        assert_eq!((normalized.width, normalized.height), (1536, 1024));
        let decoded = image::load_from_memory(&normalized.bytes)?.to_rgb8();
        // 1600x900 contain-fits to 1536x864, leaving 80px bars top and bottom.
        assert_eq!(*decoded.get_pixel(768, 10), image::Rgb([0, 0, 0]));
        assert_eq!(*decoded.get_pixel(768, 512), image::Rgb([200, 40, 90]));
        Ok(())
    }

    #[test]
    fn normalization_is_deterministic() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = write_fixture(&temp, "square.png", 640, 640);
        let first = normalize_to_canvas(&path)?;
        let second = normalize_to_canvas(&path)?;
        assert_eq!((first.width, first.height), (1472, 1472));
        assert_eq!(first.bytes, second.bytes);
        Ok(())
    }

    #[test]
    fn load_image_keeps_decoded_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = write_fixture(&temp, "plain.png", 832, 1216);
        let loaded = load_image(&path)?;
        assert_eq!((loaded.width, loaded.height), (832, 1216));
        assert_eq!(probe_dimensions(&path)?, (832, 1216));
        Ok(())
    }

    #[test]
    fn unreadable_source_is_an_image_read_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("corrupt.png");
        std::fs::write(&path, b"not a png")?;
        let err = normalize_to_canvas(&path).unwrap_err();
        assert!(matches!(err, crate::EngineError::ImageRead { .. }));
        Ok(())
    }
}
