//! Output encoding and file writing

use crate::composite::encode_for_format;
use crate::error::Result;
use crate::models::{ExportSettings, OutputFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Encode a rendered image with the export format and quality settings
pub fn encode(image: &DynamicImage, settings: &ExportSettings) -> Result<Vec<u8>> {
    let prepared = encode_for_format(image.clone(), settings.format);
    let mut buffer = Vec::new();

    match settings.format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, settings.quality());
            prepared.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            let compression = if settings.optimize {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let encoder = PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive);
            prepared.write_with_encoder(encoder)?;
        }
    }

    Ok(buffer)
}

/// Temporary path next to `path` used while writing
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Write `bytes` to a `.part` file and rename it into place, so `path` is
/// either absent or complete
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let partial = partial_path(path);
    let result = std::fs::write(&partial, bytes).and_then(|_| std::fs::rename(&partial, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

/// Encode and write a rendered image; returns the written size in bytes
pub fn export_image(image: &DynamicImage, settings: &ExportSettings, path: &Path) -> Result<u64> {
    let bytes = encode(image, settings)?;
    write_atomic(path, &bytes)?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn noisy() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) * 5 % 256) as u8, 200])
        }))
    }

    #[test]
    fn test_jpeg_quality_changes_size() {
        let low = ExportSettings {
            jpeg_quality: 10,
            ..ExportSettings::default()
        };
        let high = ExportSettings {
            jpeg_quality: 100,
            ..ExportSettings::default()
        };
        let low_bytes = encode(&noisy(), &low).unwrap();
        let high_bytes = encode(&noisy(), &high).unwrap();
        assert!(low_bytes.len() < high_bytes.len());

        let decoded = image::load_from_memory(&high_bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_png_keeps_alpha() {
        let settings = ExportSettings {
            format: OutputFormat::Png,
            optimize: true,
            ..ExportSettings::default()
        };
        let bytes = encode(&noisy(), &settings).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
        assert_eq!(decoded.to_rgba8().get_pixel(3, 4)[3], 200);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/out/photo_watermarked.jpg")),
            PathBuf::from("/out/photo_watermarked.jpg.part")
        );
    }

    #[test]
    fn test_export_writes_complete_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let settings = ExportSettings {
            format: OutputFormat::Png,
            ..ExportSettings::default()
        };
        let size = export_image(&noisy(), &settings, &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
        assert!(!partial_path(&path).exists());
    }
}
