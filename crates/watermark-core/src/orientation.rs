//! EXIF orientation normalization and the oriented source cache

use crate::error::{Result, WatermarkError};
use image::DynamicImage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// The eight EXIF orientations. Rotations are clockwise, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    /// Rotate 90° then mirror horizontally
    Transpose,
    Rotate90,
    /// Rotate 270° then mirror horizontally
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map the raw EXIF tag value; anything outside 1–8 is treated as normal
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    pub fn exif_value(&self) -> u32 {
        match self {
            Orientation::Normal => 1,
            Orientation::FlipHorizontal => 2,
            Orientation::Rotate180 => 3,
            Orientation::FlipVertical => 4,
            Orientation::Transpose => 5,
            Orientation::Rotate90 => 6,
            Orientation::Transverse => 7,
            Orientation::Rotate270 => 8,
        }
    }

    /// Read the orientation tag of a file. Files without EXIF data, or that
    /// cannot be parsed, are treated as normal.
    pub fn read(path: &Path) -> Self {
        let Ok(file) = File::open(path) else {
            return Orientation::Normal;
        };
        let mut reader = BufReader::new(file);
        let exif = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(e) => {
                trace!("No EXIF data in {}: {}", path.display(), e);
                return Orientation::Normal;
            }
        };
        exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Self::from_exif)
            .unwrap_or_default()
    }

    /// Turn a stored image into its upright form
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Normal => image,
            Orientation::FlipHorizontal => image.fliph(),
            Orientation::Rotate180 => image.rotate180(),
            Orientation::FlipVertical => image.flipv(),
            Orientation::Transpose => image.rotate90().fliph(),
            Orientation::Rotate90 => image.rotate90(),
            Orientation::Transverse => image.rotate270().fliph(),
            Orientation::Rotate270 => image.rotate270(),
        }
    }
}

/// Decode a source image and normalize its orientation
pub fn load_oriented(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(WatermarkError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let image = image::open(path)?;
    let orientation = Orientation::read(path);
    if orientation != Orientation::Normal {
        debug!("Applying EXIF orientation {:?} to {}", orientation, path.display());
    }
    Ok(orientation.apply(image))
}

/// Decoded, upright source images keyed by path.
///
/// Repeated previews of the same file decode it once.
#[derive(Default)]
pub struct OrientedImageCache {
    entries: RwLock<HashMap<PathBuf, Arc<DynamicImage>>>,
    loads: AtomicUsize,
}

impl OrientedImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upright image for `path`, decoding it on first request
    pub fn get(&self, path: &Path) -> Result<Arc<DynamicImage>> {
        if let Some(image) = self.entries.read().get(path) {
            return Ok(Arc::clone(image));
        }

        let image = Arc::new(load_oriented(path)?);
        self.loads.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write();
        let cached = entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::clone(&image));
        Ok(Arc::clone(cached))
    }

    /// Forget a path, e.g. after the file changed on disk
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.write().remove(path).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of decodes performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for OrientedImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientedImageCache")
            .field("entries", &self.len())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::tempdir;

    /// 3×2 image with a marker in the top-left corner
    fn marked() -> DynamicImage {
        let mut image = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(image)
    }

    fn marker_position(image: &DynamicImage) -> (u32, u32) {
        let rgb = image.to_rgb8();
        rgb.enumerate_pixels()
            .find(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .unwrap()
    }

    #[test]
    fn test_exif_value_round_trip() {
        for value in 1..=8 {
            assert_eq!(Orientation::from_exif(value).exif_value(), value);
        }
        assert_eq!(Orientation::from_exif(0), Orientation::Normal);
        assert_eq!(Orientation::from_exif(42), Orientation::Normal);
    }

    #[test]
    fn test_apply_transforms() {
        let cases = [
            (Orientation::Normal, (3, 2), (0, 0)),
            (Orientation::FlipHorizontal, (3, 2), (2, 0)),
            (Orientation::Rotate180, (3, 2), (2, 1)),
            (Orientation::FlipVertical, (3, 2), (0, 1)),
            (Orientation::Transpose, (2, 3), (0, 0)),
            (Orientation::Rotate90, (2, 3), (1, 0)),
            (Orientation::Transverse, (2, 3), (1, 2)),
            (Orientation::Rotate270, (2, 3), (0, 2)),
        ];
        for (orientation, dimensions, marker) in cases {
            let upright = orientation.apply(marked());
            assert_eq!(upright.dimensions(), dimensions, "{:?}", orientation);
            assert_eq!(marker_position(&upright), marker, "{:?}", orientation);
        }
    }

    #[test]
    fn test_file_without_exif_is_normal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.png");
        marked().save(&path).unwrap();
        assert_eq!(Orientation::read(&path), Orientation::Normal);
        assert_eq!(Orientation::read(&dir.path().join("missing.jpg")), Orientation::Normal);
    }

    #[test]
    fn test_cache_decodes_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.png");
        marked().save(&path).unwrap();

        let cache = OrientedImageCache::new();
        let first = cache.get(&path).unwrap();
        let second = cache.get(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(&path));
        cache.get(&path).unwrap();
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn test_cache_missing_file() {
        let cache = OrientedImageCache::new();
        let result = cache.get(Path::new("/nonexistent/photo.jpg"));
        assert!(matches!(result, Err(WatermarkError::FileNotFound { .. })));
        assert!(cache.is_empty());
    }
}
