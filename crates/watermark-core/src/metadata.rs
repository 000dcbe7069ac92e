//! Capture date lookup used to prefill date watermarks

use chrono::{DateTime, Local};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// Label used when neither EXIF nor the filesystem yields a date
pub const UNKNOWN_DATE: &str = "Unknown-Date";

/// `YYYY-MM-DD` from EXIF `DateTimeOriginal`, falling back to the file's
/// modification time and finally to [`UNKNOWN_DATE`]
pub fn capture_date_label(path: &Path) -> String {
    exif_capture_date(path)
        .or_else(|| modified_date(path))
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

/// Date part of EXIF `DateTimeOriginal`, if present and well formed
pub fn exif_capture_date(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .map_err(|e| trace!("No EXIF data in {}: {}", path.display(), e))
        .ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Ascii(ref values) => {
            let raw = values.first()?;
            let stamp = exif::DateTime::from_ascii(raw).ok()?;
            Some(format!(
                "{:04}-{:02}-{:02}",
                stamp.year, stamp.month, stamp.day
            ))
        }
        _ => None,
    }
}

fn modified_date(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.format("%Y-%m-%d").to_string())
}
