//! Font lookup for text watermarks
//!
//! Faces are resolved through the [`FontProvider`] trait. [`FontLibrary`]
//! indexes `.ttf`/`.otf` files found under a set of directories and parses
//! each file at most once, on first use. A lookup that finds nothing is not
//! an error: text falls back to the built-in bitmap face in [`builtin`].

use crate::config::FontConfig;
use ab_glyph::FontVec;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A face chosen for a family and style request
#[derive(Clone)]
pub struct FaceMatch {
    pub font: Arc<FontVec>,
    /// The face itself is bold; no synthetic emboldening needed
    pub native_bold: bool,
    /// The face itself is italic or oblique; no synthetic slant needed
    pub native_italic: bool,
}

impl fmt::Debug for FaceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceMatch")
            .field("native_bold", &self.native_bold)
            .field("native_italic", &self.native_italic)
            .finish_non_exhaustive()
    }
}

/// Font lookup service used by the text renderer
pub trait FontProvider: Send + Sync {
    /// Find a face for `family`, preferring one with the requested style.
    /// `None` means nothing usable was found.
    fn resolve(&self, family: &str, bold: bool, italic: bool) -> Option<FaceMatch>;
}

struct FontEntry {
    path: PathBuf,
    bold: bool,
    italic: bool,
    face: OnceLock<Option<Arc<FontVec>>>,
}

impl FontEntry {
    fn new(path: PathBuf, bold: bool, italic: bool) -> Self {
        Self {
            path,
            bold,
            italic,
            face: OnceLock::new(),
        }
    }

    fn face(&self) -> Option<Arc<FontVec>> {
        self.face
            .get_or_init(|| match load_face(&self.path) {
                Ok(font) => {
                    debug!("Loaded font face {}", self.path.display());
                    Some(Arc::new(font))
                }
                Err(message) => {
                    warn!("Skipping font {}: {}", self.path.display(), message);
                    None
                }
            })
            .clone()
    }
}

fn load_face(path: &Path) -> std::result::Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(data).map_err(|e| e.to_string())
}

/// Directory-backed font index
#[derive(Default)]
pub struct FontLibrary {
    families: BTreeMap<String, Vec<FontEntry>>,
}

impl FontLibrary {
    /// A library with no faces; every lookup falls back to the built-in face
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index every font file below the given directories. Missing
    /// directories are skipped.
    pub fn scan<P: AsRef<Path>>(directories: &[P]) -> Self {
        let mut library = Self::empty();
        for directory in directories {
            let directory = directory.as_ref();
            if !directory.is_dir() {
                continue;
            }
            for entry in WalkDir::new(directory)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
            {
                library.register(entry.path());
            }
        }
        debug!("Indexed {} font families", library.families.len());
        library
    }

    pub fn from_config(config: &FontConfig) -> Self {
        Self::scan(&config.directories)
    }

    /// Add a single font file to the index. Returns false for files that are
    /// not `.ttf`/`.otf`.
    pub fn register(&mut self, path: &Path) -> bool {
        let is_font = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf"))
            .unwrap_or(false);
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return false;
        };
        if !is_font {
            return false;
        }

        let (family, bold, italic) = parse_font_stem(stem);
        if family.is_empty() {
            return false;
        }
        self.families
            .entry(family)
            .or_default()
            .push(FontEntry::new(path.to_path_buf(), bold, italic));
        true
    }

    /// Normalized family keys known to the library
    pub fn families(&self) -> Vec<String> {
        self.families.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl FontProvider for FontLibrary {
    fn resolve(&self, family: &str, bold: bool, italic: bool) -> Option<FaceMatch> {
        let entries = self.families.get(&family_key(family))?;

        // Exact style first, then the regular face, then anything loadable
        let mut candidates: Vec<&FontEntry> = Vec::with_capacity(entries.len());
        candidates.extend(entries.iter().filter(|e| e.bold == bold && e.italic == italic));
        candidates.extend(entries.iter().filter(|e| !e.bold && !e.italic));
        candidates.extend(entries.iter());

        candidates.into_iter().find_map(|entry| {
            entry.face().map(|font| FaceMatch {
                font,
                native_bold: bold && entry.bold,
                native_italic: italic && entry.italic,
            })
        })
    }
}

impl fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontLibrary")
            .field("families", &self.families.len())
            .finish()
    }
}

const STYLE_WORDS: [&str; 5] = ["regular", "bold", "italic", "oblique", "book"];

/// Lowercase alphanumerics only: "Times New Roman" and "times-new-roman" match
fn family_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Split a file stem like `DejaVuSans-BoldOblique` into family key and style
fn parse_font_stem(stem: &str) -> (String, bool, bool) {
    let lower = stem.to_ascii_lowercase();
    let bold = lower.contains("bold");
    let italic = lower.contains("italic") || lower.contains("oblique");

    // Style words only count after the family part, i.e. after a separator
    let family_part = match lower.find(['-', '_']) {
        Some(index) => &lower[..index],
        None => {
            let mut end = lower.len();
            for word in STYLE_WORDS {
                if let Some(index) = lower.rfind(word) {
                    if index > 0 {
                        end = end.min(index);
                    }
                }
            }
            &lower[..end]
        }
    };
    let mut key = family_key(family_part);
    // A stem that is nothing but a style word, e.g. "-Bold"
    if key.is_empty() {
        key = family_key(&lower);
    }
    (key, bold, italic)
}

/// Built-in 5×7 bitmap face used whenever no font file resolves
pub mod builtin {
    /// Glyph cell width in font units, including one unit of spacing
    pub const CELL_WIDTH: u32 = 6;
    pub const GLYPH_WIDTH: u32 = 5;
    pub const GLYPH_HEIGHT: u32 = 7;

    /// Columns for printable ASCII `0x20..=0x7E`; bit 0 is the top row
    const GLYPHS: [[u8; 5]; 95] = [
        [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
        [0x00, 0x00, 0x5F, 0x00, 0x00], // !
        [0x00, 0x07, 0x00, 0x07, 0x00], // "
        [0x14, 0x7F, 0x14, 0x7F, 0x14], // #
        [0x24, 0x2A, 0x7F, 0x2A, 0x12], // $
        [0x23, 0x13, 0x08, 0x64, 0x62], // %
        [0x36, 0x49, 0x55, 0x22, 0x50], // &
        [0x00, 0x05, 0x03, 0x00, 0x00], // '
        [0x00, 0x1C, 0x22, 0x41, 0x00], // (
        [0x00, 0x41, 0x22, 0x1C, 0x00], // )
        [0x14, 0x08, 0x3E, 0x08, 0x14], // *
        [0x08, 0x08, 0x3E, 0x08, 0x08], // +
        [0x00, 0x50, 0x30, 0x00, 0x00], // ,
        [0x08, 0x08, 0x08, 0x08, 0x08], // -
        [0x00, 0x60, 0x60, 0x00, 0x00], // .
        [0x20, 0x10, 0x08, 0x04, 0x02], // /
        [0x3E, 0x51, 0x49, 0x45, 0x3E], // 0
        [0x00, 0x42, 0x7F, 0x40, 0x00], // 1
        [0x42, 0x61, 0x51, 0x49, 0x46], // 2
        [0x21, 0x41, 0x45, 0x4B, 0x31], // 3
        [0x18, 0x14, 0x12, 0x7F, 0x10], // 4
        [0x27, 0x45, 0x45, 0x45, 0x39], // 5
        [0x3C, 0x4A, 0x49, 0x49, 0x30], // 6
        [0x01, 0x71, 0x09, 0x05, 0x03], // 7
        [0x36, 0x49, 0x49, 0x49, 0x36], // 8
        [0x06, 0x49, 0x49, 0x29, 0x1E], // 9
        [0x00, 0x36, 0x36, 0x00, 0x00], // :
        [0x00, 0x56, 0x36, 0x00, 0x00], // ;
        [0x08, 0x14, 0x22, 0x41, 0x00], // <
        [0x14, 0x14, 0x14, 0x14, 0x14], // =
        [0x00, 0x41, 0x22, 0x14, 0x08], // >
        [0x02, 0x01, 0x51, 0x09, 0x06], // ?
        [0x32, 0x49, 0x79, 0x41, 0x3E], // @
        [0x7E, 0x11, 0x11, 0x11, 0x7E], // A
        [0x7F, 0x49, 0x49, 0x49, 0x36], // B
        [0x3E, 0x41, 0x41, 0x41, 0x22], // C
        [0x7F, 0x41, 0x41, 0x22, 0x1C], // D
        [0x7F, 0x49, 0x49, 0x49, 0x41], // E
        [0x7F, 0x09, 0x09, 0x09, 0x01], // F
        [0x3E, 0x41, 0x49, 0x49, 0x7A], // G
        [0x7F, 0x08, 0x08, 0x08, 0x7F], // H
        [0x00, 0x41, 0x7F, 0x41, 0x00], // I
        [0x20, 0x40, 0x41, 0x3F, 0x01], // J
        [0x7F, 0x08, 0x14, 0x22, 0x41], // K
        [0x7F, 0x40, 0x40, 0x40, 0x40], // L
        [0x7F, 0x02, 0x0C, 0x02, 0x7F], // M
        [0x7F, 0x04, 0x08, 0x10, 0x7F], // N
        [0x3E, 0x41, 0x41, 0x41, 0x3E], // O
        [0x7F, 0x09, 0x09, 0x09, 0x06], // P
        [0x3E, 0x41, 0x51, 0x21, 0x5E], // Q
        [0x7F, 0x09, 0x19, 0x29, 0x46], // R
        [0x46, 0x49, 0x49, 0x49, 0x31], // S
        [0x01, 0x01, 0x7F, 0x01, 0x01], // T
        [0x3F, 0x40, 0x40, 0x40, 0x3F], // U
        [0x1F, 0x20, 0x40, 0x20, 0x1F], // V
        [0x3F, 0x40, 0x38, 0x40, 0x3F], // W
        [0x63, 0x14, 0x08, 0x14, 0x63], // X
        [0x07, 0x08, 0x70, 0x08, 0x07], // Y
        [0x61, 0x51, 0x49, 0x45, 0x43], // Z
        [0x00, 0x7F, 0x41, 0x41, 0x00], // [
        [0x02, 0x04, 0x08, 0x10, 0x20], // backslash
        [0x00, 0x41, 0x41, 0x7F, 0x00], // ]
        [0x04, 0x02, 0x01, 0x02, 0x04], // ^
        [0x40, 0x40, 0x40, 0x40, 0x40], // _
        [0x00, 0x01, 0x02, 0x04, 0x00], // `
        [0x20, 0x54, 0x54, 0x54, 0x78], // a
        [0x7F, 0x48, 0x44, 0x44, 0x38], // b
        [0x38, 0x44, 0x44, 0x44, 0x20], // c
        [0x38, 0x44, 0x44, 0x48, 0x7F], // d
        [0x38, 0x54, 0x54, 0x54, 0x18], // e
        [0x08, 0x7E, 0x09, 0x01, 0x02], // f
        [0x0C, 0x52, 0x52, 0x52, 0x3E], // g
        [0x7F, 0x08, 0x04, 0x04, 0x78], // h
        [0x00, 0x44, 0x7D, 0x40, 0x00], // i
        [0x20, 0x40, 0x44, 0x3D, 0x00], // j
        [0x7F, 0x10, 0x28, 0x44, 0x00], // k
        [0x00, 0x41, 0x7F, 0x40, 0x00], // l
        [0x7C, 0x04, 0x18, 0x04, 0x78], // m
        [0x7C, 0x08, 0x04, 0x04, 0x78], // n
        [0x38, 0x44, 0x44, 0x44, 0x38], // o
        [0x7C, 0x14, 0x14, 0x14, 0x08], // p
        [0x08, 0x14, 0x14, 0x18, 0x7C], // q
        [0x7C, 0x08, 0x04, 0x04, 0x08], // r
        [0x48, 0x54, 0x54, 0x54, 0x20], // s
        [0x04, 0x3F, 0x44, 0x40, 0x20], // t
        [0x3C, 0x40, 0x40, 0x20, 0x7C], // u
        [0x1C, 0x20, 0x40, 0x20, 0x1C], // v
        [0x3C, 0x40, 0x30, 0x40, 0x3C], // w
        [0x44, 0x28, 0x10, 0x28, 0x44], // x
        [0x0C, 0x50, 0x50, 0x50, 0x3C], // y
        [0x44, 0x64, 0x54, 0x4C, 0x44], // z
        [0x00, 0x08, 0x36, 0x41, 0x00], // {
        [0x00, 0x00, 0x7F, 0x00, 0x00], // |
        [0x00, 0x41, 0x36, 0x08, 0x00], // }
        [0x10, 0x08, 0x08, 0x10, 0x08], // ~
    ];

    /// Hollow box drawn for anything outside printable ASCII
    const MISSING: [u8; 5] = [0x7F, 0x41, 0x41, 0x41, 0x7F];

    /// Column bitmap for a character
    pub fn glyph(c: char) -> [u8; 5] {
        match c {
            ' '..='~' => GLYPHS[c as usize - 0x20],
            _ => MISSING,
        }
    }

    /// Whether the font-unit cell `(col, row)` of `c` is inked
    pub fn is_set(c: char, col: u32, row: u32) -> bool {
        col < GLYPH_WIDTH && row < GLYPH_HEIGHT && glyph(c)[col as usize] & (1 << row) != 0
    }

    /// Pixels per font unit for a requested pixel size
    pub fn unit_scale(font_size_px: u32) -> u32 {
        ((font_size_px as f32 / 8.0).round() as u32).max(1)
    }

    /// Text box in pixels for `chars` glyphs at the given unit scale
    pub fn text_size(chars: usize, scale: u32) -> (u32, u32) {
        if chars == 0 {
            return (0, 0);
        }
        let width = chars as u32 * CELL_WIDTH * scale - (CELL_WIDTH - GLYPH_WIDTH) * scale;
        (width, GLYPH_HEIGHT * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_font_stem() {
        assert_eq!(parse_font_stem("DejaVuSans-BoldOblique"), ("dejavusans".to_string(), true, true));
        assert_eq!(parse_font_stem("Roboto-Regular"), ("roboto".to_string(), false, false));
        assert_eq!(parse_font_stem("LiberationSerif_Italic"), ("liberationserif".to_string(), false, true));
        assert_eq!(parse_font_stem("ArialBold"), ("arial".to_string(), true, false));
        assert_eq!(parse_font_stem("Times New Roman"), ("timesnewroman".to_string(), false, false));
        assert_eq!(parse_font_stem("Bold"), ("bold".to_string(), true, false));
    }

    #[test]
    fn test_family_key() {
        assert_eq!(family_key("Times New Roman"), "timesnewroman");
        assert_eq!(family_key("dejavu-sans"), "dejavusans");
    }

    #[test]
    fn test_empty_library_resolves_nothing() {
        let library = FontLibrary::empty();
        assert!(library.is_empty());
        assert!(library.resolve("Arial", false, false).is_none());
    }

    #[test]
    fn test_scan_indexes_font_files_only() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("truetype").join("demo");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Demo-Regular.ttf"), b"not a font").unwrap();
        std::fs::write(nested.join("Demo-Bold.otf"), b"not a font").unwrap();
        std::fs::write(nested.join("README.txt"), b"text").unwrap();

        let library = FontLibrary::scan(&[dir.path().to_path_buf(), dir.path().join("missing")]);
        assert_eq!(library.families(), vec!["demo".to_string()]);

        // Unparseable faces degrade to "not found" instead of failing
        assert!(library.resolve("Demo", true, false).is_none());
    }

    #[test]
    fn test_builtin_glyphs() {
        assert!(builtin::is_set('I', 2, 0));
        assert!(!builtin::is_set(' ', 2, 3));
        assert!(!builtin::is_set('A', 5, 0));
        // Non-ASCII renders as a hollow box
        assert!(builtin::is_set('é', 0, 0));
        assert!(builtin::is_set('é', 4, 6));
        assert!(!builtin::is_set('é', 2, 3));
    }

    #[test]
    fn test_builtin_metrics() {
        assert_eq!(builtin::unit_scale(40), 5);
        assert_eq!(builtin::unit_scale(1), 1);
        assert_eq!(builtin::text_size(6, 5), (175, 35));
        assert_eq!(builtin::text_size(0, 5), (0, 0));
    }
}
