//! Image loading for embedded pictures.
//!
//! References are resolved against the directory of the input JSON, decoded
//! with the `image` crate and, for SVG sources, rasterized with `resvg`
//! through a scoped temporary PNG first. Display size is derived from the
//! decoded pixel height only.

use std::cell::OnceCell;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::io::Reader as ImageReader;
use image::{DynamicImage, ImageOutputFormat};
use log::debug;
use path_clean::PathClean;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{fontdb, Options, Tree};

use crate::error::{Error, Result};
use crate::layout::inches_to_emu;

/// Images shorter than this (in pixels) are treated as inline glyph-sized art.
pub const SMALL_IMAGE_THRESHOLD: u32 = 60;
const SMALL_IMAGE_SCALE: f64 = 0.7;
const LARGE_IMAGE_SCALE: f64 = 0.5;
const POINTS_PER_INCH: f64 = 72.0;
const JPEG_QUALITY: u8 = 90;

/// Display height in inches for an image `pixel_height` pixels tall.
///
/// The scale does not depend on whether the image sits inside an options
/// block; `_in_options` only matters for [`is_standalone`].
pub fn display_height_inches(pixel_height: u32, _in_options: bool) -> f64 {
    let scale = if pixel_height < SMALL_IMAGE_THRESHOLD {
        SMALL_IMAGE_SCALE
    } else {
        LARGE_IMAGE_SCALE
    };
    f64::from(pixel_height) * scale / POINTS_PER_INCH
}

/// Large images outside options get a line of their own.
pub fn is_standalone(pixel_height: u32, in_options: bool) -> bool {
    !in_options && pixel_height >= SMALL_IMAGE_THRESHOLD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Png,
    Jpeg,
}

impl MediaFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Png => "png",
            MediaFormat::Jpeg => "jpeg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            MediaFormat::Png => "image/png",
            MediaFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Re-encoded image bytes ready to be stored under `word/media/`.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub format: MediaFormat,
    pub data: Vec<u8>,
}

/// A decoded raster image.
#[derive(Debug)]
pub struct LoadedImage {
    path: PathBuf,
    image: DynamicImage,
}

impl LoadedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_standalone(&self, in_options: bool) -> bool {
        is_standalone(self.pixel_height(), in_options)
    }

    /// Display extent `(cx, cy)` in EMU, keeping the aspect ratio.
    pub fn extent_emu(&self, in_options: bool) -> (u64, u64) {
        let height_in = display_height_inches(self.pixel_height(), in_options);
        let width_in = height_in * f64::from(self.pixel_width()) / f64::from(self.pixel_height());
        (inches_to_emu(width_in), inches_to_emu(height_in))
    }

    /// PNG when the image carries alpha, JPEG otherwise.
    pub fn encode(&self) -> Result<EncodedImage> {
        let mut data = Vec::new();
        let format = if self.image.color().has_alpha() {
            self.image
                .write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)
                .map_err(|e| self.load_error(e))?;
            MediaFormat::Png
        } else {
            DynamicImage::ImageRgb8(self.image.to_rgb8())
                .write_to(
                    &mut Cursor::new(&mut data),
                    ImageOutputFormat::Jpeg(JPEG_QUALITY),
                )
                .map_err(|e| self.load_error(e))?;
            MediaFormat::Jpeg
        };
        Ok(EncodedImage { format, data })
    }

    fn load_error(&self, e: impl std::fmt::Display) -> Error {
        Error::ImageLoad {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

/// Resolves and decodes image references found in one input document.
pub struct ImageResolver {
    base_dir: Option<PathBuf>,
    fonts: OnceCell<fontdb::Database>,
}

impl ImageResolver {
    /// Relative references resolve against the directory holding `json_path`.
    pub fn for_input(json_path: &Path) -> Self {
        let base_dir = if json_path.is_file() {
            json_path.parent().map(Path::to_path_buf)
        } else {
            None
        };
        Self::with_base_dir(base_dir)
    }

    pub fn with_base_dir(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            fonts: OnceCell::new(),
        }
    }

    pub fn resolve_path(&self, reference: &str) -> PathBuf {
        let reference = Path::new(reference.trim());
        if reference.is_absolute() {
            return reference.to_path_buf();
        }
        if let Some(base) = &self.base_dir {
            let candidate = base.join(reference).clean();
            if candidate.exists() {
                return candidate;
            }
        }
        reference.to_path_buf()
    }

    pub fn load(&self, reference: &str) -> Result<LoadedImage> {
        let path = self.resolve_path(reference);
        if !path.exists() {
            return Err(Error::ImageLoad {
                path,
                reason: "file does not exist".into(),
            });
        }

        let image = if is_svg(&path) {
            self.load_svg(&path)?
        } else {
            decode_file(&path)?
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(Error::ImageLoad {
                path,
                reason: "image has no pixels".into(),
            });
        }
        debug!("loaded {} ({}x{})", path.display(), image.width(), image.height());
        Ok(LoadedImage { path, image })
    }

    /// Rasterize to a temporary PNG and decode that. The temporary file is
    /// removed when `temp` drops, whichever way this returns.
    fn load_svg(&self, path: &Path) -> Result<DynamicImage> {
        let conversion_error = |reason: String| Error::ImageConversion {
            path: path.to_path_buf(),
            reason,
        };

        let pixmap = self.rasterize(path).map_err(conversion_error)?;
        let temp = tempfile::Builder::new()
            .prefix("json_to_docx-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| conversion_error(e.to_string()))?;
        pixmap
            .save_png(temp.path())
            .map_err(|e| conversion_error(e.to_string()))?;

        decode_file(temp.path()).map_err(|e| match e {
            Error::ImageLoad { reason, .. } => Error::ImageLoad {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Render at the SVG's intrinsic size so pixel heights stay comparable
    /// with raster sources.
    fn rasterize(&self, path: &Path) -> std::result::Result<Pixmap, String> {
        let data = fs::read(path).map_err(|e| e.to_string())?;
        let options = Options {
            resources_dir: path.parent().map(Path::to_path_buf),
            ..Options::default()
        };
        let tree = Tree::from_data(&data, &options, self.fonts())
            .map_err(|e| format!("failed to parse SVG: {e}"))?;

        let size = tree.size().to_int_size();
        let mut pixmap = Pixmap::new(size.width(), size.height())
            .ok_or_else(|| format!("invalid SVG size {}x{}", size.width(), size.height()))?;
        resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());
        Ok(pixmap)
    }

    fn fonts(&self) -> &fontdb::Database {
        self.fonts.get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            db
        })
    }
}

fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

fn decode_file(path: &Path) -> Result<DynamicImage> {
    let load_error = |reason: String| Error::ImageLoad {
        path: path.to_path_buf(),
        reason,
    };
    ImageReader::open(path)
        .map_err(|e| load_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| load_error(e.to_string()))?
        .decode()
        .map_err(|e| load_error(e.to_string()))
}
