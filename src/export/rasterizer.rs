use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use log::{debug, info};
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::error::RasterFault;
use super::surface::RenderSurface;

/// Encoded output format.
///
/// JPEG is lossy and honours `quality` (1-100). PNG is lossless; for PNG `quality`
/// only picks the encoder effort (>= 90 compresses harder, lower encodes faster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }
}

/// Opaque background colour, written as `#rrggbb` in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{value}' (expected #rrggbb)"));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const CERTIFICATE_BACKGROUND: Rgb = Rgb::new(0xff, 0xf9, 0xf9);

/// Fidelity profile for one rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterOptions {
    #[serde(default)]
    pub format: RasterFormat,
    pub quality: u8,
    /// Output pixels per CSS pixel.
    pub scale: f32,
    pub background: Rgb,
}

impl RasterOptions {
    /// Profile for a single downloaded certificate: lossless, double resolution.
    pub fn single() -> Self {
        Self {
            format: RasterFormat::Png,
            quality: 100,
            scale: 2.0,
            background: CERTIFICATE_BACKGROUND,
        }
    }

    /// Profile for bulk archives. N certificates multiply both size and time, so bulk
    /// output trades resolution and fidelity for throughput.
    pub fn bulk() -> Self {
        Self {
            format: RasterFormat::Jpeg,
            quality: 82,
            scale: 1.5,
            background: CERTIFICATE_BACKGROUND,
        }
    }
}

/// Converts the document mounted on a surface into encoded image bytes.
pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        surface: &RenderSurface,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterFault>;
}

/// SVG rasterizer backed by resvg.
///
/// Fonts are loaded once at construction, before any certificate is rasterized.
pub struct ResvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl Default for ResvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResvgRasterizer {
    /// Rasterizer with an empty font database; text is not drawn.
    pub fn new() -> Self {
        Self {
            fontdb: Arc::new(usvg::fontdb::Database::new()),
        }
    }

    pub fn with_system_fonts() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        info!("Loaded {} font faces", db.len());
        Self {
            fontdb: Arc::new(db),
        }
    }

    /// Add fonts from a directory on top of whatever is loaded.
    pub fn with_font_dir(mut self, dir: &Path) -> Self {
        Arc::make_mut(&mut self.fontdb).load_fonts_dir(dir);
        self
    }

    fn parse(&self, markup: &str) -> Result<usvg::Tree, RasterFault> {
        let mut options = usvg::Options::default();
        options.fontdb = self.fontdb.clone();
        usvg::Tree::from_str(markup, &options).map_err(|e| RasterFault::Parse(e.to_string()))
    }
}

impl Rasterizer for ResvgRasterizer {
    fn rasterize(
        &self,
        surface: &RenderSurface,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterFault> {
        let document = surface.root().ok_or(RasterFault::NotRendered)?;
        if document.width == 0 || document.height == 0 {
            return Err(RasterFault::ZeroSize {
                width: document.width,
                height: document.height,
            });
        }
        if !options.scale.is_finite() || options.scale <= 0.0 {
            return Err(RasterFault::generic(format!(
                "invalid scale factor {}",
                options.scale
            )));
        }

        let tree = self.parse(&document.markup)?;
        let size = tree.size();
        let width = (size.width() * options.scale).ceil() as u32;
        let height = (size.height() * options.scale).ceil() as u32;
        if width == 0 || height == 0 {
            return Err(RasterFault::ZeroSize { width, height });
        }

        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RasterFault::generic(format!("cannot allocate {width}x{height} pixmap"))
        })?;
        let bg = options.background;
        pixmap.fill(Color::from_rgba8(bg.r, bg.g, bg.b, 255));
        resvg::render(
            &tree,
            Transform::from_scale(options.scale, options.scale),
            &mut pixmap.as_mut(),
        );

        // The background is opaque, so premultiplied RGBA equals straight RGBA here.
        let rgb: Vec<u8> = pixmap
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let bytes = match options.format {
            RasterFormat::Png => encode_png(&rgb, width, height, options.quality)?,
            RasterFormat::Jpeg => encode_jpeg(&rgb, width, height, options.quality)?,
        };
        debug!(
            "Rasterized '{}' to {width}x{height} {:?} ({} bytes)",
            document.label,
            options.format,
            bytes.len()
        );
        Ok(bytes)
    }
}

fn encode_png(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, RasterFault> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(if quality >= 90 {
        png::Compression::Best
    } else {
        png::Compression::Fast
    });
    let mut writer = encoder
        .write_header()
        .map_err(|e| RasterFault::Encode(e.to_string()))?;
    writer
        .write_image_data(rgb)
        .map_err(|e| RasterFault::Encode(e.to_string()))?;
    writer
        .finish()
        .map_err(|e| RasterFault::Encode(e.to_string()))?;
    Ok(out)
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, RasterFault> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| RasterFault::Encode(e.to_string()))?;
    Ok(out)
}
