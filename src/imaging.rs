use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView};

pub const DEFAULT_MAX_WIDTH: u32 = 1000;
pub const DEFAULT_JPEG_QUALITY: u8 = 50;

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
}

/// Splits `data:<mime>;base64,<payload>` into mime and decoded bytes.
/// Bare base64 (no `data:` prefix) is accepted with an unknown mime.
pub fn decode_data_url(input: &str) -> anyhow::Result<(Option<String>, Vec<u8>)> {
    let input = input.trim();
    let (mime, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| anyhow!("data URL has no payload"))?;
            let Some(mime) = header.strip_suffix(";base64") else {
                return Err(anyhow!("only base64 data URLs are supported"));
            };
            (Some(mime.to_string()).filter(|m| !m.is_empty()), payload)
        }
        None => (None, input),
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .context("image payload is not valid base64")?;
    Ok((mime, bytes))
}

/// Target size with the width clamped and the aspect ratio kept.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled.max(1))
}

pub fn normalize_bytes(bytes: &[u8], opts: NormalizeOptions) -> anyhow::Result<NormalizedImage> {
    let img = image::load_from_memory(bytes).context("failed to decode image")?;
    let (w, h) = target_dimensions(img.width(), img.height(), opts.max_width);
    let img = if (w, h) != (img.width(), img.height()) {
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, opts.quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .context("failed to encode jpeg")?;

    Ok(NormalizedImage {
        data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&out)),
        width: rgb.width(),
        height: rgb.height(),
        byte_len: out.len(),
    })
}
