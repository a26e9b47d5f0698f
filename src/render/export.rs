use std::io::Cursor;

use anyhow::Context as _;
use base64::Engine as _;

use crate::{
    foundation::error::{SketchError, SketchResult},
    render::{composite::unpremultiply, raster::RasterSurface},
};

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Straight-alpha copy of the surface, suitable for image encoders.
pub fn to_straight_rgba8(surface: &RasterSurface) -> Vec<u8> {
    let mut out = Vec::with_capacity(surface.size().byte_len());
    for px in surface.data().chunks_exact(4) {
        out.extend_from_slice(&unpremultiply([px[0], px[1], px[2], px[3]]));
    }
    out
}

pub fn encode_png(surface: &RasterSurface) -> SketchResult<Vec<u8>> {
    let size = surface.size();
    let img = image::RgbaImage::from_raw(size.width, size.height, to_straight_rgba8(surface))
        .ok_or_else(|| SketchError::render("raster byte length does not match its size"))?;

    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode raster as png")?;
    Ok(buf)
}

pub fn encode_png_data_uri(surface: &RasterSurface) -> SketchResult<String> {
    let png = encode_png(surface)?;
    let mut out = String::from(PNG_DATA_URI_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(&png, &mut out);
    Ok(out)
}
