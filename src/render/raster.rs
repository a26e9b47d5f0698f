use crate::{
    foundation::{
        core::{Rect, Rgba8, Size},
        error::{SketchError, SketchResult},
    },
    render::composite::{over_in_place, overlay_region, premultiply, unpremultiply},
};

/// Pixel layer of a render environment: premultiplied RGBA8, row-major.
pub struct RasterSurface {
    size: Size,
    pixmap: vello_cpu::Pixmap,
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl RasterSurface {
    pub fn new(size: Size, clear: Option<Rgba8>) -> SketchResult<Self> {
        let (w, h) = pixmap_dims(size)?;
        let mut surface = Self {
            size,
            pixmap: vello_cpu::Pixmap::new(w, h),
        };
        if let Some(color) = clear {
            surface.clear(color);
        }
        Ok(surface)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    /// Premultiplied pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let i = (y as usize * self.size.width as usize + x as usize) * 4;
        let d = self.data();
        Some([d[i], d[i + 1], d[i + 2], d[i + 3]])
    }

    pub fn clear(&mut self, color: Rgba8) {
        let premul = color.premultiplied();
        for px in self.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&premul);
        }
    }

    /// 2D drawing context over this surface.
    pub fn context(&mut self) -> RasterContext<'_> {
        RasterContext { surface: self }
    }
}

fn pixmap_dims(size: Size) -> SketchResult<(u16, u16)> {
    let w: u16 = size
        .width
        .try_into()
        .map_err(|_| SketchError::validation("surface width exceeds u16"))?;
    let h: u16 = size
        .height
        .try_into()
        .map_err(|_| SketchError::validation("surface height exceeds u16"))?;
    Ok((w, h))
}

/// Drawing context handed to pixel effects.
///
/// Direct pixel access is premultiplied; `get_image_data`/`put_image_data` exchange
/// straight-alpha RGBA8 like a browser canvas.
pub struct RasterContext<'a> {
    surface: &'a mut RasterSurface,
}

impl RasterContext<'_> {
    pub fn size(&self) -> Size {
        self.surface.size
    }

    pub fn width(&self) -> u32 {
        self.surface.size.width
    }

    pub fn height(&self) -> u32 {
        self.surface.size.height
    }

    pub fn pixels(&self) -> &[u8] {
        self.surface.data()
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.surface.data_mut()
    }

    pub fn get_image_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.surface.size.byte_len());
        for px in self.surface.data().chunks_exact(4) {
            out.extend_from_slice(&unpremultiply([px[0], px[1], px[2], px[3]]));
        }
        out
    }

    pub fn put_image_data(&mut self, straight_rgba: &[u8]) -> SketchResult<()> {
        if straight_rgba.len() != self.surface.size.byte_len() {
            return Err(SketchError::render(format!(
                "put_image_data expects {} bytes, got {}",
                self.surface.size.byte_len(),
                straight_rgba.len()
            )));
        }
        for (dst, src) in self
            .surface
            .data_mut()
            .chunks_exact_mut(4)
            .zip(straight_rgba.chunks_exact(4))
        {
            dst.copy_from_slice(&premultiply([src[0], src[1], src[2], src[3]]));
        }
        Ok(())
    }

    /// Fill `rect` with `color`, blended over the existing pixels.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba8) -> SketchResult<()> {
        let (w, h) = pixmap_dims(self.surface.size)?;
        let mut layer = vello_cpu::Pixmap::new(w, h);
        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, color.a,
        ));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            rect.x0, rect.y0, rect.x1, rect.y1,
        ));
        ctx.flush();
        ctx.render_to_pixmap(&mut layer);
        over_in_place(self.surface.data_mut(), layer.data_as_u8_slice(), 1.0)
    }

    /// Blend a premultiplied image over the surface with its top-left corner at `(x, y)`.
    pub fn draw_image(&mut self, src: &[u8], src_size: Size, x: i64, y: i64) -> SketchResult<()> {
        let dst_size = self.surface.size;
        overlay_region(self.surface.data_mut(), dst_size, src, src_size, x, y)
    }

    /// Blend another surface over this one at `(x, y)`.
    pub fn draw_surface(&mut self, src: &RasterSurface, x: i64, y: i64) -> SketchResult<()> {
        self.draw_image(src.data(), src.size(), x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_surface_is_transparent_or_cleared() {
        let size = Size::new(2, 2).unwrap();
        let s = RasterSurface::new(size, None).unwrap();
        assert!(s.data().iter().all(|&b| b == 0));

        let s = RasterSurface::new(size, Some(Rgba8::WHITE)).unwrap();
        assert_eq!(s.pixel(1, 1), Some([255, 255, 255, 255]));
        assert_eq!(s.pixel(2, 0), None);
    }

    #[test]
    fn image_data_roundtrip_is_straight_alpha() {
        let size = Size::new(1, 1).unwrap();
        let mut s = RasterSurface::new(size, None).unwrap();
        let mut ctx = s.context();
        ctx.put_image_data(&[200, 100, 0, 255]).unwrap();
        assert_eq!(ctx.get_image_data(), vec![200, 100, 0, 255]);
        assert!(ctx.put_image_data(&[0, 0, 0]).is_err());
    }

    #[test]
    fn fill_rect_covers_only_its_area() {
        let size = Size::new(8, 8).unwrap();
        let mut s = RasterSurface::new(size, Some(Rgba8::BLACK)).unwrap();
        s.context()
            .fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), Rgba8::opaque(255, 0, 0))
            .unwrap();
        assert_eq!(s.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(s.pixel(6, 6), Some([0, 0, 0, 255]));
    }

    #[test]
    fn draw_surface_overlays_at_origin() {
        let mut parent = RasterSurface::new(Size::new(4, 4).unwrap(), Some(Rgba8::WHITE)).unwrap();
        let child =
            RasterSurface::new(Size::new(2, 2).unwrap(), Some(Rgba8::opaque(0, 0, 255))).unwrap();
        parent.context().draw_surface(&child, 0, 0).unwrap();
        assert_eq!(parent.pixel(1, 1), Some([0, 0, 255, 255]));
        assert_eq!(parent.pixel(2, 2), Some([255, 255, 255, 255]));
    }
}
