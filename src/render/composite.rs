use crate::foundation::{
    core::Size,
    error::{SketchError, SketchResult},
};

pub type PremulRgba8 = [u8; 4];

/// Source-over of one premultiplied pixel onto another, with an extra `opacity` multiplier.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> SketchResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(SketchError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Blend `src` (sized `src_size`) over `dst` (sized `dst_size`) with its top-left corner at
/// `(x, y)`. Pixels falling outside `dst` are dropped; nothing is scaled.
pub fn overlay_region(
    dst: &mut [u8],
    dst_size: Size,
    src: &[u8],
    src_size: Size,
    x: i64,
    y: i64,
) -> SketchResult<()> {
    if dst.len() != dst_size.byte_len() || src.len() != src_size.byte_len() {
        return Err(SketchError::render(
            "overlay_region expects buffers matching width*height*4",
        ));
    }

    let dw = i64::from(dst_size.width);
    let dh = i64::from(dst_size.height);
    let sw = i64::from(src_size.width);
    let sh = i64::from(src_size.height);

    let x_start = x.max(0);
    let x_end = (x + sw).min(dw);
    let y_start = y.max(0);
    let y_end = (y + sh).min(dh);
    if x_start >= x_end || y_start >= y_end {
        return Ok(());
    }

    for dy in y_start..y_end {
        let sy = dy - y;
        let d_row = (dy * dw) as usize * 4;
        let s_row = (sy * sw) as usize * 4;
        for dx in x_start..x_end {
            let sx = dx - x;
            let di = d_row + dx as usize * 4;
            let si = s_row + sx as usize * 4;
            let out = over(
                [dst[di], dst[di + 1], dst[di + 2], dst[di + 3]],
                [src[si], src[si + 1], src[si + 2], src[si + 3]],
                1.0,
            );
            dst[di..di + 4].copy_from_slice(&out);
        }
    }
    Ok(())
}

/// Convert a premultiplied RGBA8 pixel to straight alpha.
pub fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = u16::from(px[3]);
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let un = |c: u8| (((u16::from(c) * 255) + a / 2) / a).min(255) as u8;
    [un(px[0]), un(px[1]), un(px[2]), px[3]]
}

/// Convert a straight-alpha RGBA8 pixel to premultiplied alpha.
pub fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(px[3]);
    let mul = |c: u8| ((u16::from(c) * a + 127) / 255) as u8;
    [mul(px[0]), mul(px[1]), mul(px[2]), px[3]]
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        let src = [255, 255, 255, 0];
        assert_eq!(over(dst, src, 1.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn overlay_region_clips_to_destination() {
        let dst_size = Size::new(3, 2).unwrap();
        let src_size = Size::new(2, 2).unwrap();
        let mut dst = [0u8, 0, 0, 255].repeat(dst_size.pixel_count());
        let src = [0u8, 0, 255, 255].repeat(src_size.pixel_count());

        overlay_region(&mut dst, dst_size, &src, src_size, 2, 1).unwrap();

        let blue: Vec<usize> = dst
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, px)| px[2] == 255)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(blue, vec![5]);
    }

    #[test]
    fn overlay_region_fully_outside_is_noop() {
        let size = Size::new(2, 2).unwrap();
        let mut dst = vec![7u8; size.byte_len()];
        let src = vec![255u8; size.byte_len()];
        overlay_region(&mut dst, size, &src, size, -5, 0).unwrap();
        assert!(dst.iter().all(|&b| b == 7));
    }

    #[test]
    fn premultiply_roundtrip_for_opaque_and_transparent() {
        assert_eq!(unpremultiply(premultiply([10, 20, 30, 255])), [10, 20, 30, 255]);
        assert_eq!(unpremultiply([5, 5, 5, 0]), [0, 0, 0, 0]);
        assert_eq!(unpremultiply([64, 0, 0, 128]), [128, 0, 0, 128]);
    }
}
