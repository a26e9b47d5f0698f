use crate::foundation::{
    core::Size,
    error::{SketchError, SketchResult},
};

/// Largest blur radius accepted from documents and effect arguments.
pub const MAX_BLUR_RADIUS: u32 = 256;

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Gaussian-blur a premultiplied RGBA8 buffer in place. Samples past the edges clamp.
pub fn blur_in_place(pixels: &mut [u8], size: Size, radius: u32, sigma: f32) -> SketchResult<()> {
    if pixels.len() != size.byte_len() {
        return Err(SketchError::render(
            "blur expects a buffer matching width*height*4",
        ));
    }
    if radius > MAX_BLUR_RADIUS {
        return Err(SketchError::validation(format!(
            "blur radius must be <= {MAX_BLUR_RADIUS}"
        )));
    }
    if radius == 0 {
        return Ok(());
    }

    let kernel = kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; pixels.len()];
    convolve(pixels, &mut tmp, size, &kernel, Axis::Horizontal);
    convolve(&tmp, pixels, size, &kernel, Axis::Vertical);
    Ok(())
}

/// Normalized gaussian weights in Q16 fixed point, summing to exactly `1 << 16`.
fn kernel_q16(radius: u32, sigma: f32) -> SketchResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(SketchError::validation("blur sigma must be > 0"));
    }

    let r = radius as i64;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let raw: Vec<f64> = (-r..=r)
        .map(|i| (-((i * i) as f64) / denom).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 {
        return Err(SketchError::render("gaussian kernel sum is zero"));
    }

    const ONE: i64 = 1 << 16;
    let mut weights: Vec<u32> = raw
        .iter()
        .map(|w| ((w / sum) * ONE as f64).round().clamp(0.0, ONE as f64) as u32)
        .collect();
    let total: i64 = weights.iter().map(|w| i64::from(*w)).sum();
    let mid = weights.len() / 2;
    weights[mid] = (i64::from(weights[mid]) + ONE - total).clamp(0, ONE) as u32;
    Ok(weights)
}

fn convolve(src: &[u8], dst: &mut [u8], size: Size, kernel: &[u32], axis: Axis) {
    let w = size.width as i64;
    let h = size.height as i64;
    let radius = (kernel.len() / 2) as i64;

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (k, &weight) in kernel.iter().enumerate() {
                let offset = k as i64 - radius;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + offset).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + offset).clamp(0, h - 1)),
                };
                let si = ((sy * w + sx) as usize) * 4;
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += u64::from(weight) * u64::from(src[si + c]);
                }
            }
            let di = ((y * w + x) as usize) * 4;
            for (c, a) in acc.iter().enumerate() {
                dst[di + c] = ((a + 32_768) >> 16).min(255) as u8;
            }
        }
    }
}
