use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::{
    effects::blur::{MAX_BLUR_RADIUS, blur_in_place},
    foundation::error::{SketchError, SketchResult},
    render::raster::RasterContext,
};

/// Signature of a pixel effect: rewrite the raster through its drawing context.
pub type PixelFn = dyn Fn(&mut RasterContext<'_>, &Value) -> SketchResult<()> + Send + Sync;

/// A function applied directly to the raster after a forced compose.
#[derive(Clone)]
pub struct PixelEffect {
    pub id: String,
    pub args: Value,
    func: Arc<PixelFn>,
}

impl fmt::Debug for PixelEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelEffect")
            .field("id", &self.id)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl PixelEffect {
    pub fn new<F>(id: impl Into<String>, args: Value, func: F) -> Self
    where
        F: Fn(&mut RasterContext<'_>, &Value) -> SketchResult<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            args,
            func: Arc::new(func),
        }
    }

    /// Resolve one of the built-in effects by name (`invert`, `grayscale`, `noise`, `hue`,
    /// `blur`). Arguments are validated here, before anything is queued.
    pub fn builtin(id: impl Into<String>, name: &str, args: Value) -> SketchResult<Self> {
        let name = name.trim().to_ascii_lowercase();
        let effect = match name.as_str() {
            "invert" => Self::new(id, args, |ctx, _| {
                invert(ctx);
                Ok(())
            }),
            "grayscale" | "greyscale" => Self::new(id, args, |ctx, _| {
                grayscale(ctx);
                Ok(())
            }),
            "hue" => Self::new(id, args, |ctx, _| hue_shift(ctx)),
            "noise" => {
                let strength = arg_f64(&args, "strength", 0, 10.0)?;
                if !(0.0..=255.0).contains(&strength) {
                    return Err(SketchError::validation("noise.strength must be in 0..=255"));
                }
                let seed = arg_f64(&args, "seed", 1, 0.0)? as u64;
                Self::new(id, args, move |ctx, _| noise(ctx, strength, seed))
            }
            "blur" => {
                let radius = arg_f64(&args, "radius_px", 0, 2.0)?;
                if !(0.0..=f64::from(MAX_BLUR_RADIUS)).contains(&radius) {
                    return Err(SketchError::validation(format!(
                        "blur.radius_px must be in 0..={MAX_BLUR_RADIUS}"
                    )));
                }
                let radius = radius.round() as u32;
                let sigma = arg_f64(&args, "sigma", 1, f64::from(radius.max(1)) / 2.0)? as f32;
                Self::new(id, args, move |ctx, _| {
                    let size = ctx.size();
                    blur_in_place(ctx.pixels_mut(), size, radius, sigma)
                })
            }
            other => {
                return Err(SketchError::validation(format!(
                    "unknown pixel effect '{other}'"
                )));
            }
        };
        Ok(effect)
    }

    pub fn apply(&self, ctx: &mut RasterContext<'_>) -> SketchResult<()> {
        (self.func)(ctx, &self.args)
    }
}

/// Numeric argument by key (object args) or by position (array args).
fn arg_f64(args: &Value, key: &str, index: usize, default: f64) -> SketchResult<f64> {
    let v = match args {
        Value::Null => None,
        Value::Object(map) => map.get(key),
        Value::Array(items) => items.get(index),
        _ => {
            return Err(SketchError::validation(
                "pixel effect args must be null, an object or an array",
            ));
        }
    };
    match v {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| SketchError::validation(format!("pixel effect arg '{key}' must be a number"))),
    }
}

/// Invert color channels; alpha is kept. Operates on premultiplied data (`c' = a - c`).
pub fn invert(ctx: &mut RasterContext<'_>) {
    for px in ctx.pixels_mut().chunks_exact_mut(4) {
        let a = px[3];
        px[0] = a.saturating_sub(px[0]);
        px[1] = a.saturating_sub(px[1]);
        px[2] = a.saturating_sub(px[2]);
    }
}

/// Rec. 601 luma.
pub fn grayscale(ctx: &mut RasterContext<'_>) {
    for px in ctx.pixels_mut().chunks_exact_mut(4) {
        let y = (299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]) + 500)
            / 1000;
        let y = y.min(u32::from(px[3])) as u8;
        px[0] = y;
        px[1] = y;
        px[2] = y;
    }
}

/// Cheap channel-mixing hue rotation approximation.
pub fn hue_shift(ctx: &mut RasterContext<'_>) -> SketchResult<()> {
    let mut data = ctx.get_image_data();
    for px in data.chunks_exact_mut(4) {
        let (r, g, b) = (f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
        px[0] = (r * 0.8 + g * 0.2).round().clamp(0.0, 255.0) as u8;
        px[1] = (g * 0.7 + b * 0.3).round().clamp(0.0, 255.0) as u8;
        px[2] = (b * 0.6 + r * 0.4).round().clamp(0.0, 255.0) as u8;
    }
    ctx.put_image_data(&data)
}

/// Add deterministic luminance noise: one offset in `[-strength/2, strength/2)` per pixel,
/// shared by the three color channels.
pub fn noise(ctx: &mut RasterContext<'_>, strength: f64, seed: u64) -> SketchResult<()> {
    let mut data = ctx.get_image_data();
    for (i, px) in data.chunks_exact_mut(4).enumerate() {
        let h = mix64(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let unit = (h >> 11) as f64 / (1u64 << 53) as f64;
        let delta = (unit - 0.5) * strength;
        for c in px.iter_mut().take(3) {
            *c = (f64::from(*c) + delta).round().clamp(0.0, 255.0) as u8;
        }
    }
    ctx.put_image_data(&data)
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        foundation::core::{Rgba8, Size},
        render::raster::RasterSurface,
    };

    fn surface(color: Rgba8) -> RasterSurface {
        RasterSurface::new(Size::new(4, 4).unwrap(), Some(color)).unwrap()
    }

    #[test]
    fn invert_turns_white_black_and_keeps_alpha() {
        let mut s = surface(Rgba8::WHITE);
        PixelEffect::builtin("inv", "invert", Value::Null)
            .unwrap()
            .apply(&mut s.context())
            .unwrap();
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 255]));

        let mut s = surface(Rgba8::TRANSPARENT);
        invert(&mut s.context());
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let mut s = surface(Rgba8::opaque(255, 0, 0));
        grayscale(&mut s.context());
        assert_eq!(s.pixel(1, 1), Some([76, 76, 76, 255]));
    }

    #[test]
    fn noise_is_deterministic_per_seed() {
        let gray = Rgba8::opaque(128, 128, 128);
        let run = |seed: u64| {
            let mut s = surface(gray);
            noise(&mut s.context(), 40.0, seed).unwrap();
            s.data().to_vec()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
        assert!(run(7).chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn noise_shifts_channels_together_within_half_strength() {
        let mut s = surface(Rgba8::opaque(128, 128, 128));
        noise(&mut s.context(), 40.0, 3).unwrap();
        for px in s.data().chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert!((108..=148).contains(&px[0]), "channel was {}", px[0]);
        }
    }

    #[test]
    fn builtin_validates_names_and_args() {
        assert!(PixelEffect::builtin("x", "sparkle", Value::Null).is_err());
        assert!(PixelEffect::builtin("x", "noise", json!({"strength": 999})).is_err());
        assert!(PixelEffect::builtin("x", "blur", json!({"radius_px": "big"})).is_err());
        assert!(PixelEffect::builtin("x", "noise", json!([25, 3])).is_ok());
        assert!(PixelEffect::builtin("x", "blur", json!({"radius_px": 3})).is_ok());
    }

    #[test]
    fn custom_effect_receives_args() {
        let effect = PixelEffect::new("fill", json!({"level": 9}), |ctx, args| {
            let level = args["level"].as_u64().unwrap_or(0) as u8;
            for px in ctx.pixels_mut().chunks_exact_mut(4) {
                px.copy_from_slice(&[level, level, level, 255]);
            }
            Ok(())
        });
        let mut s = surface(Rgba8::TRANSPARENT);
        effect.apply(&mut s.context()).unwrap();
        assert_eq!(s.pixel(3, 3), Some([9, 9, 9, 255]));
    }
}
