use crate::foundation::error::{SketchError, SketchResult};

pub use kurbo::Rect;

/// Pixel dimensions of a render environment or raster surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Largest edge accepted for a surface (the raster backend addresses pixels with `u16`).
    pub const MAX_EDGE: u32 = u16::MAX as u32;

    /// Create a validated size with both edges in `1..=MAX_EDGE`.
    pub fn new(width: u32, height: u32) -> SketchResult<Self> {
        if width == 0 || height == 0 {
            return Err(SketchError::validation(format!(
                "surface size must be non-zero, got {width}x{height}"
            )));
        }
        if width > Self::MAX_EDGE || height > Self::MAX_EDGE {
            return Err(SketchError::validation(format!(
                "surface size {width}x{height} exceeds {max}x{max}",
                max = Self::MAX_EDGE
            )));
        }
        Ok(Self { width, height })
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_len(self) -> usize {
        self.pixel_count() * 4
    }

    pub fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn premultiplied(self) -> [u8; 4] {
        let a = u16::from(self.a);
        let mul = |c: u8| ((u16::from(c) * a + 127) / 255) as u8;
        [mul(self.r), mul(self.g), mul(self.b), self.a]
    }

    /// Parse a CSS color: hex (`#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`), `rgb()`/`rgba()`,
    /// `transparent` or one of the common named colors.
    pub fn parse_css(input: &str) -> SketchResult<Self> {
        let s = input.trim().to_ascii_lowercase();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| invalid_color(input));
        }
        if let Some(args) = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_rgb_fn(args).ok_or_else(|| invalid_color(input));
        }
        named_color(&s).ok_or_else(|| invalid_color(input))
    }

    /// Format as an SVG paint (`rgb(..)`) plus a separate opacity in `0..=1`.
    pub fn to_svg_paint(self) -> (String, f32) {
        (
            format!("rgb({},{},{})", self.r, self.g, self.b),
            f32::from(self.a) / 255.0,
        )
    }
}

fn invalid_color(input: &str) -> SketchError {
    SketchError::validation(format!("invalid color '{input}'"))
}

fn parse_hex(hex: &str) -> Option<Rgba8> {
    let nibble = |c: u8| (c as char).to_digit(16).map(|v| v as u8);
    let bytes = hex.as_bytes();
    match bytes.len() {
        3 | 4 => {
            let mut out = [255u8; 4];
            for (i, &c) in bytes.iter().enumerate() {
                let v = nibble(c)?;
                out[i] = v * 17;
            }
            Some(Rgba8::new(out[0], out[1], out[2], out[3]))
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for (i, pair) in bytes.chunks_exact(2).enumerate() {
                out[i] = nibble(pair[0])? * 16 + nibble(pair[1])?;
            }
            Some(Rgba8::new(out[0], out[1], out[2], out[3]))
        }
        _ => None,
    }
}

fn parse_rgb_fn(args: &str) -> Option<Rgba8> {
    let parts: Vec<&str> = args
        .split([',', ' ', '/'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |p: &str| -> Option<u8> {
        if let Some(pct) = p.strip_suffix('%') {
            let v: f32 = pct.parse().ok()?;
            return Some((v.clamp(0.0, 100.0) * 2.55).round() as u8);
        }
        let v: f32 = p.parse().ok()?;
        Some(v.clamp(0.0, 255.0).round() as u8)
    };
    let alpha = |p: &str| -> Option<u8> {
        if let Some(pct) = p.strip_suffix('%') {
            let v: f32 = pct.parse().ok()?;
            return Some((v.clamp(0.0, 100.0) * 2.55).round() as u8);
        }
        let v: f32 = p.parse().ok()?;
        Some((v.clamp(0.0, 1.0) * 255.0).round() as u8)
    };

    let a = match parts.get(3) {
        Some(p) => alpha(p)?,
        None => 255,
    };
    Some(Rgba8::new(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        a,
    ))
}

fn named_color(name: &str) -> Option<Rgba8> {
    let c = match name {
        "transparent" => Rgba8::TRANSPARENT,
        "black" => Rgba8::BLACK,
        "white" => Rgba8::WHITE,
        "red" => Rgba8::opaque(255, 0, 0),
        "green" => Rgba8::opaque(0, 128, 0),
        "lime" => Rgba8::opaque(0, 255, 0),
        "blue" => Rgba8::opaque(0, 0, 255),
        "yellow" => Rgba8::opaque(255, 255, 0),
        "cyan" | "aqua" => Rgba8::opaque(0, 255, 255),
        "magenta" | "fuchsia" => Rgba8::opaque(255, 0, 255),
        "gray" | "grey" => Rgba8::opaque(128, 128, 128),
        "silver" => Rgba8::opaque(192, 192, 192),
        "maroon" => Rgba8::opaque(128, 0, 0),
        "navy" => Rgba8::opaque(0, 0, 128),
        "olive" => Rgba8::opaque(128, 128, 0),
        "purple" => Rgba8::opaque(128, 0, 128),
        "teal" => Rgba8::opaque(0, 128, 128),
        "orange" => Rgba8::opaque(255, 165, 0),
        "pink" => Rgba8::opaque(255, 192, 203),
        "brown" => Rgba8::opaque(165, 42, 42),
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_rejects_zero_and_oversized_edges() {
        assert!(Size::new(0, 10).is_err());
        assert!(Size::new(10, 0).is_err());
        assert!(Size::new(Size::MAX_EDGE + 1, 1).is_err());
        let s = Size::new(3, 2).unwrap();
        assert_eq!(s.byte_len(), 24);
    }

    #[test]
    fn parse_css_hex_forms() {
        assert_eq!(Rgba8::parse_css("#f00").unwrap(), Rgba8::opaque(255, 0, 0));
        assert_eq!(
            Rgba8::parse_css("#0000FF50").unwrap(),
            Rgba8::new(0, 0, 255, 0x50)
        );
        assert_eq!(
            Rgba8::parse_css("#ffffff").unwrap(),
            Rgba8::WHITE
        );
        assert!(Rgba8::parse_css("#12345").is_err());
    }

    #[test]
    fn parse_css_functional_and_named() {
        assert_eq!(
            Rgba8::parse_css("rgba(10, 20, 30, 0.5)").unwrap(),
            Rgba8::new(10, 20, 30, 128)
        );
        assert_eq!(
            Rgba8::parse_css("rgb(100%, 0%, 0%)").unwrap(),
            Rgba8::opaque(255, 0, 0)
        );
        assert_eq!(Rgba8::parse_css(" Gray ").unwrap(), Rgba8::opaque(128, 128, 128));
        assert!(Rgba8::parse_css("not-a-color").is_err());
    }

    #[test]
    fn premultiplied_scales_channels() {
        assert_eq!(Rgba8::new(255, 128, 0, 128).premultiplied(), [128, 64, 0, 128]);
        assert_eq!(Rgba8::WHITE.premultiplied(), [255, 255, 255, 255]);
    }
}
