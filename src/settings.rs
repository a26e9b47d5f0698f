use std::path::PathBuf;

use crate::foundation::{
    core::Rgba8,
    error::{SketchError, SketchResult},
};

pub const ENV_CLEAR_RGBA: &str = "SKETCHPAD_CLEAR_RGBA";
pub const ENV_FONT_DIRS: &str = "SKETCHPAD_FONT_DIRS";
pub const ENV_SYSTEM_FONTS: &str = "SKETCHPAD_SYSTEM_FONTS";

/// Configuration shared by every environment a pipeline allocates.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Initial raster color of a fresh environment. `None` leaves it transparent.
    pub clear_rgba: Option<Rgba8>,
    /// Load the host's installed fonts for text in the markup layer.
    pub load_system_fonts: bool,
    /// Extra directories scanned for `.ttf`/`.otf`/`.ttc` files.
    pub font_dirs: Vec<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_rgba: None,
            load_system_fonts: true,
            font_dirs: Vec::new(),
        }
    }
}

impl RenderSettings {
    /// Defaults overridden by `SKETCHPAD_*` environment variables.
    pub fn from_env() -> SketchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SketchResult<Self> {
        let mut settings = Self::default();
        if let Some(v) = lookup(ENV_CLEAR_RGBA) {
            settings.clear_rgba = Some(Rgba8::parse_css(&v).map_err(|e| {
                SketchError::validation(format!("{ENV_CLEAR_RGBA}: {e}"))
            })?);
        }
        if let Some(v) = lookup(ENV_FONT_DIRS) {
            settings.font_dirs = std::env::split_paths(&v)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(v) = lookup(ENV_SYSTEM_FONTS) {
            settings.load_system_fonts = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(SketchError::validation(format!(
                        "{ENV_SYSTEM_FONTS}: expected a boolean, got '{other}'"
                    )));
                }
            };
        }
        Ok(settings)
    }
}
