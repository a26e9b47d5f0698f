use std::{
    path::Path,
    sync::{Arc, OnceLock},
};

use crate::settings::RenderSettings;

/// Lazily built font database used to rasterize text in the markup layer.
///
/// Building the database (especially scanning system fonts) is expensive, so it happens on
/// the first compose that needs it and is then shared by every environment holding this book.
pub struct FontBook {
    load_system_fonts: bool,
    font_dirs: Vec<std::path::PathBuf>,
    db: OnceLock<Arc<usvg::fontdb::Database>>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("load_system_fonts", &self.load_system_fonts)
            .field("font_dirs", &self.font_dirs)
            .field("loaded", &self.db.get().is_some())
            .finish()
    }
}

impl FontBook {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            load_system_fonts: settings.load_system_fonts,
            font_dirs: settings.font_dirs.clone(),
            db: OnceLock::new(),
        }
    }

    pub fn database(&self) -> Arc<usvg::fontdb::Database> {
        self.db
            .get_or_init(|| {
                let mut db = usvg::fontdb::Database::new();
                if self.load_system_fonts {
                    db.load_system_fonts();
                }
                for dir in &self.font_dirs {
                    load_fonts_from_dir(&mut db, dir);
                }
                tracing::debug!(faces = db.len(), "font database ready");
                Arc::new(db)
            })
            .clone()
    }
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "font directory is not readable");
        return;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        if let Err(e) = db.load_font_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to load font file");
        }
    }
}
