use std::sync::Arc;

use crate::{
    foundation::{
        core::Size,
        error::{SketchError, SketchResult},
    },
    markup::tree::MarkupTree,
    render::{
        compose::compose_markup,
        export::{encode_png, encode_png_data_uri},
        fonts::FontBook,
        raster::{RasterContext, RasterSurface},
    },
    settings::RenderSettings,
    store::BlobStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvState {
    Unallocated,
    Active,
    /// Terminal.
    Cleared,
}

struct Layers {
    markup: MarkupTree,
    raster: RasterSurface,
}

/// Markup and raster layers of one render cycle.
///
/// Created unallocated, sized by [`RenderEnv::allocate`], released by
/// [`RenderEnv::teardown`]. After teardown every layer access fails with
/// [`SketchError::EnvironmentCleared`].
pub struct RenderEnv {
    state: EnvState,
    layers: Option<Layers>,
    fonts: Arc<FontBook>,
    store: Option<Arc<dyn BlobStore>>,
}

impl std::fmt::Debug for RenderEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEnv")
            .field("state", &self.state)
            .field("size", &self.layers.as_ref().map(|l| l.raster.size()))
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl RenderEnv {
    pub fn new(fonts: Arc<FontBook>, store: Option<Arc<dyn BlobStore>>) -> Self {
        Self {
            state: EnvState::Unallocated,
            layers: None,
            fonts,
            store,
        }
    }

    /// Create the markup root and a raster surface of `width x height`.
    pub fn allocate(
        &mut self,
        width: u32,
        height: u32,
        settings: &RenderSettings,
    ) -> SketchResult<()> {
        match self.state {
            EnvState::Cleared => return Err(SketchError::EnvironmentCleared),
            EnvState::Active => {
                return Err(SketchError::validation(
                    "render environment is already allocated",
                ));
            }
            EnvState::Unallocated => {}
        }
        let size = Size::new(width, height)?;
        let raster = RasterSurface::new(size, settings.clear_rgba)?;
        self.layers = Some(Layers {
            markup: MarkupTree::new(),
            raster,
        });
        self.state = EnvState::Active;
        tracing::debug!(width, height, "render environment allocated");
        Ok(())
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn store(&self) -> Option<&Arc<dyn BlobStore>> {
        self.store.as_ref()
    }

    fn layers(&self) -> SketchResult<&Layers> {
        match (self.state, self.layers.as_ref()) {
            (EnvState::Cleared, _) => Err(SketchError::EnvironmentCleared),
            (_, Some(layers)) => Ok(layers),
            (_, None) => Err(SketchError::render("render environment is not allocated")),
        }
    }

    fn layers_mut(&mut self) -> SketchResult<&mut Layers> {
        match (self.state, self.layers.as_mut()) {
            (EnvState::Cleared, _) => Err(SketchError::EnvironmentCleared),
            (_, Some(layers)) => Ok(layers),
            (_, None) => Err(SketchError::render("render environment is not allocated")),
        }
    }

    pub fn size(&self) -> SketchResult<Size> {
        Ok(self.layers()?.raster.size())
    }

    pub fn markup(&self) -> SketchResult<&MarkupTree> {
        Ok(&self.layers()?.markup)
    }

    pub fn markup_mut(&mut self) -> SketchResult<&mut MarkupTree> {
        Ok(&mut self.layers_mut()?.markup)
    }

    pub fn raster(&self) -> SketchResult<&RasterSurface> {
        Ok(&self.layers()?.raster)
    }

    pub fn context(&mut self) -> SketchResult<RasterContext<'_>> {
        Ok(self.layers_mut()?.raster.context())
    }

    /// Rasterize pending markup over the raster. Returns the number of nodes painted.
    #[tracing::instrument(skip(self))]
    pub fn compose(&mut self) -> SketchResult<usize> {
        let fonts = Arc::clone(&self.fonts);
        let layers = self.layers_mut()?;
        let painted = compose_markup(&mut layers.markup, &mut layers.raster, &fonts)?;
        tracing::debug!(painted, "composed markup");
        Ok(painted)
    }

    /// PNG bytes of the raster as it is now. Pending markup is not composed.
    pub fn export_png(&self) -> SketchResult<Vec<u8>> {
        encode_png(&self.layers()?.raster)
    }

    pub fn export_data_uri(&self) -> SketchResult<String> {
        encode_png_data_uri(&self.layers()?.raster)
    }

    /// Release both layers. Repeated calls are no-ops.
    pub fn teardown(&mut self) {
        if self.state != EnvState::Cleared {
            self.layers = None;
            self.state = EnvState::Cleared;
            tracing::debug!("render environment torn down");
        }
    }
}
