//! Sketchpad composes layered cards: queue markup elements, card-level wrap effects, raster
//! pixel effects and nested pipelines, then render them into a fresh environment and export
//! the result as PNG.
//!
//! - Build a [`Pipeline`] (or load a [`Document`] from JSON)
//! - [`Pipeline::render`] at a size, then [`Pipeline::compose`]
//! - Export with [`Pipeline::export_png`] or [`Pipeline::export_data_uri`]
#![forbid(unsafe_code)]

mod foundation;

/// Ordered async step list.
pub mod chain;
/// Raster effects.
pub mod effects;
/// Markup layer: style maps, node tree, SVG translation.
pub mod markup;
/// Serializable pipeline documents.
pub mod model;
/// Composition pipeline.
pub mod pipeline;
/// Render environment, compositing and export.
pub mod render;
pub mod settings;
pub mod store;

pub use crate::foundation::core::{Rect, Rgba8, Size};
pub use crate::foundation::error::{SketchError, SketchResult};

pub use crate::chain::{Chain, StepFuture, StepHandle};
pub use crate::effects::pixel::PixelEffect;
pub use crate::markup::style::StyleMap;
pub use crate::model::{ContentKind, ContentNode, Document, PixelEffectSpec, WrapEffect};
pub use crate::pipeline::{Pipeline, PipelineState, SharedPipeline};
pub use crate::render::env::{EnvState, RenderEnv};
pub use crate::render::raster::{RasterContext, RasterSurface};
pub use crate::settings::RenderSettings;
pub use crate::store::{BlobStore, FsBlobStore, MemoryBlobStore};
