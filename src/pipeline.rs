//! Composition pipeline: recorded operations replayed against a fresh render environment.
//!
//! Every `add_*` call only queues a step. [`Pipeline::render`] allocates a new
//! [`RenderEnv`] and runs the queue in order; the environment stays inspectable (and
//! exportable) until the next render or [`Pipeline::clear`].

use std::sync::Arc;

use futures::{FutureExt as _, future};

use crate::{
    chain::{Chain, StepFuture, StepHandle},
    effects::pixel::PixelEffect,
    foundation::{
        core::Size,
        error::{SketchError, SketchResult},
    },
    markup::{style::StyleMap, tree::NodeKind},
    model::{ContentKind, ContentNode, WrapEffect},
    render::{env::RenderEnv, fonts::FontBook},
    settings::RenderSettings,
    store::BlobStore,
};

/// A pipeline that other pipelines can nest. The parent locks it while rendering it.
pub type SharedPipeline = Arc<futures::lock::Mutex<Pipeline>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Building,
    Rendered,
    Cleared,
}

pub struct Pipeline {
    chain: Chain<RenderEnv>,
    env: Option<RenderEnv>,
    settings: RenderSettings,
    fonts: Arc<FontBook>,
    store: Option<Arc<dyn BlobStore>>,
    state: PipelineState,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("steps", &self.chain.len())
            .field("env", &self.env)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_settings(RenderSettings::default())
    }

    pub fn with_settings(settings: RenderSettings) -> Self {
        let fonts = Arc::new(FontBook::new(&settings));
        Self {
            chain: Chain::new(),
            env: None,
            settings,
            fonts,
            store: None,
            state: PipelineState::Building,
        }
    }

    /// Blob store used by image elements.
    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Empty pipeline sharing this one's settings, font database and blob store.
    pub fn sibling(&self) -> Self {
        Self {
            chain: Chain::new(),
            env: None,
            settings: self.settings.clone(),
            fonts: Arc::clone(&self.fonts),
            store: self.store.clone(),
            state: PipelineState::Building,
        }
    }

    pub fn into_shared(self) -> SharedPipeline {
        Arc::new(futures::lock::Mutex::new(self))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Environment of the last render, if it has not been cleared.
    pub fn env(&self) -> Option<&RenderEnv> {
        self.env.as_ref()
    }

    pub fn env_mut(&mut self) -> Option<&mut RenderEnv> {
        self.env.as_mut()
    }

    fn push<F>(&mut self, step: F) -> StepHandle
    where
        F: for<'a> Fn(&'a mut RenderEnv) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.state = PipelineState::Building;
        self.chain.append(step)
    }

    /// Queue a content node appended as the last child of the markup root.
    pub fn add_element(&mut self, node: ContentNode) -> SketchResult<StepHandle> {
        node.validate()?;
        let node = Arc::new(node);
        Ok(self.push(move |env: &mut RenderEnv| {
            let node = Arc::clone(&node);
            async move { insert_element(env, &node).await }.boxed()
        }))
    }

    /// Queue a wrapper around everything present at the root when the step runs.
    pub fn add_wrap_effect(&mut self, effect: WrapEffect) -> SketchResult<StepHandle> {
        let style = effect.style()?;
        let key = effect.id;
        Ok(self.push(move |env: &mut RenderEnv| {
            future::ready(wrap_root(env, &key, &style)).boxed()
        }))
    }

    /// Queue a compose followed by `effect` on the raster.
    pub fn add_pixel_effect(&mut self, effect: PixelEffect) -> StepHandle {
        self.push(move |env: &mut RenderEnv| {
            future::ready(apply_pixel_effect(env, &effect)).boxed()
        })
    }

    /// Queue rendering `child` at `width x height` and overlaying it at the origin.
    ///
    /// The parent is composed first, so its pending markup lands beneath the child. The
    /// child is never cleared by the parent.
    pub fn add_nested_pipeline(
        &mut self,
        child: SharedPipeline,
        width: u32,
        height: u32,
    ) -> SketchResult<StepHandle> {
        Size::new(width, height)?;
        Ok(self.push(move |env: &mut RenderEnv| {
            let child = Arc::clone(&child);
            async move { overlay_nested(env, &child, width, height).await }.boxed()
        }))
    }

    /// Queue an explicit compose.
    pub fn add_compose(&mut self) -> StepHandle {
        self.push(|env: &mut RenderEnv| future::ready(env.compose().map(|_| ())).boxed())
    }

    /// Queue an arbitrary step against the environment.
    pub fn add_step<F>(&mut self, step: F) -> StepHandle
    where
        F: for<'a> Fn(&'a mut RenderEnv) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.push(step)
    }

    pub fn remove_operation(&mut self, handle: StepHandle) -> bool {
        self.chain.remove(handle)
    }

    /// Allocate a fresh environment and run every queued operation against it.
    ///
    /// A previous environment is torn down first. If a step fails the partial environment
    /// is kept for inspection and the failure is returned.
    #[tracing::instrument(skip(self))]
    pub async fn render(&mut self, width: u32, height: u32) -> SketchResult<()> {
        if let Some(mut previous) = self.env.take() {
            previous.teardown();
        }
        let mut env = RenderEnv::new(Arc::clone(&self.fonts), self.store.clone());
        env.allocate(width, height, &self.settings)?;
        let env = self.env.insert(env);
        self.state = PipelineState::Rendered;
        self.chain.run(env).await
    }

    /// Compose the current environment. No-op without one.
    pub fn compose(&mut self) -> SketchResult<()> {
        if let Some(env) = self.env.as_mut() {
            env.compose()?;
        }
        Ok(())
    }

    pub fn export_png(&self) -> SketchResult<Option<Vec<u8>>> {
        self.env.as_ref().map(RenderEnv::export_png).transpose()
    }

    pub fn export_data_uri(&self) -> SketchResult<Option<String>> {
        self.env.as_ref().map(RenderEnv::export_data_uri).transpose()
    }

    /// Tear down the environment and drop every queued operation. Idempotent.
    pub fn clear(&mut self) {
        if let Some(mut env) = self.env.take() {
            env.teardown();
        }
        self.chain.clear();
        self.state = PipelineState::Cleared;
    }
}

async fn insert_element(env: &mut RenderEnv, node: &ContentNode) -> SketchResult<()> {
    let kind = match node.kind {
        ContentKind::Text => NodeKind::Text(node.content.clone()),
        ContentKind::Image => {
            let src = node.src.clone().ok_or_else(|| {
                SketchError::validation(format!("image element '{}' has no src", node.id))
            })?;
            let store = env.store().cloned().ok_or_else(|| {
                SketchError::resource(format!(
                    "element '{}' needs a blob store to load '{src}'",
                    node.id
                ))
            })?;
            let data = store.load(&src).await?;
            image::guess_format(&data).map_err(|e| {
                SketchError::resource(format!("blob '{src}' is not a supported image: {e}"))
            })?;
            NodeKind::Image {
                src,
                data: data.into(),
            }
        }
    };

    let markup = env.markup_mut()?;
    if markup.find(&node.id).is_some() {
        tracing::warn!(id = %node.id, "duplicate element id, keeping both nodes");
    }
    let id = markup.create(node.id.clone(), kind, node.style.clone());
    let root = markup.root();
    markup.append_child(root, id)
}

fn wrap_root(env: &mut RenderEnv, key: &str, declared: &StyleMap) -> SketchResult<()> {
    let size = env.size()?;
    let mut style = declared.clone();
    style.insert("position", "absolute")?;
    style.insert("left", "0")?;
    style.insert("top", "0")?;
    style.insert("width", &format!("{}px", size.width))?;
    style.insert("height", &format!("{}px", size.height))?;

    let markup = env.markup_mut()?;
    let wrapper = markup.create(key, NodeKind::Wrap, style);
    markup.wrap_root_children(wrapper)
}

fn apply_pixel_effect(env: &mut RenderEnv, effect: &PixelEffect) -> SketchResult<()> {
    env.compose()?;
    let mut ctx = env.context()?;
    tracing::debug!(effect = %effect.id, "applying pixel effect");
    effect.apply(&mut ctx)
}

async fn overlay_nested(
    env: &mut RenderEnv,
    child: &SharedPipeline,
    width: u32,
    height: u32,
) -> SketchResult<()> {
    let mut child = child.lock().await;
    child.render(width, height).await?;
    child.compose()?;
    env.compose()?;

    let child_env = child
        .env()
        .ok_or_else(|| SketchError::render("nested pipeline has no environment after render"))?;
    env.context()?.draw_surface(child_env.raster()?, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;

    fn quiet() -> Pipeline {
        Pipeline::with_settings(RenderSettings {
            load_system_fonts: false,
            ..RenderSettings::default()
        })
    }

    fn root_keys(p: &Pipeline) -> Vec<String> {
        let markup = p.env().unwrap().markup().unwrap();
        markup
            .children(markup.root())
            .unwrap()
            .iter()
            .map(|id| markup.node(*id).unwrap().key.clone())
            .collect()
    }

    #[tokio::test]
    async fn elements_become_root_children_in_order() {
        let mut p = quiet();
        for key in ["a", "b", "c"] {
            p.add_element(ContentNode::text(key, key)).unwrap();
        }
        p.render(10, 10).await.unwrap();
        assert_eq!(root_keys(&p), vec!["a", "b", "c"]);
        assert_eq!(p.state(), PipelineState::Rendered);
    }

    #[tokio::test]
    async fn wrap_effects_nest_in_queue_order() {
        let mut p = quiet();
        p.add_element(ContentNode::text("a", "")).unwrap();
        p.add_element(ContentNode::text("b", "")).unwrap();
        p.add_wrap_effect(WrapEffect::new("e1", "opacity: 0.5")).unwrap();
        p.add_wrap_effect(WrapEffect::new("e2", "filter: blur(1px)")).unwrap();
        p.render(16, 8).await.unwrap();

        let markup = p.env().unwrap().markup().unwrap();
        let root = markup.children(markup.root()).unwrap();
        assert_eq!(root.len(), 1);
        let e2 = markup.node(root[0]).unwrap();
        assert_eq!(e2.key, "e2");
        assert_eq!(e2.style.get("width"), Some("16px"));
        assert_eq!(e2.children().len(), 1);
        let e1 = markup.node(e2.children()[0]).unwrap();
        assert_eq!(e1.key, "e1");
        let keys: Vec<_> = e1
            .children()
            .iter()
            .map(|id| markup.node(*id).unwrap().key.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn removed_operations_do_not_run() {
        let mut p = quiet();
        p.add_element(ContentNode::text("a", "")).unwrap();
        let b = p.add_element(ContentNode::text("b", "")).unwrap();
        p.add_element(ContentNode::text("c", "")).unwrap();
        assert!(p.remove_operation(b));
        assert!(!p.remove_operation(b));
        p.render(4, 4).await.unwrap();
        assert_eq!(root_keys(&p), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn rerender_starts_from_fresh_environment() {
        let mut p = quiet();
        p.add_element(ContentNode::text("a", "")).unwrap();
        p.render(4, 4).await.unwrap();
        p.render(4, 4).await.unwrap();
        assert_eq!(root_keys(&p), vec!["a"]);
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_makes_calls_noops() {
        let mut p = quiet();
        p.add_element(ContentNode::text("a", "")).unwrap();
        p.render(4, 4).await.unwrap();
        p.clear();
        p.clear();
        assert_eq!(p.state(), PipelineState::Cleared);
        assert!(p.env().is_none());
        assert!(p.is_empty());
        p.compose().unwrap();
        assert_eq!(p.export_png().unwrap(), None);
        assert_eq!(p.export_data_uri().unwrap(), None);

        p.add_element(ContentNode::text("b", "")).unwrap();
        assert_eq!(p.state(), PipelineState::Building);
    }

    #[tokio::test]
    async fn failing_step_keeps_partial_environment() {
        let mut p = quiet();
        p.add_element(ContentNode::text("a", "")).unwrap();
        let failing = p.add_element(ContentNode::image("img", "missing.png")).unwrap();
        p.add_element(ContentNode::text("c", "")).unwrap();

        let err = p.render(4, 4).await.unwrap_err();
        match &err {
            SketchError::Step { handle, .. } => assert_eq!(*handle, failing),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), SketchError::Resource(_)));
        assert_eq!(root_keys(&p), vec!["a"]);
    }

    #[tokio::test]
    async fn invalid_inputs_are_rejected_when_queued() {
        let mut p = quiet();
        assert!(p.add_element(ContentNode::text("", "x")).is_err());
        assert!(p.add_wrap_effect(WrapEffect::new("w", "no colon here")).is_err());
        assert!(p.add_nested_pipeline(quiet().into_shared(), 0, 5).is_err());
        assert!(p.is_empty());
        assert!(matches!(
            p.render(0, 4).await,
            Err(SketchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_ids_keep_both_nodes() {
        let mut p = quiet();
        p.add_element(ContentNode::text("same", "")).unwrap();
        p.add_element(ContentNode::text("same", "")).unwrap();
        p.render(4, 4).await.unwrap();
        assert_eq!(root_keys(&p), vec!["same", "same"]);
    }

    #[tokio::test]
    async fn image_elements_load_from_store() {
        let png = {
            let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]));
            let mut buf = Vec::new();
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };
        let store = MemoryBlobStore::new()
            .with_blob("green.png", png)
            .unwrap()
            .with_blob("notes.txt", "hello")
            .unwrap();
        let mut p = quiet().with_store(Arc::new(store));
        p.add_element(ContentNode::image("img", "green.png")).unwrap();
        p.add_compose();
        p.render(4, 4).await.unwrap();
        assert_eq!(
            p.env().unwrap().raster().unwrap().pixel(2, 2),
            Some([0, 255, 0, 255])
        );

        let mut bad = p.sibling();
        bad.add_element(ContentNode::image("txt", "notes.txt")).unwrap();
        let err = bad.render(4, 4).await.unwrap_err();
        assert!(matches!(err.root_cause(), SketchError::Resource(_)));
    }

    #[tokio::test]
    async fn wrap_values_with_ampersands_compose() {
        let mut p = quiet();
        p.add_element(ContentNode::text("bg", "").with_style("background", "red").unwrap())
            .unwrap();
        p.add_wrap_effect(WrapEffect::new("fx", "filter: url(#a&b)")).unwrap();
        p.render(4, 4).await.unwrap();
        p.compose().unwrap();
    }

    #[tokio::test]
    async fn wrap_effects_past_depth_limit_fail_the_step() {
        use crate::markup::tree::MAX_WRAP_DEPTH;

        let mut p = quiet();
        p.add_element(ContentNode::text("bg", "").with_style("background", "blue").unwrap())
            .unwrap();
        for i in 0..MAX_WRAP_DEPTH {
            p.add_wrap_effect(WrapEffect::new(format!("w{i}"), "opacity: 1"))
                .unwrap();
        }
        p.render(4, 4).await.unwrap();
        p.compose().unwrap();
        assert_eq!(
            p.env().unwrap().raster().unwrap().pixel(1, 1),
            Some([0, 0, 255, 255])
        );

        let extra = p.add_wrap_effect(WrapEffect::new("extra", "opacity: 1")).unwrap();
        let err = p.render(4, 4).await.unwrap_err();
        match &err {
            SketchError::Step { handle, .. } => assert_eq!(*handle, extra),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), SketchError::Validation(_)));
    }

    #[tokio::test]
    async fn percentage_opacity_composes() {
        let mut p = quiet();
        p.add_element(
            ContentNode::text("bg", "")
                .with_declarations("background: black; opacity: 50%")
                .unwrap(),
        )
        .unwrap();
        p.render(4, 4).await.unwrap();
        p.compose().unwrap();
        let a = p.env().unwrap().raster().unwrap().pixel(1, 1).unwrap()[3];
        assert!((120..=135).contains(&a), "alpha was {a}");
    }
}
