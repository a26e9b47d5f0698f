use std::sync::Arc;

use serde_json::Value;

use crate::{
    effects::pixel::PixelEffect,
    foundation::{
        core::Size,
        error::{SketchError, SketchResult},
    },
    markup::{style::StyleMap, svg::check_paint},
    pipeline::{Pipeline, SharedPipeline},
    settings::RenderSettings,
    store::{BlobStore, normalize_blob_name},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Textual content; empty text is a plain styled box.
    #[default]
    Text,
    /// Bytes loaded from the blob store under `src` when the step runs.
    Image,
}

/// Element queued by an add-element operation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContentNode {
    pub id: String,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default)]
    pub style: StyleMap,
}

impl ContentNode {
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ContentKind::Text,
            content: content.into(),
            src: None,
            style: StyleMap::new(),
        }
    }

    pub fn image(id: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ContentKind::Image,
            content: String::new(),
            src: Some(src.into()),
            style: StyleMap::new(),
        }
    }

    /// Set one style entry (camelCase or kebab-case key).
    pub fn with_style(mut self, key: &str, value: &str) -> SketchResult<Self> {
        self.style.insert(key, value)?;
        Ok(self)
    }

    pub fn with_declarations(mut self, block: &str) -> SketchResult<Self> {
        self.style.merge(&StyleMap::parse_declarations(block)?);
        Ok(self)
    }

    pub fn validate(&self) -> SketchResult<()> {
        if self.id.trim().is_empty() {
            return Err(SketchError::validation("element id must be non-empty"));
        }
        if self.kind == ContentKind::Image {
            let src = self.src.as_deref().ok_or_else(|| {
                SketchError::validation(format!("image element '{}' has no src", self.id))
            })?;
            normalize_blob_name(src)?;
        }
        check_paint(&self.style)
            .map_err(|e| SketchError::validation(format!("element '{}': {e}", self.id)))
    }
}

/// Card-level effect: a wrapper around everything queued before it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WrapEffect {
    pub id: String,
    /// CSS-like declaration block, e.g. `"opacity: 0.5; filter: blur(1px)"`.
    pub declaration: String,
}

impl WrapEffect {
    pub fn new(id: impl Into<String>, declaration: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            declaration: declaration.into(),
        }
    }

    pub fn style(&self) -> SketchResult<StyleMap> {
        StyleMap::parse_declarations(&self.declaration)
            .and_then(|style| check_paint(&style).map(|()| style))
            .map_err(|e| SketchError::validation(format!("wrap effect '{}': {e}", self.id)))
    }
}

/// Named built-in pixel effect as it appears in documents.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PixelEffectSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl PixelEffectSpec {
    pub fn resolve(&self) -> SketchResult<PixelEffect> {
        PixelEffect::builtin(self.id.clone(), &self.name, self.args.clone())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NestedSpec {
    pub width: u32,
    pub height: u32,
    pub pipeline: PipelineSpec,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Element(ContentNode),
    WrapEffect(WrapEffect),
    PixelEffect(PixelEffectSpec),
    Compose {},
    Nested(NestedSpec),
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub ops: Vec<Operation>,
}

/// A serialized pipeline plus the size it renders at.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    #[serde(flatten)]
    pub pipeline: PipelineSpec,
}

/// Pipeline built from a document, with every nested child it created.
///
/// Children are not cleared by their parent; call [`Built::clear_all`] when done.
pub struct Built {
    pub pipeline: Pipeline,
    pub children: Vec<SharedPipeline>,
}

impl Built {
    pub async fn clear_all(&mut self) {
        for child in &self.children {
            child.lock().await.clear();
        }
        self.pipeline.clear();
    }
}

impl Document {
    pub fn from_json(source: &str) -> SketchResult<Self> {
        let doc: Self = serde_json::from_str(source)
            .map_err(|e| SketchError::validation(format!("invalid pipeline document: {e}")))?;
        Ok(doc)
    }

    pub fn size(&self) -> SketchResult<Size> {
        Size::new(self.width, self.height)
    }

    pub fn validate(&self) -> SketchResult<()> {
        self.size()?;
        self.pipeline.validate()
    }

    pub fn into_pipeline(
        self,
        settings: RenderSettings,
        store: Option<Arc<dyn BlobStore>>,
    ) -> SketchResult<Built> {
        self.validate()?;
        let mut root = Pipeline::with_settings(settings);
        if let Some(store) = store {
            root = root.with_store(store);
        }
        let mut children = Vec::new();
        self.pipeline.populate(&mut root, &mut children)?;
        Ok(Built {
            pipeline: root,
            children,
        })
    }
}

impl PipelineSpec {
    pub fn validate(&self) -> SketchResult<()> {
        for op in &self.ops {
            match op {
                Operation::Element(node) => node.validate()?,
                Operation::WrapEffect(effect) => {
                    effect.style()?;
                }
                Operation::PixelEffect(spec) => {
                    spec.resolve()?;
                }
                Operation::Compose {} => {}
                Operation::Nested(nested) => {
                    Size::new(nested.width, nested.height)?;
                    nested.pipeline.validate()?;
                }
            }
        }
        Ok(())
    }

    fn populate(
        &self,
        pipeline: &mut Pipeline,
        children: &mut Vec<SharedPipeline>,
    ) -> SketchResult<()> {
        for op in &self.ops {
            match op {
                Operation::Element(node) => {
                    pipeline.add_element(node.clone())?;
                }
                Operation::WrapEffect(effect) => {
                    pipeline.add_wrap_effect(effect.clone())?;
                }
                Operation::PixelEffect(spec) => {
                    pipeline.add_pixel_effect(spec.resolve()?);
                }
                Operation::Compose {} => {
                    pipeline.add_compose();
                }
                Operation::Nested(nested) => {
                    let mut child = pipeline.sibling();
                    nested.pipeline.populate(&mut child, children)?;
                    let child = child.into_shared();
                    pipeline.add_nested_pipeline(Arc::clone(&child), nested.width, nested.height)?;
                    children.push(child);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"{
        "width": 100, "height": 100,
        "ops": [
            {"element": {"id": "bg", "content": "", "style": {"backgroundColor": "red"}}},
            {"wrap_effect": {"id": "fx", "declaration": "opacity: 0.5"}},
            {"pixel_effect": {"id": "inv", "name": "invert"}},
            {"compose": {}},
            {"nested": {"width": 50, "height": 50, "pipeline": {"ops": [
                {"element": {"id": "blue", "style": {"background-color": "#0000ff"}}}
            ]}}}
        ]
    }"##;

    #[test]
    fn parses_and_validates_document() {
        let doc = Document::from_json(DOC).unwrap();
        doc.validate().unwrap();
        assert_eq!(doc.pipeline.ops.len(), 5);
        match &doc.pipeline.ops[0] {
            Operation::Element(node) => {
                assert_eq!(node.kind, ContentKind::Text);
                assert_eq!(node.style.get("background-color"), Some("red"));
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(matches!(doc.pipeline.ops[3], Operation::Compose {}));
    }

    #[test]
    fn validation_reports_bad_parts() {
        let mut doc = Document::from_json(DOC).unwrap();
        doc.width = 0;
        assert!(matches!(doc.validate(), Err(SketchError::Validation(_))));

        let bad_effect = PipelineSpec {
            ops: vec![Operation::PixelEffect(PixelEffectSpec {
                id: "x".into(),
                name: "melt".into(),
                args: Value::Null,
            })],
        };
        assert!(bad_effect.validate().is_err());

        let bad_wrap = PipelineSpec {
            ops: vec![Operation::WrapEffect(WrapEffect::new("w", "opacity"))],
        };
        assert!(bad_wrap.validate().is_err());

        let image_without_src = ContentNode {
            src: None,
            ..ContentNode::image("img", "a.png")
        };
        assert!(image_without_src.validate().is_err());
        assert!(ContentNode::image("img", "../etc/passwd").validate().is_err());

        let bad_opacity = ContentNode::text("t", "").with_style("opacity", "mostly").unwrap();
        assert!(bad_opacity.validate().is_err());
        assert!(WrapEffect::new("w", "opacity: 50%").style().is_ok());
        assert!(WrapEffect::new("w", "opacity: dim").style().is_err());
    }

    #[test]
    fn bad_style_values_fail_at_parse() {
        let src = r#"{"width": 1, "height": 1, "ops": [
            {"element": {"id": "x", "style": {"color": "red; background: blue"}}}
        ]}"#;
        assert!(Document::from_json(src).is_err());
    }

    #[test]
    fn into_pipeline_collects_nested_children() {
        let built = Document::from_json(DOC)
            .unwrap()
            .into_pipeline(RenderSettings::default(), None)
            .unwrap();
        assert_eq!(built.pipeline.len(), 5);
        assert_eq!(built.children.len(), 1);
    }

    #[test]
    fn builders_normalize_style_keys() {
        let node = ContentNode::text("t", "hi")
            .with_style("fontSize", "12px")
            .unwrap()
            .with_declarations("color: white; left: 5px")
            .unwrap();
        assert_eq!(
            node.style.to_declarations(),
            "font-size: 12px; color: white; left: 5px;"
        );
    }
}
