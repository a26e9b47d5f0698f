use std::sync::Arc;

use crate::{
    foundation::error::{SketchError, SketchResult},
    markup::style::StyleMap,
};

/// Deepest wrapper nesting accepted under the root. The rasterizer recurses per SVG group.
pub const MAX_WRAP_DEPTH: usize = 64;

/// Arena index of a markup node. Issued once per tree and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Root,
    Text(String),
    Image { src: String, data: Arc<[u8]> },
    Wrap,
}

#[derive(Clone, Debug)]
pub struct MarkupNode {
    pub key: String,
    pub kind: NodeKind,
    pub style: StyleMap,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    composed: bool,
}

impl MarkupNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node's own paint has already been rasterized.
    pub fn is_composed(&self) -> bool {
        self.composed
    }
}

/// Markup layer: a tree of styleable, content-bearing nodes.
#[derive(Clone, Debug)]
pub struct MarkupTree {
    nodes: Vec<MarkupNode>,
}

impl Default for MarkupTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![MarkupNode {
                key: "root".to_string(),
                kind: NodeKind::Root,
                style: StyleMap::new(),
                parent: None,
                children: Vec::new(),
                composed: true,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> SketchResult<&MarkupNode> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| SketchError::render(format!("unknown markup node {id:?}")))
    }

    fn node_mut(&mut self, id: NodeId) -> SketchResult<&mut MarkupNode> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| SketchError::render(format!("unknown markup node {id:?}")))
    }

    pub fn children(&self, id: NodeId) -> SketchResult<&[NodeId]> {
        Ok(self.node(id)?.children())
    }

    /// Create a detached node. It becomes visible once appended under the root.
    pub fn create(&mut self, key: impl Into<String>, kind: NodeKind, style: StyleMap) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(MarkupNode {
            key: key.into(),
            kind,
            style,
            parent: None,
            children: Vec::new(),
            composed: false,
        });
        id
    }

    /// Append `child` as the last child of `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> SketchResult<()> {
        if child == self.root() {
            return Err(SketchError::render("the markup root cannot be reparented"));
        }
        self.node(child)?;
        if self.is_ancestor_or_self(child, parent)? {
            return Err(SketchError::render(format!(
                "appending {child:?} under {parent:?} would create a cycle"
            )));
        }
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> SketchResult<()> {
        if let Some(parent) = self.node_mut(id)?.parent.take() {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, mut id: NodeId) -> SketchResult<bool> {
        loop {
            if id == candidate {
                return Ok(true);
            }
            match self.node(id)?.parent {
                Some(p) => id = p,
                None => return Ok(false),
            }
        }
    }

    /// Move every current root child except `wrapper` under `wrapper`, then make `wrapper` the
    /// sole root child.
    ///
    /// Fails with a validation error once [`MAX_WRAP_DEPTH`] wrappers are already nested.
    pub fn wrap_root_children(&mut self, wrapper: NodeId) -> SketchResult<()> {
        let root = self.root();
        let depth = self.wrap_depth();
        if depth >= MAX_WRAP_DEPTH {
            return Err(SketchError::validation(format!(
                "wrap effects nest at most {MAX_WRAP_DEPTH} levels deep"
            )));
        }
        let snapshot: Vec<NodeId> = self
            .children(root)?
            .iter()
            .copied()
            .filter(|c| *c != wrapper)
            .collect();
        for child in snapshot {
            self.append_child(wrapper, child)?;
        }
        self.append_child(root, wrapper)
    }

    /// First attached node with `key`, in document order.
    pub fn find(&self, key: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|id| self.nodes[id.index()].key == key)
    }

    /// All attached descendants of `id` in document (pre-)order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(id.index()) {
            Some(n) => n.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.index()].children.iter().rev().copied());
        }
        out
    }

    /// Number of nodes attached under the root.
    pub fn attached_len(&self) -> usize {
        self.descendants(self.root()).len()
    }

    /// Largest number of wrapper nodes on any path below the root.
    pub fn wrap_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(NodeId, usize)> = self.nodes[0]
            .children
            .iter()
            .map(|c| (*c, 0))
            .collect();
        while let Some((id, above)) = stack.pop() {
            let node = &self.nodes[id.index()];
            let here = above + usize::from(node.kind == NodeKind::Wrap);
            deepest = deepest.max(here);
            stack.extend(node.children.iter().map(|c| (*c, here)));
        }
        deepest
    }

    /// Whether `id` or any of its descendants still needs rasterizing.
    pub fn has_pending(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(next.index()) else {
                continue;
            };
            if !node.composed {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }

    pub fn mark_all_composed(&mut self) {
        for id in self.descendants(self.root()) {
            self.nodes[id.index()].composed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(tree: &mut MarkupTree, key: &str) -> NodeId {
        tree.create(key, NodeKind::Text(String::new()), StyleMap::new())
    }

    #[test]
    fn append_preserves_order() {
        let mut tree = MarkupTree::new();
        let root = tree.root();
        let a = text(&mut tree, "a");
        let b = text(&mut tree, "b");
        tree.append_child(root, a).unwrap();
        tree.append_child(root, b).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[a, b]);
        assert_eq!(tree.find("b"), Some(b));
    }

    #[test]
    fn wrapping_twice_nests() {
        let mut tree = MarkupTree::new();
        let root = tree.root();
        let a = text(&mut tree, "a");
        tree.append_child(root, a).unwrap();

        let w1 = tree.create("w1", NodeKind::Wrap, StyleMap::new());
        tree.wrap_root_children(w1).unwrap();
        let w2 = tree.create("w2", NodeKind::Wrap, StyleMap::new());
        tree.wrap_root_children(w2).unwrap();

        assert_eq!(tree.children(root).unwrap(), &[w2]);
        assert_eq!(tree.children(w2).unwrap(), &[w1]);
        assert_eq!(tree.children(w1).unwrap(), &[a]);
        assert_eq!(tree.node(a).unwrap().parent(), Some(w1));
    }

    #[test]
    fn wrapping_an_empty_root_yields_a_lone_wrapper() {
        let mut tree = MarkupTree::new();
        let w = tree.create("w", NodeKind::Wrap, StyleMap::new());
        tree.wrap_root_children(w).unwrap();
        assert_eq!(tree.children(tree.root()).unwrap(), &[w]);
        assert!(tree.children(w).unwrap().is_empty());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = MarkupTree::new();
        let root = tree.root();
        let w = tree.create("w", NodeKind::Wrap, StyleMap::new());
        let inner = tree.create("inner", NodeKind::Wrap, StyleMap::new());
        tree.append_child(root, w).unwrap();
        tree.append_child(w, inner).unwrap();
        assert!(tree.append_child(inner, w).is_err());
        assert!(tree.append_child(w, root).is_err());
    }

    #[test]
    fn pending_tracking_follows_descendants() {
        let mut tree = MarkupTree::new();
        let root = tree.root();
        let a = text(&mut tree, "a");
        tree.append_child(root, a).unwrap();
        assert!(tree.has_pending(root));
        tree.mark_all_composed();
        assert!(!tree.has_pending(root));

        let b = text(&mut tree, "b");
        tree.append_child(root, b).unwrap();
        assert!(tree.has_pending(root));
        assert!(!tree.has_pending(a));
    }

    #[test]
    fn wrap_nesting_stops_at_limit() {
        let mut tree = MarkupTree::new();
        let root = tree.root();
        let a = text(&mut tree, "a");
        tree.append_child(root, a).unwrap();
        for i in 0..MAX_WRAP_DEPTH {
            let w = tree.create(format!("w{i}"), NodeKind::Wrap, StyleMap::new());
            tree.wrap_root_children(w).unwrap();
        }
        assert_eq!(tree.wrap_depth(), MAX_WRAP_DEPTH);

        let extra = tree.create("extra", NodeKind::Wrap, StyleMap::new());
        assert!(matches!(
            tree.wrap_root_children(extra),
            Err(SketchError::Validation(_))
        ));
        assert_eq!(tree.wrap_depth(), MAX_WRAP_DEPTH);
        assert!(tree.has_pending(root));
    }
}
