use std::{
    fmt::{self, Display},
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// `nodeName` shared by text nodes and text fillers.
pub const TEXT_NODE_NAME: &str = "#text";
/// `nodeName` of a structural filler. Never produced by a real DOM.
pub const DOM_FILLER_NAME: &str = "#filler";

/// Cost of inserting or deleting a single text node.
pub const TEXT_NODE_COST: f64 = 1.0;
/// Cost of inserting or deleting a single element node.
pub const ELEMENT_NODE_COST: f64 = 100.0;
/// Discount applied once per tree level, `1/e`.
pub const LEVEL_DAMPING: f64 = 1.0 / std::f64::consts::E;

pub type Attrs = serde_json::Map<String, serde_json::Value>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity token of a node instance, used to key the merge cache.
///
/// Ids are unique per process; two nodes with identical content still get
/// different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placeholder kinds inserted by the merge engine where two trees could not be aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillerKind {
    /// A text node existed here on both sides but its content differs.
    Text,
    /// Structurally incomparable subtrees were here.
    Dom,
}

impl FillerKind {
    pub fn node_name(&self) -> &'static str {
        match self {
            FillerKind::Text => TEXT_NODE_NAME,
            FillerKind::Dom => DOM_FILLER_NAME,
        }
    }
}

/// Serialized shape of a DOM node as found in the corpus.
///
/// Every field is optional so partial records still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attrs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DomRecord>>,
}

impl DomRecord {
    /// Number of levels in this record tree, counting the record itself.
    ///
    /// Walks the tree without recursion, so it is safe on arbitrarily deep input.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];

        while let Some((record, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(
                record
                    .children
                    .iter()
                    .flatten()
                    .map(|child| (child, depth + 1)),
            );
        }

        deepest
    }
}

/// A DOM node, either an element, a text node or a filler placeholder.
///
/// Nodes are immutable once built. The edit weight is computed on first use
/// and cached for the lifetime of the node.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    node_name: Option<SmolStr>,
    tag_name: Option<SmolStr>,
    attrs: Option<Attrs>,
    text: Option<String>,
    children: Vec<Arc<Node>>,
    filler: Option<FillerKind>,
    edit_weight: OnceLock<f64>,
}

impl Node {
    fn with_parts(
        node_name: Option<SmolStr>,
        tag_name: Option<SmolStr>,
        attrs: Option<Attrs>,
        text: Option<String>,
        children: Vec<Arc<Node>>,
        filler: Option<FillerKind>,
    ) -> Self {
        Self {
            id: NodeId::next(),
            node_name,
            tag_name,
            attrs,
            text,
            children,
            filler,
            edit_weight: OnceLock::new(),
        }
    }

    pub fn from_record(record: DomRecord) -> Self {
        let children = record
            .children
            .unwrap_or_default()
            .into_iter()
            .map(|child| Arc::new(Node::from_record(child)))
            .collect();

        Self::with_parts(
            record.node_name,
            record.tag_name,
            record.attrs,
            record.text,
            children,
            None,
        )
    }

    /// Element whose `nodeName` and `tagName` are both `name`.
    pub fn element(name: impl Into<SmolStr>, children: impl IntoIterator<Item = Node>) -> Self {
        let name = name.into();
        Self::with_parts(
            Some(name.clone()),
            Some(name),
            None,
            None,
            children.into_iter().map(Arc::new).collect(),
            None,
        )
    }

    pub fn text_node(text: impl Into<String>) -> Self {
        Self::with_parts(
            Some(TEXT_NODE_NAME.into()),
            None,
            None,
            Some(text.into()),
            Vec::new(),
            None,
        )
    }

    pub fn filler(kind: FillerKind) -> Self {
        Self::with_parts(
            Some(kind.node_name().into()),
            None,
            None,
            None,
            Vec::new(),
            Some(kind),
        )
    }

    pub fn text_filler() -> Self {
        Self::filler(FillerKind::Text)
    }

    pub fn dom_filler() -> Self {
        Self::filler(FillerKind::Dom)
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = Some(attrs);
        self
    }

    /// Copies this node under a fresh id, sharing its children. The edit
    /// weight is recomputed on demand.
    pub fn shallow_copy(&self) -> Self {
        self.copy_with_children(self.children.clone())
    }

    pub(crate) fn copy_with_children(&self, children: Vec<Arc<Node>>) -> Self {
        Self::with_parts(
            self.node_name.clone(),
            self.tag_name.clone(),
            self.attrs.clone(),
            self.text.clone(),
            children,
            self.filler,
        )
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag_name.as_deref()
    }

    pub fn attrs(&self) -> Option<&Attrs> {
        self.attrs.as_ref()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.as_ref()?.get(name)?.as_str()
    }

    pub fn children(&self) -> &[Arc<Node>] {
        &self.children
    }

    pub fn filler_kind(&self) -> Option<FillerKind> {
        self.filler
    }

    pub fn is_filler(&self) -> bool {
        self.filler.is_some()
    }

    /// True for text nodes and text fillers alike.
    pub fn is_text(&self) -> bool {
        self.node_name() == Some(TEXT_NODE_NAME)
    }

    /// Text content of a genuine text node. Fillers and elements yield `None`.
    pub fn text(&self) -> Option<&str> {
        if self.is_text() && !self.is_filler() {
            self.text.as_deref()
        } else {
            None
        }
    }

    /// Cost of inserting or deleting this node together with its subtree.
    pub fn edit_weight(&self) -> f64 {
        *self.edit_weight.get_or_init(|| {
            let base = if self.is_text() {
                TEXT_NODE_COST
            } else {
                ELEMENT_NODE_COST
            };
            let children: f64 = self.children.iter().map(|child| child.edit_weight()).sum();
            base + LEVEL_DAMPING * children
        })
    }

    /// Number of levels in this subtree, counting the node itself.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| child.depth())
            .max()
            .unwrap_or(0)
    }

    /// Pre-order walk over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Selector-like label such as `DIV#main.nav.top`.
    pub fn label(&self) -> String {
        let mut label = self.node_name().unwrap_or("?").to_string();

        if let Some(id) = self.attr("id") {
            label.push('#');
            label.push_str(id);
        }

        if let Some(classes) = self.attr("class") {
            for class in classes.split_whitespace() {
                label.push('.');
                label.push_str(class);
            }
        }

        label
    }

    /// Indented, one node per line rendering of the subtree.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(&mut out, 0);
        out
    }

    fn write_outline(&self, out: &mut String, depth: usize) {
        let line = match (self.filler, self.text()) {
            (Some(FillerKind::Text), _) => format!("{TEXT_NODE_NAME} ~"),
            (_, Some(text)) => format!("{TEXT_NODE_NAME} {text:?}"),
            _ => self.label(),
        };

        out.push_str(&"  ".repeat(depth));
        out.push_str(&line);
        out.push('\n');

        for child in &self.children {
            child.write_outline(out, depth + 1);
        }
    }

    pub fn to_record(&self) -> DomRecord {
        DomRecord {
            node_name: self.node_name.clone(),
            tag_name: self.tag_name.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            children: (!self.children.is_empty())
                .then(|| self.children.iter().map(|child| child.to_record()).collect()),
        }
    }
}

impl From<DomRecord> for Node {
    fn from(record: DomRecord) -> Self {
        Node::from_record(record)
    }
}

impl AsRef<Node> for Node {
    fn as_ref(&self) -> &Node {
        self
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for Node {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DomRecord::deserialize(deserializer).map(Node::from_record)
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev().map(|child| &**child));
        Some(node)
    }
}
