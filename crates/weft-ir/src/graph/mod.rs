//! Clipboard graph (`@webflow/XscpData`) types and the builder that emits
//! them from a parsed tree.

mod builder;
mod ids;
pub(crate) mod passes;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use builder::{
    BuildOptions, BuildOutput, DROPPED_TAGS, GraphBuilder, REMAPPED_TAGS, StyleScope, classify_link,
};
pub use ids::{IdGenerator, encode_class_name, random_prefix, sanitize_id_part, style_id};
pub use passes::{GRID_MARKER_CLASS, SPACING_SCALE, resolve_graph_variables};

/// Document type tag of the clipboard payload.
pub const XSCP_TYPE: &str = "@webflow/XscpData";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XscpData {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: XscpPayload,
    pub meta: XscpMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XscpPayload {
    pub nodes: Vec<TargetNode>,
    pub styles: Vec<TargetStyle>,
    pub assets: Vec<Value>,
    pub ix1: Vec<Value>,
    pub ix2: Interactions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interactions {
    pub interactions: Vec<Value>,
    pub events: Vec<Value>,
    pub action_lists: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XscpMeta {
    pub unlinked_symbol_count: u32,
    pub dropped_links: u32,
    pub dyn_bind_removed_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Section,
    Heading,
    Paragraph,
    Link,
    Image,
    Video,
    List,
    ListItem,
    Block,
}

impl NodeType {
    pub fn for_tag(tag: &str) -> Self {
        match tag {
            "section" => NodeType::Section,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => NodeType::Heading,
            "p" => NodeType::Paragraph,
            "a" => NodeType::Link,
            "img" => NodeType::Image,
            "video" => NodeType::Video,
            "ul" | "ol" => NodeType::List,
            "li" => NodeType::ListItem,
            _ => NodeType::Block,
        }
    }
}

/// A node of the graph. Serialized untagged: element nodes carry `type`,
/// text nodes carry `text: true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetNode {
    Element(ElementTarget),
    Text(TextTarget),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementTarget {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub tag: String,
    /// Style ids, not class names
    pub classes: Vec<String>,
    pub children: Vec<String>,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTarget {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: bool,
    pub v: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub tag: String,
    pub xattr: Vec<XAttr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<ImageData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XAttr {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    External,
    Email,
    Phone,
    Section,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkData {
    pub mode: LinkMode,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStyle {
    #[serde(rename = "_id")]
    pub id: String,
    pub fake: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub namespace: String,
    /// `""` for a standalone class, `"&"` for a combo class
    pub comb: String,
    pub style_less: String,
    pub variants: BTreeMap<String, StyleVariant>,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleVariant {
    pub style_less: String,
}

impl TargetStyle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fake: false,
            kind: "class".to_string(),
            name: name.into(),
            namespace: String::new(),
            comb: String::new(),
            style_less: String::new(),
            variants: BTreeMap::new(),
            children: Vec::new(),
        }
    }
}

impl TargetNode {
    pub fn id(&self) -> &str {
        match self {
            TargetNode::Element(el) => &el.id,
            TargetNode::Text(text) => &text.id,
        }
    }

    pub fn children(&self) -> &[String] {
        match self {
            TargetNode::Element(el) => &el.children,
            TargetNode::Text(_) => &[],
        }
    }

    pub fn classes(&self) -> &[String] {
        match self {
            TargetNode::Element(el) => &el.classes,
            TargetNode::Text(_) => &[],
        }
    }

    pub fn as_element(&self) -> Option<&ElementTarget> {
        match self {
            TargetNode::Element(el) => Some(el),
            TargetNode::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementTarget> {
        match self {
            TargetNode::Element(el) => Some(el),
            TargetNode::Text(_) => None,
        }
    }
}

impl Default for XscpData {
    fn default() -> Self {
        Self {
            kind: XSCP_TYPE.to_string(),
            payload: XscpPayload::default(),
            meta: XscpMeta::default(),
        }
    }
}

impl XscpData {
    pub fn node(&self, id: &str) -> Option<&TargetNode> {
        self.payload.nodes.iter().find(|node| node.id() == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut TargetNode> {
        self.payload.nodes.iter_mut().find(|node| node.id() == id)
    }

    pub fn style(&self, id: &str) -> Option<&TargetStyle> {
        self.payload.styles.iter().find(|style| style.id == id)
    }

    pub fn style_mut(&mut self, id: &str) -> Option<&mut TargetStyle> {
        self.payload.styles.iter_mut().find(|style| style.id == id)
    }

    pub fn style_by_name(&self, name: &str) -> Option<&TargetStyle> {
        self.payload.styles.iter().find(|style| style.name == name)
    }

    /// The first node, which the builder always emits for the root element.
    pub fn root(&self) -> Option<&TargetNode> {
        self.payload.nodes.first()
    }

    /// Ids of the nodes that list `id` as a child.
    pub fn parents_of(&self, id: &str) -> Vec<&str> {
        self.payload
            .nodes
            .iter()
            .filter(|node| node.children().iter().any(|child| child == id))
            .map(TargetNode::id)
            .collect()
    }

    /// Class names applied to a node, mapped back through the style table.
    pub fn class_names_of(&self, node: &TargetNode) -> Vec<String> {
        node.classes()
            .iter()
            .filter_map(|style_id| self.style(style_id).map(|style| style.name.clone()))
            .collect()
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
