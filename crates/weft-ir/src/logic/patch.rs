use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::css::DeclarationBlock;
use crate::error::{Result, WeftError};
use crate::graph::{TargetNode, TargetStyle, XscpData, style_id};

/// Graph edit produced by the deterministic pass or translated from a
/// repair response.
///
/// External JSON uses an `op` tag and camelCase names throughout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PatchInstruction {
    /// Set the given properties on the base style of a class, creating the
    /// style if needed. Other properties are kept.
    MergeStyle {
        class_name: String,
        properties: BTreeMap<String, String>,
    },
    /// Replace the base style of a class.
    SetStyle {
        class_name: String,
        style_less: String,
    },
    /// Like `MergeStyle`, for one variant (`small`, `hover`, ...).
    MergeVariant {
        class_name: String,
        variant: String,
        properties: BTreeMap<String, String>,
    },
    SetVariant {
        class_name: String,
        variant: String,
        style_less: String,
    },
    /// Append a class to an element node's class list.
    AddClassToNode { node_id: String, class_name: String },
    /// Remove a node with its descendants and unlink it from its parents.
    RemoveNode { node_id: String },
}

impl PatchInstruction {
    pub fn merge_style<K, V>(class_name: &str, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        PatchInstruction::MergeStyle {
            class_name: class_name.to_string(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Short human-readable form used in reports.
    pub fn describe(&self) -> String {
        match self {
            PatchInstruction::MergeStyle {
                class_name,
                properties,
            } => format!(
                ".{class_name}: set {}",
                properties.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            PatchInstruction::SetStyle { class_name, .. } => format!(".{class_name}: replace style"),
            PatchInstruction::MergeVariant {
                class_name,
                variant,
                properties,
            } => format!(
                ".{class_name} ({variant}): set {}",
                properties.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            PatchInstruction::SetVariant {
                class_name,
                variant,
                ..
            } => format!(".{class_name} ({variant}): replace style"),
            PatchInstruction::AddClassToNode {
                node_id,
                class_name,
            } => format!("{node_id}: add class .{class_name}"),
            PatchInstruction::RemoveNode { node_id } => format!("{node_id}: remove"),
        }
    }
}

/// What happened to each instruction of a batch.
#[derive(Debug, Default)]
pub struct PatchOutcome {
    pub applied: Vec<String>,
    pub skipped: Vec<WeftError>,
}

/// Apply `patches` to `graph` strictly in order. A patch that cannot apply
/// is skipped and reported; the rest still run. Applying the same batch a
/// second time leaves the graph unchanged.
pub fn apply_patches(graph: &mut XscpData, patches: &[PatchInstruction], prefix: &str) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();
    for patch in patches {
        match apply_one(graph, patch, prefix) {
            Ok(()) => outcome.applied.push(patch.describe()),
            Err(err) => {
                warn!(patch = %patch.describe(), error = %err, "patch skipped");
                outcome.skipped.push(err);
            }
        }
    }
    debug!(
        applied = outcome.applied.len(),
        skipped = outcome.skipped.len(),
        "applied patches"
    );
    outcome
}

fn apply_one(graph: &mut XscpData, patch: &PatchInstruction, prefix: &str) -> Result<()> {
    match patch {
        PatchInstruction::MergeStyle {
            class_name,
            properties,
        } => {
            let style = style_entry(graph, prefix, class_name);
            style.style_less = merged(&style.style_less, properties);
        }
        PatchInstruction::SetStyle {
            class_name,
            style_less,
        } => {
            let style = style_entry(graph, prefix, class_name);
            style.style_less = DeclarationBlock::from_less(style_less).to_less();
        }
        PatchInstruction::MergeVariant {
            class_name,
            variant,
            properties,
        } => {
            let style = style_entry(graph, prefix, class_name);
            let entry = style.variants.entry(variant.clone()).or_default();
            entry.style_less = merged(&entry.style_less, properties);
        }
        PatchInstruction::SetVariant {
            class_name,
            variant,
            style_less,
        } => {
            let style = style_entry(graph, prefix, class_name);
            style.variants.entry(variant.clone()).or_default().style_less =
                DeclarationBlock::from_less(style_less).to_less();
        }
        PatchInstruction::AddClassToNode {
            node_id,
            class_name,
        } => {
            let sid = style_id(prefix, class_name);
            let node = graph
                .node_mut(node_id)
                .ok_or_else(|| WeftError::NodeNotFound(node_id.clone()))?;
            let element = node
                .as_element_mut()
                .ok_or_else(|| WeftError::TextNode(node_id.clone()))?;
            if !element.classes.contains(&sid) {
                element.classes.push(sid);
            }
            style_entry(graph, prefix, class_name);
        }
        PatchInstruction::RemoveNode { node_id } => remove_node(graph, node_id)?,
    }
    Ok(())
}

fn style_entry<'g>(graph: &'g mut XscpData, prefix: &str, class_name: &str) -> &'g mut TargetStyle {
    let sid = style_id(prefix, class_name);
    let styles = &mut graph.payload.styles;
    let pos = match styles.iter().position(|style| style.id == sid) {
        Some(pos) => pos,
        None => {
            debug!(class = %class_name, "creating style for patch");
            styles.push(TargetStyle::new(sid, class_name));
            styles.len() - 1
        }
    };
    &mut styles[pos]
}

fn merged(style_less: &str, properties: &BTreeMap<String, String>) -> String {
    let mut block = DeclarationBlock::from_less(style_less);
    let patch: DeclarationBlock = properties
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    block.merge(&patch);
    block.to_less()
}

fn remove_node(graph: &mut XscpData, node_id: &str) -> Result<()> {
    if graph.node(node_id).is_none() {
        return Err(WeftError::NodeNotFound(node_id.to_string()));
    }
    let mut doomed = BTreeSet::new();
    let mut stack = vec![node_id.to_string()];
    while let Some(id) = stack.pop() {
        if !doomed.insert(id.clone()) {
            continue;
        }
        if let Some(node) = graph.node(&id) {
            stack.extend(node.children().iter().cloned());
        }
    }
    graph
        .payload
        .nodes
        .retain(|node| !doomed.contains(node.id()));
    for node in &mut graph.payload.nodes {
        if let TargetNode::Element(element) = node {
            element.children.retain(|child| !doomed.contains(child));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ElementTarget, NodeData, NodeType, TextTarget};

    fn element(id: &str, children: &[&str]) -> TargetNode {
        TargetNode::Element(ElementTarget {
            id: id.into(),
            kind: NodeType::Block,
            tag: "div".into(),
            classes: Vec::new(),
            children: children.iter().map(|c| c.to_string()).collect(),
            data: NodeData {
                tag: "div".into(),
                ..NodeData::default()
            },
        })
    }

    fn graph() -> XscpData {
        let mut data = XscpData::default();
        data.payload.nodes = vec![
            element("root", &["a", "b"]),
            element("a", &["a-text"]),
            TargetNode::Text(TextTarget {
                id: "a-text".into(),
                text: true,
                v: "x".into(),
            }),
            element("b", &[]),
        ];
        let mut style = TargetStyle::new("wf-class-card", "card");
        style.style_less = "display: flex; gap: 4px;".into();
        data.payload.styles.push(style);
        data
    }

    #[test]
    fn serde_uses_op_tag_and_camel_case() {
        let patch = PatchInstruction::AddClassToNode {
            node_id: "n1".into(),
            class_name: "card".into(),
        };
        let json = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(
            json,
            serde_json::json!({ "op": "addClassToNode", "nodeId": "n1", "className": "card" })
        );
        let back: PatchInstruction = serde_json::from_value(json).expect("deserialize patch");
        assert_eq!(back, patch);
    }

    #[test]
    fn merge_keeps_existing_and_creates_missing_styles() {
        let mut data = graph();
        let patches = vec![
            PatchInstruction::merge_style("card", [("gap", "8px"), ("align-items", "center")]),
            PatchInstruction::merge_style("fresh", [("color", "red")]),
            PatchInstruction::MergeVariant {
                class_name: "card".into(),
                variant: "small".into(),
                properties: [("gap".to_string(), "2px".to_string())].into_iter().collect(),
            },
        ];
        let outcome = apply_patches(&mut data, &patches, "wf");
        assert_eq!(outcome.applied.len(), 3);
        let card = data.style("wf-class-card").unwrap();
        assert_eq!(card.style_less, "display: flex; gap: 8px; align-items: center;");
        assert_eq!(card.variants["small"].style_less, "gap: 2px;");
        assert_eq!(data.style("wf-class-fresh").unwrap().style_less, "color: red;");
    }

    #[test]
    fn remove_cascades_and_unlinks() {
        let mut data = graph();
        let outcome = apply_patches(
            &mut data,
            &[PatchInstruction::RemoveNode {
                node_id: "a".into(),
            }],
            "wf",
        );
        assert!(outcome.skipped.is_empty());
        let ids: Vec<&str> = data.payload.nodes.iter().map(TargetNode::id).collect();
        assert_eq!(ids, vec!["root", "b"]);
        assert_eq!(data.node("root").unwrap().children(), ["b".to_string()]);
    }

    #[test]
    fn removal_unlinks_every_removed_descendant() {
        let mut data = graph();
        if let Some(TargetNode::Element(b)) = data.payload.nodes.iter_mut().find(|n| n.id() == "b") {
            b.children.push("a-text".into());
        }
        apply_patches(
            &mut data,
            &[PatchInstruction::RemoveNode {
                node_id: "a".into(),
            }],
            "wf",
        );
        assert!(data.node("b").unwrap().children().is_empty());
        assert!(data.node("a-text").is_none());
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let patches = vec![
            PatchInstruction::merge_style("card", [("padding", "4px")]),
            PatchInstruction::AddClassToNode {
                node_id: "b".into(),
                class_name: "card".into(),
            },
            PatchInstruction::RemoveNode {
                node_id: "a".into(),
            },
        ];
        let mut once = graph();
        apply_patches(&mut once, &patches, "wf");
        let mut twice = once.clone();
        let outcome = apply_patches(&mut twice, &patches, "wf");
        assert_eq!(once, twice);
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[test]
    fn missing_nodes_are_skipped_not_fatal() {
        let mut data = graph();
        let outcome = apply_patches(
            &mut data,
            &[
                PatchInstruction::AddClassToNode {
                    node_id: "nope".into(),
                    class_name: "card".into(),
                },
                PatchInstruction::AddClassToNode {
                    node_id: "a-text".into(),
                    class_name: "card".into(),
                },
            ],
            "wf",
        );
        assert!(outcome.applied.is_empty());
        assert!(matches!(outcome.skipped[0], WeftError::NodeNotFound(_)));
        assert!(matches!(outcome.skipped[1], WeftError::TextNode(_)));
    }
}
