use std::collections::BTreeSet;

use tracing::warn;

use super::{ParentChildAction, SemanticResponse};
use crate::error::WeftError;
use crate::graph::{XscpData, style_id};
use crate::logic::PatchInstruction;

/// Patches derived from a validated response, plus what was refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub patches: Vec<PatchInstruction>,
    /// Why each refused suggestion was not turned into a patch
    pub rejected: Vec<String>,
}

/// Turn a response into patches against `graph`.
///
/// Removals are honored only for ids in `phantoms`; everything else the
/// response asks to delete is refused.
pub fn translate_response(
    response: &SemanticResponse,
    graph: &XscpData,
    phantoms: &BTreeSet<String>,
    prefix: &str,
) -> Translation {
    let mut out = Translation::default();

    for fix in &response.style_fixes {
        if fix.properties.is_empty() {
            out.rejected
                .push(format!(".{}: style fix without properties", fix.class_name));
            continue;
        }
        let patch = match &fix.variant {
            None => PatchInstruction::MergeStyle {
                class_name: fix.class_name.clone(),
                properties: fix.properties.clone(),
            },
            Some(variant) => PatchInstruction::MergeVariant {
                class_name: fix.class_name.clone(),
                variant: variant.clone(),
                properties: fix.properties.clone(),
            },
        };
        out.patches.push(patch);
    }

    for fix in &response.parent_child_fixes {
        match fix.action {
            ParentChildAction::CopyProperties => {
                let parent = fix.parent_class.as_deref().filter(|p| !p.is_empty());
                let properties = fix.properties.as_ref().filter(|p| !p.is_empty());
                match (parent, properties) {
                    (Some(parent), Some(properties)) => out.patches.push(PatchInstruction::MergeStyle {
                        class_name: parent.to_string(),
                        properties: properties.clone(),
                    }),
                    _ => out.rejected.push(format!(
                        ".{}: copy-properties needs a parent class and properties",
                        fix.child_class
                    )),
                }
            }
            ParentChildAction::AddClass => {
                let Some(class) = fix.add_class.as_deref().filter(|c| !c.is_empty()) else {
                    out.rejected
                        .push(format!(".{}: add-class without a class to add", fix.child_class));
                    continue;
                };
                let parents = parents_of_class(graph, &style_id(prefix, &fix.child_class));
                if parents.is_empty() {
                    out.rejected.push(format!(
                        ".{}: no node carries this class, nothing to add .{class} to",
                        fix.child_class
                    ));
                    continue;
                }
                for node_id in parents {
                    out.patches.push(PatchInstruction::AddClassToNode {
                        node_id,
                        class_name: class.to_string(),
                    });
                }
            }
        }
    }

    for removal in &response.phantom_removals {
        if phantoms.contains(&removal.node_id) {
            out.patches.push(PatchInstruction::RemoveNode {
                node_id: removal.node_id.clone(),
            });
        } else {
            warn!(node = %removal.node_id, "refusing to remove a node that is not phantom");
            out.rejected
                .push(WeftError::NotPhantom(removal.node_id.clone()).to_string());
        }
    }
    out
}

/// Ids of nodes with at least one child carrying `class_id`, in graph order.
fn parents_of_class(graph: &XscpData, class_id: &str) -> Vec<String> {
    let carriers: BTreeSet<&str> = graph
        .payload
        .nodes
        .iter()
        .filter(|node| node.classes().iter().any(|c| c == class_id))
        .map(|node| node.id())
        .collect();
    graph
        .payload
        .nodes
        .iter()
        .filter(|node| node.children().iter().any(|child| carriers.contains(child.as_str())))
        .map(|node| node.id().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::ClassIndex;
    use crate::graph::{BuildOptions, GraphBuilder};
    use crate::html::parse_html_fallback;
    use crate::repair::parse_response;

    fn graph() -> XscpData {
        let index = ClassIndex::from_css(".card { padding: 4px }");
        let vars = index.variables().resolve();
        let root = parse_html_fallback(
            r#"<div class="page"><div class="row"><p class="card">a</p><p class="card">b</p></div><div><p class="card">c</p></div></div>"#,
        )
        .root
        .unwrap();
        GraphBuilder::new(&index, &vars, BuildOptions::new("wf")).build(&root).data
    }

    #[test]
    fn maps_each_suggestion_to_its_patch() {
        let response = parse_response(
            r#"{
              "reasons": ["cards collapsed"],
              "styleFixes": [
                {"className":"card","category":"spacing","variant":"small","properties":{"padding":"2px"},"reason":""},
                {"className":"page","category":"typography","variant":null,"properties":{"font-family":"Inter"},"reason":""}
              ],
              "parentChildFixes": [
                {"action":"copy-properties","parentClass":"row","childClass":"card","addClass":null,"properties":{"gap":"8px"},"reason":""},
                {"action":"add-class","parentClass":null,"childClass":"card","addClass":"stack","properties":null,"reason":""}
              ],
              "phantomRemovals": []
            }"#,
        )
        .unwrap();
        let graph = graph();
        let out = translate_response(&response, &graph, &BTreeSet::new(), "wf");
        assert!(out.rejected.is_empty());
        assert_eq!(out.patches.len(), 5);
        assert!(matches!(&out.patches[0], PatchInstruction::MergeVariant { variant, .. } if variant == "small"));
        assert!(matches!(&out.patches[2], PatchInstruction::MergeStyle { class_name, .. } if class_name == "row"));
        let targets: Vec<&str> = out.patches[3..]
            .iter()
            .map(|p| match p {
                PatchInstruction::AddClassToNode { node_id, .. } => node_id.as_str(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(targets, vec!["wf-row-2", "wf-div-7"]);
    }

    #[test]
    fn removals_are_limited_to_phantom_ids() {
        let response = parse_response(
            r#"{"reasons":[],"styleFixes":[],"parentChildFixes":[],
                "phantomRemovals":[{"nodeId":"wf-row-2","reason":"looks redundant"},{"nodeId":"wf-ghost-9","reason":"fabricated"}]}"#,
        )
        .unwrap();
        let phantoms: BTreeSet<String> = ["wf-ghost-9".to_string()].into_iter().collect();
        let out = translate_response(&response, &graph(), &phantoms, "wf");
        assert_eq!(
            out.patches,
            vec![PatchInstruction::RemoveNode {
                node_id: "wf-ghost-9".into()
            }]
        );
        assert_eq!(out.rejected.len(), 1);
        assert!(out.rejected[0].contains("wf-row-2"));
    }
}
