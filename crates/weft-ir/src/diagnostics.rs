//! Compares the source tree and stylesheet with an emitted graph.
//!
//! A report is always derived from scratch; nothing carries over between
//! passes. The same comparison also yields the deterministic fixes: every
//! structural, spacing or font declaration that the source has and the
//! output lost can be restored without any guessing.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::css::{ClassIndex, ClassIndexEntry, DeclarationBlock, ResolvedVariables};
use crate::graph::passes::{SPACING_PROPERTIES, is_spacing_property};
use crate::graph::{DROPPED_TAGS, GRID_MARKER_CLASS, REMAPPED_TAGS, TargetNode, XscpData, style_id};
use crate::html::ElementNode;
use crate::logic::PatchInstruction;

const FLEX_STRUCTURE: &[&str] = &["display", "flex-direction", "justify-content", "align-items"];
const GRID_STRUCTURE: &[&str] = &["display", "grid-template-columns"];

/// Extra properties restored for containers when the source declares them.
const FLEX_EXTRAS: &[&str] = &["flex-wrap", "align-content"];
const GRID_EXTRAS: &[&str] = &["grid-template-rows", "grid-auto-flow", "grid-auto-columns", "grid-auto-rows"];

/// Initial values written when a flex container never declared them.
const FLEX_INITIAL_VALUES: &[(&str, &str)] = &[
    ("flex-direction", "row"),
    ("justify-content", "flex-start"),
    ("align-items", "stretch"),
];

const GENERIC_FONT_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
    "inherit",
    "initial",
    "unset",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub subject: String,
    pub message: String,
}

impl Finding {
    fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub missing_fonts: Vec<Finding>,
    pub layout_degradation: Vec<Finding>,
    pub missing_spacing: Vec<Finding>,
    pub orphaned: Vec<Finding>,
    /// Subjects are node ids
    pub phantom: Vec<Finding>,
}

impl DiagnosticReport {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.missing_fonts.len()
            + self.layout_degradation.len()
            + self.missing_spacing.len()
            + self.orphaned.len()
            + self.phantom.len()
    }

    pub fn phantom_ids(&self) -> BTreeSet<String> {
        self.phantom.iter().map(|f| f.subject.clone()).collect()
    }

    /// One line per finding, prefixed with its category.
    pub fn issues(&self) -> Vec<String> {
        let categories = [
            ("missing font", &self.missing_fonts),
            ("layout degradation", &self.layout_degradation),
            ("missing spacing", &self.missing_spacing),
            ("orphaned", &self.orphaned),
            ("phantom", &self.phantom),
        ];
        categories
            .iter()
            .flat_map(|(label, findings)| {
                findings
                    .iter()
                    .map(move |f| format!("{label}: {}: {}", f.subject, f.message))
            })
            .collect()
    }
}

/// A restoring patch and the line it contributes to the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicFix {
    pub patch: PatchInstruction,
    pub description: String,
}

/// Diagnostic engine for one id prefix.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    prefix: String,
    established: BTreeSet<String>,
    /// Source values are compared after substitution, as they are emitted
    variables: ResolvedVariables,
}

impl Diagnostics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            established: BTreeSet::new(),
            variables: ResolvedVariables::default(),
        }
    }

    pub fn with_variables(mut self, variables: ResolvedVariables) -> Self {
        self.variables = variables;
        self
    }

    /// Classes a prior token pass created; they have no style in this graph
    /// on purpose.
    pub fn with_established(mut self, established: BTreeSet<String>) -> Self {
        self.established = established;
        self
    }

    pub fn diagnose(&self, source: &ElementNode, index: &ClassIndex, graph: &XscpData) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();
        let elements = visible_elements(source);

        for class in referenced_classes(&elements) {
            if self.established.contains(class) {
                continue;
            }
            let (Some(entry), Some(emitted)) = (index.get(class), self.emitted(graph, class)) else {
                continue;
            };
            self.check_font(entry, &emitted, &mut report);
            self.check_layout(entry, &emitted, &mut report);
            self.check_spacing(entry, &emitted, &mut report);
        }
        self.check_orphans(graph, &mut report);
        self.check_phantoms(&elements, graph, &mut report);

        debug!(
            findings = report.total(),
            fonts = report.missing_fonts.len(),
            layout = report.layout_degradation.len(),
            spacing = report.missing_spacing.len(),
            orphaned = report.orphaned.len(),
            phantom = report.phantom.len(),
            "diagnosed graph"
        );
        report
    }

    /// Repair is worth asking for when anything was found, or when a class
    /// used at least twice carries no spacing at all in its emitted style.
    pub fn should_invoke_repair(&self, report: &DiagnosticReport, source: &ElementNode, graph: &XscpData) -> bool {
        if !report.is_empty() {
            return true;
        }
        let elements = visible_elements(source);
        let mut usage: BTreeMap<&str, usize> = BTreeMap::new();
        for element in &elements {
            for class in &element.classes {
                *usage.entry(class.as_str()).or_default() += 1;
            }
        }
        usage
            .into_iter()
            .filter(|(class, count)| *count >= 2 && !self.established.contains(*class))
            .any(|(class, _)| {
                self.emitted(graph, class).is_some_and(|block| {
                    !block.iter().any(|decl| is_spacing_property(&decl.property))
                })
            })
    }

    /// Patches restoring what the source declares and the output lost, plus
    /// initial values for undeclared flex structure.
    pub fn deterministic_fixes(&self, source: &ElementNode, index: &ClassIndex, graph: &XscpData) -> Vec<DeterministicFix> {
        let elements = visible_elements(source);
        let mut fixes = Vec::new();
        for class in referenced_classes(&elements) {
            if self.established.contains(class) {
                continue;
            }
            let (Some(entry), Some(emitted)) = (index.get(class), self.emitted(graph, class)) else {
                continue;
            };
            let mut restored: Vec<(String, String)> = Vec::new();
            let mut defaults: Vec<(String, String)> = Vec::new();
            let declared = &entry.base_styles;

            let mut wanted: Vec<&str> = Vec::new();
            match container_kind(declared) {
                Some(Container::Flex) => wanted.extend(FLEX_STRUCTURE.iter().chain(FLEX_EXTRAS)),
                Some(Container::Grid) => wanted.extend(GRID_STRUCTURE.iter().chain(GRID_EXTRAS)),
                None => {}
            }
            wanted.extend(SPACING_PROPERTIES);
            wanted.push("font-family");

            for property in wanted {
                if emitted.contains(property) {
                    continue;
                }
                if let Some(value) = declared.get(property) {
                    restored.push((property.to_string(), value.to_string()));
                }
            }
            if container_kind(declared) == Some(Container::Flex) {
                for (property, value) in FLEX_INITIAL_VALUES {
                    if !emitted.contains(property) && !declared.contains(property) {
                        defaults.push((property.to_string(), value.to_string()));
                    }
                }
            }

            if !restored.is_empty() {
                fixes.push(DeterministicFix {
                    description: format!(
                        ".{class}: restored {}",
                        restored.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                    patch: PatchInstruction::merge_style(class, restored),
                });
            }
            if !defaults.is_empty() {
                fixes.push(DeterministicFix {
                    description: format!(
                        ".{class}: wrote initial {}",
                        defaults
                            .iter()
                            .map(|(p, v)| format!("{p}: {v}"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    patch: PatchInstruction::merge_style(class, defaults),
                });
            }
        }
        fixes
    }

    fn emitted(&self, graph: &XscpData, class: &str) -> Option<DeclarationBlock> {
        graph
            .style(&style_id(&self.prefix, class))
            .map(|style| DeclarationBlock::from_less(&style.style_less))
    }

    fn check_font(&self, entry: &ClassIndexEntry, emitted: &DeclarationBlock, report: &mut DiagnosticReport) {
        let Some(declared) = entry.base("font-family") else {
            return;
        };
        let declared = self.resolved(declared);
        match emitted.get("font-family") {
            None => report.missing_fonts.push(Finding::new(
                format!(".{}", entry.name),
                format!("font-family `{declared}` is missing from the output"),
            )),
            Some(value) if is_generic_font(value) && !same_font(value, &declared) => {
                report.missing_fonts.push(Finding::new(
                    format!(".{}", entry.name),
                    format!("font-family fell back to `{value}`; source asked for `{declared}`"),
                ));
            }
            Some(_) => {}
        }
    }

    fn resolved(&self, value: &str) -> String {
        if !value.contains("var(") {
            return value.to_string();
        }
        let mut unresolved = Vec::new();
        self.variables.resolve_value(value, &mut unresolved)
    }

    fn check_layout(&self, entry: &ClassIndexEntry, emitted: &DeclarationBlock, report: &mut DiagnosticReport) {
        if !entry.is_layout_container {
            return;
        }
        let required = match container_kind(&entry.base_styles) {
            Some(Container::Flex) => FLEX_STRUCTURE,
            Some(Container::Grid) => GRID_STRUCTURE,
            None => return,
        };
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|property| !emitted.contains(property))
            .collect();
        if !missing.is_empty() {
            report.layout_degradation.push(Finding::new(
                format!(".{}", entry.name),
                format!("container is missing {}", missing.join(", ")),
            ));
        }
    }

    fn check_spacing(&self, entry: &ClassIndexEntry, emitted: &DeclarationBlock, report: &mut DiagnosticReport) {
        let missing: Vec<&str> = SPACING_PROPERTIES
            .iter()
            .copied()
            .filter(|property| entry.base_styles.contains(property) && !emitted.contains(property))
            .collect();
        if !missing.is_empty() {
            report.missing_spacing.push(Finding::new(
                format!(".{}", entry.name),
                format!("declared spacing lost: {}", missing.join(", ")),
            ));
        }
    }

    fn check_orphans(&self, graph: &XscpData, report: &mut DiagnosticReport) {
        let node_ids: BTreeSet<&str> = graph.payload.nodes.iter().map(TargetNode::id).collect();
        let exempt: BTreeSet<String> = self
            .established
            .iter()
            .map(|class| style_id(&self.prefix, class))
            .collect();
        let own_prefix = format!("{}-class-", self.prefix);
        let mut seen_styles = BTreeSet::new();

        for node in &graph.payload.nodes {
            for class_id in node.classes() {
                let builtin = class_id.starts_with("w-") && !class_id.starts_with(&own_prefix);
                if builtin || exempt.contains(class_id) || graph.style(class_id).is_some() {
                    continue;
                }
                if seen_styles.insert(class_id.as_str()) {
                    report.orphaned.push(Finding::new(
                        class_id.clone(),
                        "class is applied to nodes but has no style",
                    ));
                }
            }
            for child in node.children() {
                if !node_ids.contains(child.as_str()) {
                    report.orphaned.push(Finding::new(
                        child.clone(),
                        format!("listed as a child of {} but no such node exists", node.id()),
                    ));
                }
            }
        }
    }

    /// Every source element allows one output node with the same tag and
    /// classes; output nodes beyond that count were fabricated.
    fn check_phantoms(&self, elements: &[&ElementNode], graph: &XscpData, report: &mut DiagnosticReport) {
        let mut budget: BTreeMap<(String, Vec<String>), usize> = BTreeMap::new();
        for element in elements {
            let tag = output_tag(&element.tag).to_string();
            let mut classes: Vec<String> = element
                .classes
                .iter()
                .map(|class| style_id(&self.prefix, class))
                .collect();
            classes.sort();
            classes.dedup();
            *budget.entry((tag, classes)).or_default() += 1;
        }

        for node in &graph.payload.nodes {
            let Some(element) = node.as_element() else {
                continue;
            };
            // classes added by patches do not change what the node is
            let mut classes: Vec<String> = element
                .classes
                .iter()
                .filter(|class| *class != GRID_MARKER_CLASS)
                .cloned()
                .collect();
            classes.sort();
            classes.dedup();
            let key = (element.tag.clone(), classes);
            let matched = match budget.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            if !matched && !self.matches_with_added_classes(&mut budget, &element.tag, &element.classes) {
                report.phantom.push(Finding::new(
                    element.id.clone(),
                    format!("<{}> with this class list does not exist in the source", element.tag),
                ));
            }
        }
    }

    /// A node whose class list grew through `AddClassToNode` still matches a
    /// source signature that is a subset of its classes.
    fn matches_with_added_classes(
        &self,
        budget: &mut BTreeMap<(String, Vec<String>), usize>,
        tag: &str,
        classes: &[String],
    ) -> bool {
        let slot = budget.iter_mut().find(|((sig_tag, sig_classes), remaining)| {
            **remaining > 0
                && sig_tag == tag
                && !sig_classes.is_empty()
                && sig_classes.iter().all(|c| classes.contains(c))
        });
        match slot {
            Some((_, remaining)) => {
                *remaining -= 1;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Flex,
    Grid,
}

fn container_kind(block: &DeclarationBlock) -> Option<Container> {
    match block.get("display").map(str::trim) {
        Some("flex" | "inline-flex") => Some(Container::Flex),
        Some("grid" | "inline-grid") => Some(Container::Grid),
        _ => None,
    }
}

fn output_tag(tag: &str) -> &str {
    if REMAPPED_TAGS.contains(&tag) { "div" } else { tag }
}

/// Source elements the builder turns into nodes, in document order.
fn visible_elements(root: &ElementNode) -> Vec<&ElementNode> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if DROPPED_TAGS.contains(&node.tag.as_str()) {
            continue;
        }
        out.push(node);
        let children: Vec<&ElementNode> = node.element_children().collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

fn referenced_classes<'a>(elements: &[&'a ElementNode]) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for element in elements {
        for class in &element.classes {
            if seen.insert(class.as_str()) {
                out.push(class.as_str());
            }
        }
    }
    out
}

fn is_generic_font(value: &str) -> bool {
    let first = value.split(',').next().unwrap_or("").trim().trim_matches(['"', '\'']);
    GENERIC_FONT_FAMILIES.contains(&first.to_ascii_lowercase().as_str())
}

fn same_font(a: &str, b: &str) -> bool {
    let norm = |v: &str| v.split_whitespace().collect::<String>().to_ascii_lowercase();
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BuildOptions, GraphBuilder};
    use crate::html::parse_html_fallback;
    use crate::logic::apply_patches;

    struct Fixture {
        root: ElementNode,
        index: ClassIndex,
        graph: XscpData,
    }

    fn fixture(html: &str, css: &str) -> Fixture {
        let index = ClassIndex::from_css(css);
        let vars = index.variables().resolve();
        let root = parse_html_fallback(html).root.unwrap();
        let graph = GraphBuilder::new(&index, &vars, BuildOptions::new("wf"))
            .build(&root)
            .data;
        Fixture { root, index, graph }
    }

    #[test]
    fn flex_container_without_justify_content_degrades_and_asks_for_repair() {
        let f = fixture(
            r#"<div class="row"><p class="cell">a</p></div>"#,
            ".row { display: flex; flex-direction: row; align-items: center } .cell { margin: 0 }",
        );
        let diagnostics = Diagnostics::new("wf");
        let report = diagnostics.diagnose(&f.root, &f.index, &f.graph);
        assert_eq!(report.layout_degradation.len(), 1);
        assert!(report.layout_degradation[0].message.contains("justify-content"));
        assert!(diagnostics.should_invoke_repair(&report, &f.root, &f.graph));
    }

    #[test]
    fn lost_declarations_are_found_and_restored() {
        let mut f = fixture(
            r#"<div class="card"><h2 class="title">t</h2></div>"#,
            ".card { display: flex; justify-content: center; align-items: center; flex-direction: column; padding: 12px }
             .title { font-family: Inter, sans-serif; margin-bottom: 4px }",
        );
        // simulate a lossy paste
        f.graph.style_mut("wf-class-card").unwrap().style_less = "display: flex;".into();
        f.graph.style_mut("wf-class-title").unwrap().style_less = "font-family: sans-serif;".into();

        let diagnostics = Diagnostics::new("wf");
        let report = diagnostics.diagnose(&f.root, &f.index, &f.graph);
        assert_eq!(report.layout_degradation.len(), 1);
        assert_eq!(report.missing_spacing.len(), 2);
        assert_eq!(report.missing_fonts.len(), 1);

        let fixes = diagnostics.deterministic_fixes(&f.root, &f.index, &f.graph);
        let patches: Vec<PatchInstruction> = fixes.iter().map(|fix| fix.patch.clone()).collect();
        apply_patches(&mut f.graph, &patches, "wf");
        let after = diagnostics.diagnose(&f.root, &f.index, &f.graph);
        assert!(after.layout_degradation.is_empty());
        assert!(after.missing_spacing.is_empty());
        assert_eq!(after.missing_fonts.len(), 1, "a present generic font is not overwritten");
    }

    #[test]
    fn token_defined_fonts_are_compared_after_substitution() {
        let f = fixture(
            r#"<div class="a">x</div>"#,
            ":root { --font: system-ui } .a { font-family: var(--font) }",
        );
        let vars = f.index.variables().resolve();
        let report = Diagnostics::new("wf")
            .with_variables(vars)
            .diagnose(&f.root, &f.index, &f.graph);
        assert!(report.missing_fonts.is_empty(), "{report:?}");

        let mut lossy = f.graph.clone();
        lossy.style_mut("wf-class-a").unwrap().style_less = "font-family: serif;".into();
        let vars = f.index.variables().resolve();
        let report = Diagnostics::new("wf")
            .with_variables(vars)
            .diagnose(&f.root, &f.index, &lossy);
        assert_eq!(report.missing_fonts.len(), 1);
        assert!(report.missing_fonts[0].message.contains("system-ui"));
    }

    #[test]
    fn undeclared_flex_structure_gets_initial_values() {
        let f = fixture(r#"<nav class="bar"></nav>"#, ".bar { display: flex }");
        let fixes = Diagnostics::new("wf").deterministic_fixes(&f.root, &f.index, &f.graph);
        assert_eq!(fixes.len(), 1);
        assert_eq!(
            fixes[0].patch,
            PatchInstruction::merge_style(
                "bar",
                [
                    ("flex-direction", "row"),
                    ("justify-content", "flex-start"),
                    ("align-items", "stretch"),
                ]
            )
        );
    }

    #[test]
    fn orphans_exempt_builtin_and_established_classes() {
        let mut f = fixture(
            r#"<div class="grid"><span class="tok">x</span></div>"#,
            ".grid { display: grid; grid-template-columns: 1fr 1fr } .tok { color: red }",
        );
        f.graph.payload.styles.retain(|s| s.name != "tok");
        if let Some(TargetNode::Element(el)) = f.graph.payload.nodes.first_mut() {
            el.children.push("ghost-id".into());
        }

        let plain = Diagnostics::new("wf").diagnose(&f.root, &f.index, &f.graph);
        let subjects: Vec<&str> = plain.orphaned.iter().map(|o| o.subject.as_str()).collect();
        assert_eq!(subjects, vec!["ghost-id", "wf-class-tok"]);

        let established = Diagnostics::new("wf")
            .with_established(["tok".to_string()].into_iter().collect())
            .diagnose(&f.root, &f.index, &f.graph);
        assert_eq!(established.orphaned.len(), 1);
    }

    #[test]
    fn phantom_counter_handles_duplicates() {
        let mut f = fixture(
            r#"<ul class="list"><li class="item">a</li><li class="item">b</li></ul>"#,
            ".item { padding: 2px } .list { margin: 0 }",
        );
        let mut extra = f.graph.payload.nodes[1].clone();
        if let TargetNode::Element(el) = &mut extra {
            el.id = "wf-item-99".into();
        }
        f.graph.payload.nodes.push(extra);

        let report = Diagnostics::new("wf").diagnose(&f.root, &f.index, &f.graph);
        assert_eq!(report.phantom_ids(), ["wf-item-99".to_string()].into_iter().collect());
    }

    #[test]
    fn repeated_class_without_spacing_triggers_repair() {
        let f = fixture(
            r#"<div class="wrap"><div class="tile">a</div><div class="tile">b</div></div>"#,
            ".wrap { padding: 4px } .tile { color: red }",
        );
        let diagnostics = Diagnostics::new("wf");
        let report = diagnostics.diagnose(&f.root, &f.index, &f.graph);
        assert!(report.is_empty());
        assert!(diagnostics.should_invoke_repair(&report, &f.root, &f.graph));
    }
}
