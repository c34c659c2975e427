use std::collections::BTreeSet;

use tracing::{debug, warn};
use url::Url;
use weft_config::{PipelineConfig, StyleScopeMode};

use super::ids::{IdGenerator, style_id};
use super::passes::{
    GRID_MARKER_CLASS, StyleDraft, apply_grid_responsive_fix, declares_grid,
    resolve_draft_variables, sanitize_visibility, scale_spacing_tokens,
};
use super::{
    ElementTarget, ImageData, LinkData, LinkMode, NodeData, NodeType, StyleVariant, TargetNode,
    TargetStyle, TextTarget, XAttr, XscpData,
};
use crate::css::{ClassIndex, ResolvedVariables};
use crate::html::{ElementNode, HtmlChild};
use crate::warning::{Warning, WarningKind};

/// Non-visual elements; the whole subtree is left out.
pub const DROPPED_TAGS: &[&str] = &[
    "head", "meta", "link", "title", "script", "style", "noscript", "base", "iframe", "canvas",
    "input",
];

/// Elements the target has no semantics for; emitted as plain `div` blocks.
pub const REMAPPED_TAGS: &[&str] = &["html", "body", "main", "form", "label", "button"];

/// Which referenced classes get a style object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StyleScope {
    /// Every referenced class.
    #[default]
    Component,
    /// Referenced classes minus the ones a token pass already created.
    Incremental(BTreeSet<String>),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub prefix: String,
    pub scope: StyleScope,
    pub fluid_spacing: bool,
    pub grid_responsive_fix: bool,
}

impl BuildOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            scope: StyleScope::Component,
            fluid_spacing: true,
            grid_responsive_fix: true,
        }
    }

    pub fn from_config(config: &PipelineConfig, prefix: impl Into<String>) -> Self {
        let scope = match config.style_scope {
            StyleScopeMode::Component => StyleScope::Component,
            StyleScopeMode::Incremental => {
                StyleScope::Incremental(config.established_classes.clone())
            }
        };
        Self {
            prefix: prefix.into(),
            scope,
            fluid_spacing: config.fluid_spacing,
            grid_responsive_fix: config.grid_responsive_fix,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub data: XscpData,
    pub warnings: Vec<Warning>,
    /// Rewrites made by the style passes
    pub fixes: Vec<String>,
}

pub struct GraphBuilder<'a> {
    index: &'a ClassIndex,
    vars: &'a ResolvedVariables,
    options: BuildOptions,
}

/// Mutable state of one build.
struct BuildRun {
    ids: IdGenerator,
    data: XscpData,
    /// Class names in order of first reference
    referenced: Vec<String>,
    warnings: Vec<Warning>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(index: &'a ClassIndex, vars: &'a ResolvedVariables, options: BuildOptions) -> Self {
        Self {
            index,
            vars,
            options,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.options.prefix
    }

    pub fn build(&self, root: &ElementNode) -> BuildOutput {
        let mut run = BuildRun {
            ids: IdGenerator::new(self.options.prefix.clone()),
            data: XscpData::default(),
            referenced: Vec::new(),
            warnings: Vec::new(),
        };
        self.emit_element(root, &mut run);
        let fixes = self.emit_styles(&mut run);

        debug!(
            nodes = run.data.payload.nodes.len(),
            styles = run.data.payload.styles.len(),
            dropped_links = run.data.meta.dropped_links,
            handlers_removed = run.data.meta.dyn_bind_removed_count,
            "built clipboard graph"
        );
        BuildOutput {
            data: run.data,
            warnings: run.warnings,
            fixes,
        }
    }

    fn emit_element(&self, element: &ElementNode, run: &mut BuildRun) -> Option<String> {
        if DROPPED_TAGS.contains(&element.tag.as_str()) {
            return None;
        }
        let tag = if REMAPPED_TAGS.contains(&element.tag.as_str()) {
            "div"
        } else {
            element.tag.as_str()
        };
        let base_name = element
            .classes
            .first()
            .map(String::as_str)
            .or(element.id.as_deref())
            .unwrap_or(tag);
        let id = run.ids.next_id(base_name);

        let mut classes = Vec::with_capacity(element.classes.len() + 1);
        let mut grid = false;
        for class in &element.classes {
            let sid = style_id(&self.options.prefix, class);
            if classes.contains(&sid) {
                continue;
            }
            classes.push(sid);
            if !run.referenced.contains(class) {
                run.referenced.push(class.clone());
            }
            grid |= self
                .index
                .get(class)
                .is_some_and(|entry| declares_grid(&entry.base_styles));
        }
        if grid {
            classes.push(GRID_MARKER_CLASS.to_string());
        }

        let data = self.node_data(element, tag, run);
        let slot = run.data.payload.nodes.len();
        run.data.payload.nodes.push(TargetNode::Element(ElementTarget {
            id: id.clone(),
            kind: NodeType::for_tag(tag),
            tag: tag.to_string(),
            classes,
            children: Vec::new(),
            data,
        }));

        let mut children = Vec::new();
        for child in &element.children {
            match child {
                HtmlChild::Element(el) => {
                    if let Some(child_id) = self.emit_element(el, run) {
                        children.push(child_id);
                    }
                }
                HtmlChild::Text(text) => {
                    let text_id = run.ids.next_id("text");
                    run.data.payload.nodes.push(TargetNode::Text(TextTarget {
                        id: text_id.clone(),
                        text: true,
                        v: text.clone(),
                    }));
                    children.push(text_id);
                }
            }
        }
        if let Some(TargetNode::Element(node)) = run.data.payload.nodes.get_mut(slot) {
            node.children = children;
        }
        Some(id)
    }

    fn node_data(&self, element: &ElementNode, tag: &str, run: &mut BuildRun) -> NodeData {
        let mut data = NodeData {
            tag: tag.to_string(),
            ..NodeData::default()
        };
        for (name, value) in &element.attributes {
            if name.starts_with("on") {
                run.data.meta.dyn_bind_removed_count += 1;
            } else if name == "id" || name.starts_with("data-") {
                data.xattr.push(XAttr {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            // aria-*, role, tabindex and everything else is not carried
        }

        match tag {
            "a" => {
                let href = element.attr("href").unwrap_or("");
                match classify_link(href) {
                    Some((mode, url)) => {
                        data.link = Some(LinkData {
                            mode,
                            url,
                            target: element.attr("target").map(str::to_string),
                        });
                    }
                    None => {
                        debug!(href, "dropping unusable link");
                        run.data.meta.dropped_links += 1;
                    }
                }
            }
            "img" => {
                data.img = Some(ImageData {
                    src: element.attr("src").unwrap_or("").to_string(),
                    alt: element.attr("alt").unwrap_or("").to_string(),
                });
            }
            _ => {}
        }
        data
    }

    fn emit_styles(&self, run: &mut BuildRun) -> Vec<String> {
        let mut fixes = Vec::new();
        for class in &run.referenced {
            if let StyleScope::Incremental(established) = &self.options.scope {
                if established.contains(class) {
                    continue;
                }
            }
            let Some(entry) = self.index.get(class) else {
                warn!(class = %class, "class is used in markup but never declared");
                run.warnings.push(Warning::new(
                    WarningKind::MissingClass,
                    format!("class .{class} is referenced but not defined"),
                ));
                continue;
            };

            let mut draft = StyleDraft::from_entry(entry);
            if self.options.fluid_spacing {
                fixes.extend(scale_spacing_tokens(&mut draft, self.vars));
            }
            for name in resolve_draft_variables(&mut draft, self.vars) {
                warn!(class = %class, variable = %name, "unresolved custom property");
                run.warnings.push(Warning::new(
                    WarningKind::UnresolvedVariable,
                    format!("var({name}) in .{class} has no definition or fallback"),
                ));
            }
            fixes.extend(sanitize_visibility(&mut draft));
            if self.options.grid_responsive_fix {
                fixes.extend(apply_grid_responsive_fix(&mut draft));
            }

            let mut style = TargetStyle::new(style_id(&self.options.prefix, class), class.clone());
            if entry.parent_class.is_some() {
                style.comb = "&".to_string();
            }
            style.style_less = draft.base.to_less();
            style.variants = draft
                .variants
                .iter()
                .filter(|(_, block)| !block.is_empty())
                .map(|(key, block)| {
                    (
                        key.clone(),
                        StyleVariant {
                            style_less: block.to_less(),
                        },
                    )
                })
                .collect();
            run.data.payload.styles.push(style);
        }
        fixes
    }
}

/// Link mode and stored url for an `href`, or `None` when the link is not
/// usable (`javascript:`, empty).
pub fn classify_link(href: &str) -> Option<(LinkMode, String)> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with('#') {
        return Some((LinkMode::Section, href.to_string()));
    }
    match Url::parse(href) {
        Ok(url) => match url.scheme() {
            "javascript" => None,
            "mailto" => Some((LinkMode::Email, url.path().to_string())),
            "tel" => Some((LinkMode::Phone, url.path().to_string())),
            _ => Some((LinkMode::External, href.to_string())),
        },
        // relative paths stay as written
        Err(_) => Some((LinkMode::External, href.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::CssVariableMap;
    use crate::html::parse_html_fallback;

    fn build(html: &str, css: &str) -> BuildOutput {
        let index = ClassIndex::from_css(css);
        let vars = index.variables().resolve();
        let root = parse_html_fallback(html).root.unwrap();
        GraphBuilder::new(&index, &vars, BuildOptions::new("wf")).build(&root)
    }

    #[test]
    fn emits_nodes_in_document_order_with_stable_ids() {
        let out = build(
            r#"<section class="hero" id="top"><h1>Hi</h1><script>x()</script><div id="x"></div></section>"#,
            ".hero { padding: 10px }",
        );
        let ids: Vec<&str> = out.data.payload.nodes.iter().map(TargetNode::id).collect();
        assert_eq!(ids, vec!["wf-hero-1", "wf-h1-2", "wf-text-3", "wf-x-4"]);
        let root = out.data.payload.nodes[0].as_element().unwrap();
        assert_eq!(root.kind, NodeType::Section);
        assert_eq!(root.children, vec!["wf-h1-2", "wf-x-4"]);
        assert_eq!(root.classes, vec!["wf-class-hero"]);
        assert_eq!(
            root.data.xattr,
            vec![XAttr {
                name: "id".into(),
                value: "top".into()
            }]
        );
    }

    #[test]
    fn remaps_and_filters_attributes() {
        let out = build(
            r#"<button class="cta" onclick="go()" aria-label="Go" role="button" data-kind="primary">Go</button>"#,
            ".cta { color: red }",
        );
        let root = out.data.payload.nodes[0].as_element().unwrap();
        assert_eq!(root.tag, "div");
        assert_eq!(root.kind, NodeType::Block);
        assert_eq!(root.data.xattr.len(), 1);
        assert_eq!(root.data.xattr[0].name, "data-kind");
        assert_eq!(out.data.meta.dyn_bind_removed_count, 1);
    }

    #[test]
    fn links_are_classified_and_bad_ones_counted() {
        let out = build(
            r##"<div><a href="javascript:void(0)">x</a><a href="">y</a><a href="mailto:a@b.co">m</a><a href="#pricing">p</a><a href="https://x.io" target="_blank">e</a></div>"##,
            "",
        );
        assert_eq!(out.data.meta.dropped_links, 2);
        let links: Vec<&LinkData> = out
            .data
            .payload
            .nodes
            .iter()
            .filter_map(|n| n.as_element()?.data.link.as_ref())
            .collect();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].mode, LinkMode::Email);
        assert_eq!(links[0].url, "a@b.co");
        assert_eq!(links[1].mode, LinkMode::Section);
        assert_eq!(links[2].mode, LinkMode::External);
        assert_eq!(links[2].target.as_deref(), Some("_blank"));
    }

    #[test]
    fn styles_follow_first_use_and_report_missing_classes() {
        let out = build(
            r#"<div class="b a"><p class="ghost a">t</p></div>"#,
            ".a { color: red } .b { color: blue; opacity: 0 }",
        );
        let names: Vec<&str> = out.data.payload.styles.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(out.data.payload.styles[0].style_less, "color: blue; opacity: 1;");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, WarningKind::MissingClass);
        assert_eq!(out.fixes.len(), 1);
    }

    #[test]
    fn incremental_scope_skips_established_classes() {
        let index = ClassIndex::from_css(".a { color: red } .b { color: blue }");
        let vars = CssVariableMap::new().resolve();
        let mut options = BuildOptions::new("wf");
        options.scope = StyleScope::Incremental(["a".to_string()].into_iter().collect());
        let root = parse_html_fallback(r#"<div class="a b"></div>"#).root.unwrap();
        let out = GraphBuilder::new(&index, &vars, options).build(&root);
        assert_eq!(out.data.payload.styles.len(), 1);
        assert_eq!(out.data.payload.styles[0].name, "b");
    }

    #[test]
    fn grid_classes_get_the_marker_and_combo_classes_the_comb() {
        let out = build(
            r#"<div class="btn primary"><div class="cards"></div></div>"#,
            ".cards { display: grid } .btn.primary { color: red } .btn { color: blue }",
        );
        let cards = out.data.payload.nodes[1].as_element().unwrap();
        assert!(cards.classes.iter().any(|c| c == GRID_MARKER_CLASS));
        let primary = out.data.style_by_name("primary").unwrap();
        assert_eq!(primary.comb, "&");
        assert_eq!(out.data.style_by_name("btn").unwrap().comb, "");
    }

    #[test]
    fn spacing_token_scaling_is_reported() {
        let out = build(
            r#"<div class="stack"></div>"#,
            ":root { --space: 16px } .stack { gap: var(--space) }",
        );
        assert_eq!(
            out.fixes,
            vec![".stack: gap scaled per breakpoint from --space".to_string()]
        );
    }

    #[test]
    fn classes_differing_in_case_get_their_own_style() {
        let out = build(
            r#"<div class="Card"><p class="card">x</p></div>"#,
            ".Card { color: red } .card { color: blue }",
        );
        let styles: Vec<(&str, &str)> = out
            .data
            .payload
            .styles
            .iter()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect();
        assert_eq!(styles, vec![("wf-class-_card", "Card"), ("wf-class-card", "card")]);
        let p = out.data.payload.nodes[1].as_element().unwrap();
        assert_eq!(p.classes, vec!["wf-class-card"]);
    }

    #[test]
    fn building_twice_gives_identical_output() {
        let html = r#"<main class="page"><ul class="list"><li>a</li><li>b</li></ul></main>"#;
        let css = ".page { display: flex } .list { gap: 4px }";
        assert_eq!(build(html, css).data, build(html, css).data);
    }
}
