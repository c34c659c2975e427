//! Markup front end.
//!
//! Two backends build the same [`ElementNode`] tree: the html5ever DOM
//! (through `scraper`, behind the `dom` feature) and a small tokenizer with
//! recursive descent that needs no dependencies. Unbalanced markup always
//! gets the tokenizer's tree. Both only produce the tree; whitespace handling
//! is shared and runs afterwards.

#[cfg(feature = "dom")]
mod dom;
mod tokenizer;

use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::DROPPED_TAGS;
use crate::warning::Warning;

pub use tokenizer::{VOID_TAGS, decode_entities, is_void_tag};

/// Tags whose text is kept exactly as written.
const PRESERVE_WHITESPACE_TAGS: &[&str] = &["pre", "textarea", "script", "style"];

/// One element of the source tree. Attribute keys are lowercase; `id` and
/// `class` stay in `attributes` as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementNode {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<HtmlChild>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlChild {
    Element(ElementNode),
    Text(String),
}

/// Result of a parse: the first top-level element that is not a non-visual
/// tag (`<style>`, `<script>`, `<meta>` ...), if any, plus anything that had
/// to be dropped along the way.
#[derive(Debug, Clone, Default)]
pub struct HtmlParse {
    pub root: Option<ElementNode>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HtmlBackend {
    /// html5ever when compiled in, the tokenizer otherwise
    #[default]
    Dom,
    Tokenizer,
}

impl ElementNode {
    pub fn new<K, V>(tag: &str, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let attributes: BTreeMap<String, String> = attributes
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        let id = attributes
            .get("id")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let classes = attributes
            .get("class")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            tag: tag.to_ascii_lowercase(),
            id,
            classes,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn element_children(&self) -> impl Iterator<Item = &ElementNode> {
        self.children.iter().filter_map(|child| match child {
            HtmlChild::Element(el) => Some(el),
            HtmlChild::Text(_) => None,
        })
    }

    /// This element and every descendant element, in document order.
    pub fn descendants(&self) -> Vec<&ElementNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            let children: Vec<&ElementNode> = node.element_children().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                HtmlChild::Text(text) => out.push_str(text),
                HtmlChild::Element(el) => out.push_str(&el.text_content()),
            }
        }
        out
    }
}

/// Parse with the preferred backend.
pub fn parse_html(markup: &str) -> HtmlParse {
    parse_html_with(markup, HtmlBackend::default())
}

/// Parse with the tokenizer regardless of the compiled features.
pub fn parse_html_fallback(markup: &str) -> HtmlParse {
    parse_html_with(markup, HtmlBackend::Tokenizer)
}

pub fn parse_html_with(markup: &str, backend: HtmlBackend) -> HtmlParse {
    let mut parsed = match backend {
        #[cfg(feature = "dom")]
        HtmlBackend::Dom => dom::parse(markup),
        #[cfg(not(feature = "dom"))]
        HtmlBackend::Dom => tokenizer::parse(markup),
        HtmlBackend::Tokenizer => tokenizer::parse(markup),
    };
    if let Some(root) = parsed.root.as_mut() {
        normalize_whitespace(root, false);
    }
    debug!(
        backend = ?backend,
        root = parsed.root.as_ref().map(|r| r.tag.as_str()).unwrap_or("<none>"),
        warnings = parsed.warnings.len(),
        "parsed html"
    );
    parsed
}

/// First top-level element the graph builder would keep.
pub(crate) fn choose_root(top_level: impl IntoIterator<Item = ElementNode>) -> Option<ElementNode> {
    top_level
        .into_iter()
        .find(|el| !DROPPED_TAGS.contains(&el.tag.as_str()))
}

/// True when the markup carries its own document wrapper.
pub(crate) fn looks_like_document(markup: &str) -> bool {
    let lowered = markup.to_ascii_lowercase();
    lowered.contains("<html") || lowered.contains("<body") || lowered.contains("<!doctype")
}

/// Collapse whitespace runs to one space, trim text at the edges of an
/// element and drop whitespace-only runs. Preformatted subtrees are left
/// alone.
fn normalize_whitespace(node: &mut ElementNode, preserve: bool) {
    let preserve = preserve || PRESERVE_WHITESPACE_TAGS.contains(&node.tag.as_str());
    let count = node.children.len();
    let mut kept = Vec::with_capacity(count);
    for (idx, child) in std::mem::take(&mut node.children).into_iter().enumerate() {
        match child {
            HtmlChild::Element(mut el) => {
                normalize_whitespace(&mut el, preserve);
                kept.push(HtmlChild::Element(el));
            }
            HtmlChild::Text(text) if preserve => {
                if !text.is_empty() {
                    kept.push(HtmlChild::Text(text));
                }
            }
            HtmlChild::Text(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                let mut collapsed = collapse_whitespace(&text);
                if idx == 0 {
                    collapsed = collapsed.trim_start().to_string();
                }
                if idx + 1 == count {
                    collapsed = collapsed.trim_end().to_string();
                }
                kept.push(HtmlChild::Text(collapsed));
            }
        }
    }
    node.children = kept;
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() && ch != '\u{a0}' {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Text of every `<style>` element in the markup, in order, joined by a
/// newline. Used when no stylesheet is supplied separately.
pub fn collect_inline_styles(markup: &str) -> String {
    let lowered = markup.to_ascii_lowercase();
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    while let Some(rel) = lowered[cursor..].find("<style") {
        let start = cursor + rel;
        let after_name = start + "<style".len();
        if !lowered[after_name..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_whitespace() || c == '/')
        {
            cursor = after_name;
            continue;
        }
        let Some(open_end) = lowered[after_name..].find('>') else {
            break;
        };
        let body_start = after_name + open_end + 1;
        let Some(close) = lowered[body_start..].find("</style") else {
            break;
        };
        blocks.push(markup[body_start..body_start + close].trim().to_string());
        cursor = body_start + close + "</style".len();
    }
    blocks.retain(|b| !b.is_empty());
    blocks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <section class="hero  dark" id="top" data-track="x">
          <h1 class="title">Hello   <em>big</em>   world</h1>
          <!-- note -->
          <img src="a.png" alt="A">
          <pre>  keep
   this </pre>
          <p>Fish &amp; chips</p>
        </section>
    "#;

    fn shape(node: &ElementNode) -> String {
        let mut out = format!("<{}", node.tag);
        for class in &node.classes {
            out.push('.');
            out.push_str(class);
        }
        out.push('>');
        for child in &node.children {
            match child {
                HtmlChild::Element(el) => out.push_str(&shape(el)),
                HtmlChild::Text(t) => out.push_str(&format!("[{t}]")),
            }
        }
        out.push_str("</>");
        out
    }

    #[test]
    fn backends_agree_on_tree_shape() {
        let tokenized = parse_html_fallback(PAGE).root.unwrap();
        let expected = "<section.hero.dark><h1.title>[Hello ]<em>[big]</>[ world]</><img></><pre>[  keep\n   this ]</><p>[Fish & chips]</></>";
        assert_eq!(shape(&tokenized), expected);

        #[cfg(feature = "dom")]
        {
            let dom = parse_html(PAGE).root.unwrap();
            assert_eq!(shape(&dom), expected);
            assert_eq!(dom.attributes, tokenized.attributes);
        }
    }

    #[test]
    fn backends_agree_on_unbalanced_markup_and_documents() {
        let inputs = [
            r#"<div class="a"><section><p>broken</div>"#,
            r#"<style>.hero{padding:8px}</style><section class="hero"><h1>Hi</h1></section>"#,
            r#"<!doctype html><div class="page"><p>x</p></div>"#,
            r#"<html><head><title>t</title></head><body class="page"><p>x</p></body></html>"#,
        ];
        for input in inputs {
            let tokenized = parse_html_fallback(input);
            let preferred = parse_html(input);
            assert_eq!(
                preferred.root.as_ref().map(shape),
                tokenized.root.as_ref().map(shape),
                "{input}"
            );
            assert_eq!(preferred.warnings, tokenized.warnings, "{input}");
        }

        let broken = parse_html(inputs[0]);
        assert_eq!(broken.root.as_ref().map(shape).unwrap(), "<div.a>[broken]</>");
        assert_eq!(broken.warnings.len(), 2);
    }

    #[test]
    fn attributes_and_identity() {
        let root = parse_html_fallback(PAGE).root.unwrap();
        assert_eq!(root.id.as_deref(), Some("top"));
        assert_eq!(root.attr("data-track"), Some("x"));
        assert!(root.has_class("dark"));
        let img = root.descendants().into_iter().find(|n| n.tag == "img").unwrap();
        assert_eq!(img.attr("alt"), Some("A"));
        assert!(img.children.is_empty());
    }

    #[test]
    fn inline_styles_are_collected_in_order() {
        let css = collect_inline_styles(
            "<head><style>.a{color:red}</style><STYLE media=\"all\"> .b{} </STYLE><stylesheet></head>",
        );
        assert_eq!(css, ".a{color:red}\n.b{}");
    }

    #[test]
    fn empty_markup_has_no_root() {
        assert!(parse_html_fallback("   just text ").root.is_none());
        assert!(parse_html_fallback("").root.is_none());
    }
}
