use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use super::{ElementNode, HtmlChild, HtmlParse, choose_root, looks_like_document, tokenizer};
use crate::warning::WarningKind;

/// Wrappers html5ever inserts on its own. One the markup never spells out is
/// replaced by its children, which is what the tokenizer sees.
const IMPLIED_TAGS: &[&str] = &["html", "head", "body", "tbody"];

/// Parse through html5ever.
///
/// Both backends must hand the same tree downstream. html5ever repairs
/// unbalanced markup where the tokenizer drops the unclosed element, so for
/// markup the tokenizer finds unbalanced its tree and warnings are returned
/// as they are. Balanced markup goes through html5ever with the implied
/// wrappers taken out again.
pub(super) fn parse(markup: &str) -> HtmlParse {
    let checked = tokenizer::parse(markup);
    if checked
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::DroppedSubtree)
    {
        debug!(
            dropped = checked.warnings.len(),
            "unbalanced markup; using the tokenizer tree"
        );
        return checked;
    }

    let converter = Converter::new(markup);
    let document = if looks_like_document(markup) {
        Html::parse_document(markup)
    } else {
        Html::parse_fragment(markup)
    };
    // for fragments the root element is always the parser's own wrapper
    let mut top_level = Vec::new();
    converter.push_child(&mut top_level, *document.root_element());
    let root = choose_root(top_level.into_iter().filter_map(|child| match child {
        HtmlChild::Element(el) => Some(el),
        HtmlChild::Text(_) => None,
    }));
    HtmlParse {
        root,
        warnings: checked.warnings,
    }
}

struct Converter {
    /// Implied tags that do appear in the markup
    written: Vec<&'static str>,
}

impl Converter {
    fn new(markup: &str) -> Self {
        let lower = markup.to_ascii_lowercase();
        let written = IMPLIED_TAGS
            .iter()
            .copied()
            .filter(|tag| has_open_tag(&lower, tag))
            .collect();
        Self { written }
    }

    fn is_implied(&self, tag: &str) -> bool {
        IMPLIED_TAGS.contains(&tag) && !self.written.contains(&tag)
    }

    fn convert(&self, element: ElementRef<'_>) -> ElementNode {
        let value = element.value();
        let mut node = ElementNode::new(value.name(), value.attrs());
        for child in element.children() {
            self.push_child(&mut node.children, child);
        }
        node
    }

    fn push_child(&self, out: &mut Vec<HtmlChild>, child: NodeRef<'_, Node>) {
        match child.value() {
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(child) else {
                    return;
                };
                if self.is_implied(element.value().name()) {
                    for grandchild in element.children() {
                        self.push_child(out, grandchild);
                    }
                } else {
                    out.push(HtmlChild::Element(self.convert(element)));
                }
            }
            Node::Text(text) => {
                let text: &str = text;
                out.push(HtmlChild::Text(text.to_string()));
            }
            _ => {}
        }
    }
}

/// `lower` contains `<tag` followed by a tag boundary.
fn has_open_tag(lower: &str, tag: &str) -> bool {
    let needle = format!("<{tag}");
    lower.match_indices(&needle).any(|(at, _)| {
        lower[at + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c == '/' || c.is_ascii_whitespace())
    })
}
