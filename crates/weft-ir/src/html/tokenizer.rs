//! Dependency-free markup reader: find an opening tag, find its matching
//! close by counting same-named tags, recurse into what lies between.

use tracing::warn;

use super::{ElementNode, HtmlChild, HtmlParse, choose_root};
use crate::warning::{Warning, WarningKind};

/// Elements that never have content.
pub const VOID_TAGS: &[&str] = &[
    "img", "br", "hr", "input", "meta", "link", "area", "base", "col", "embed", "param", "source",
    "track", "wbr",
];

/// Elements whose content is text, not markup.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea"];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

pub(super) fn parse(markup: &str) -> HtmlParse {
    let mut warnings = Vec::new();
    let nodes = parse_nodes(markup, &mut warnings);
    let root = choose_root(nodes.into_iter().filter_map(|child| match child {
        HtmlChild::Element(el) => Some(el),
        HtmlChild::Text(_) => None,
    }));
    HtmlParse { root, warnings }
}

struct OpenTag {
    name: String,
    attributes: Vec<(String, String)>,
    self_closing: bool,
    /// Byte offset just past the closing `>`
    end: usize,
}

fn parse_nodes(src: &str, warnings: &mut Vec<Warning>) -> Vec<HtmlChild> {
    let lower = src.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut merge_text = true;
    let mut pos = 0usize;

    while pos < src.len() {
        let Some(rel) = src[pos..].find('<') else {
            push_text(&mut out, &src[pos..], merge_text);
            break;
        };
        let lt = pos + rel;
        push_text(&mut out, &src[pos..lt], merge_text);
        merge_text = true;
        let rest = &src[lt..];

        if rest.starts_with("<!--") {
            pos = src[lt + 4..]
                .find("-->")
                .map_or(src.len(), |end| lt + 4 + end + 3);
            merge_text = false;
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") || rest.starts_with("</") {
            // doctype, processing instruction or a close tag nothing opened
            pos = src[lt..].find('>').map_or(src.len(), |end| lt + end + 1);
            continue;
        }
        let Some(tag) = read_open_tag(src, lt) else {
            push_text(&mut out, "<", true);
            pos = lt + 1;
            continue;
        };

        let mut element = ElementNode::new(&tag.name, tag.attributes);
        if tag.self_closing || is_void_tag(&tag.name) {
            out.push(HtmlChild::Element(element));
            pos = tag.end;
            continue;
        }

        let raw_text = RAW_TEXT_TAGS.contains(&tag.name.as_str());
        let close = if raw_text {
            find_raw_close(&lower, tag.end, &tag.name)
        } else {
            find_matching_close(&lower, tag.end, &tag.name)
        };
        match close {
            Some((close_start, close_end)) => {
                let inner = &src[tag.end..close_start];
                if raw_text {
                    if !inner.is_empty() {
                        let text = if tag.name == "textarea" {
                            decode_entities(inner)
                        } else {
                            inner.to_string()
                        };
                        element.children.push(HtmlChild::Text(text));
                    }
                } else {
                    element.children = parse_nodes(inner, warnings);
                }
                out.push(HtmlChild::Element(element));
                pos = close_end;
            }
            None => {
                warn!(tag = %tag.name, "element has no closing tag; dropping it");
                warnings.push(Warning::new(
                    WarningKind::DroppedSubtree,
                    format!("<{}> has no matching closing tag and was dropped", tag.name),
                ));
                pos = tag.end;
            }
        }
    }
    out
}

fn push_text(out: &mut Vec<HtmlChild>, raw: &str, merge: bool) {
    if raw.is_empty() {
        return;
    }
    let text = decode_entities(raw);
    if merge {
        if let Some(HtmlChild::Text(previous)) = out.last_mut() {
            previous.push_str(&text);
            return;
        }
    }
    out.push(HtmlChild::Text(text));
}

fn read_open_tag(src: &str, lt: usize) -> Option<OpenTag> {
    let bytes = src.as_bytes();
    let mut i = lt + 1;
    let name_start = i;
    if !bytes.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b':') {
        i += 1;
    }
    let name = src[name_start..i].to_ascii_lowercase();
    let mut attributes = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(OpenTag {
                    name,
                    attributes,
                    self_closing: false,
                    end: i + 1,
                });
            }
            b'/' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    return Some(OpenTag {
                        name,
                        attributes,
                        self_closing: true,
                        end: i + 2,
                    });
                }
                i += 1;
                continue;
            }
            _ => {}
        }

        let key_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let key = src[key_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i)? {
                quote @ (b'"' | b'\'') => {
                    let quote = *quote;
                    let value_start = i + 1;
                    let len = src[value_start..].find(quote as char)?;
                    value = decode_entities(&src[value_start..value_start + len]);
                    i = value_start + len + 1;
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&src[value_start..i]);
                }
            }
        }
        if !key.is_empty() && !attributes.iter().any(|(k, _): &(String, String)| *k == key) {
            attributes.push((key, value));
        }
    }
}

/// `lower[at..]` starts with `<name` or `</name` followed by a tag boundary.
fn tag_at(lower: &str, at: usize, name: &str, closing: bool) -> bool {
    let prefix_len = if closing { 2 } else { 1 };
    let expected = if closing { "</" } else { "<" };
    if !lower[at..].starts_with(expected) || !lower[at + prefix_len..].starts_with(name) {
        return false;
    }
    lower[at + prefix_len + name.len()..]
        .chars()
        .next()
        .is_some_and(|c| c == '>' || c == '/' || c.is_ascii_whitespace())
}

/// Find the close tag matching an element opened just before `from`,
/// counting nested elements of the same name. Returns the start of the close
/// tag and the offset after it.
fn find_matching_close(lower: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(rel) = lower[pos..].find('<') {
        let at = pos + rel;
        if lower[at..].starts_with("<!--") {
            pos = lower[at + 4..].find("-->").map(|end| at + 4 + end + 3)?;
            continue;
        }
        if let Some(raw) = RAW_TEXT_TAGS
            .iter()
            .find(|raw| **raw != name && tag_at(lower, at, raw, false))
        {
            // markup-looking text inside script/style must not count
            let open_end = at + lower[at..].find('>')? + 1;
            pos = find_raw_close(lower, open_end, raw).map_or(open_end, |(_, end)| end);
            continue;
        }
        if tag_at(lower, at, name, true) {
            let tag_end = at + lower[at..].find('>')? + 1;
            depth -= 1;
            if depth == 0 {
                return Some((at, tag_end));
            }
        } else if tag_at(lower, at, name, false) {
            let tag_end = at + lower[at..].find('>')? + 1;
            if !lower[..tag_end - 1].ends_with('/') {
                depth += 1;
            }
        }
        pos = at + 1;
    }
    None
}

fn find_raw_close(lower: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let mut pos = from;
    while let Some(rel) = lower[pos..].find(&needle) {
        let at = pos + rel;
        if tag_at(lower, at, name, true) {
            let end = at + lower[at..].find('>')? + 1;
            return Some((at, end));
        }
        pos = at + needle.len();
    }
    None
}

/// Decode character references. Unknown named references stay as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_reference(&after[..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(numeric) = reference.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let ch = match reference {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        _ => return None,
    };
    Some(ch)
}
