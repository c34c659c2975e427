//! Stylesheet scanner and recursive-descent rule parser.
//!
//! The scanner understands comments, quoted strings, parentheses and nested
//! braces, which is all the structure the router and class index need. It does
//! not validate property values.

use super::declarations::DeclarationBlock;
use super::selector::split_selector_list;

/// A parsed stylesheet in source order.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    pub items: Vec<CssItem>,
}

#[derive(Debug, Clone)]
pub enum CssItem {
    Rule(StyleRule),
    Media(MediaBlock),
    AtRule(AtRuleBlock),
}

/// `selector, selector { declarations }`
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selector_text: String,
    pub selectors: Vec<String>,
    pub declarations: DeclarationBlock,
    /// Original source text of the rule
    pub raw: String,
    /// Position among all style rules of the sheet, including nested ones
    pub order: usize,
}

/// `@media <query> { ... }`
#[derive(Debug, Clone)]
pub struct MediaBlock {
    pub query: String,
    pub rules: Vec<StyleRule>,
    /// At-rules nested in the media block (kept verbatim)
    pub nested: Vec<AtRuleBlock>,
    pub raw: String,
}

/// Any other at-rule: `@keyframes`, `@font-face`, `@import ...;`
#[derive(Debug, Clone)]
pub struct AtRuleBlock {
    /// Lowercased name without the `@`
    pub name: String,
    pub prelude: String,
    pub body: Option<String>,
    pub raw: String,
}

impl StyleSheet {
    /// Every style rule with the media query it sits in, in source order.
    pub fn rules(&self) -> Vec<(Option<&str>, &StyleRule)> {
        let mut out = Vec::new();
        for item in &self.items {
            match item {
                CssItem::Rule(rule) => out.push((None, rule)),
                CssItem::Media(media) => {
                    for rule in &media.rules {
                        out.push((Some(media.query.as_str()), rule));
                    }
                }
                CssItem::AtRule(_) => {}
            }
        }
        out
    }
}

pub fn parse_stylesheet(css: &str) -> StyleSheet {
    let source = strip_css_comments(css);
    let mut order = 0usize;
    StyleSheet {
        items: parse_items(&source, &mut order),
    }
}

fn parse_items(source: &str, order: &mut usize) -> Vec<CssItem> {
    let mut scanner = Scanner::new(source);
    let mut items = Vec::new();
    loop {
        scanner.skip_whitespace();
        if scanner.eof() {
            break;
        }
        if scanner.peek() == Some('}') {
            // stray close brace
            scanner.bump();
            continue;
        }
        let start = scanner.pos;
        let (prelude, terminator) = scanner.read_prelude();
        let prelude = prelude.trim().to_string();
        match terminator {
            Some(';') => {
                if let Some(name) = at_rule_name(&prelude) {
                    items.push(CssItem::AtRule(AtRuleBlock {
                        name,
                        prelude: at_rule_prelude(&prelude),
                        body: None,
                        raw: source[start..scanner.pos].trim().to_string(),
                    }));
                }
            }
            Some('{') => {
                let body = scanner.read_block();
                let raw = source[start..scanner.pos].trim().to_string();
                match at_rule_name(&prelude) {
                    Some(name) if name == "media" => {
                        let mut rules = Vec::new();
                        let mut nested = Vec::new();
                        for inner in parse_items(&body, order) {
                            match inner {
                                CssItem::Rule(rule) => rules.push(rule),
                                CssItem::AtRule(at) => nested.push(at),
                                CssItem::Media(media) => nested.push(AtRuleBlock {
                                    name: "media".to_string(),
                                    prelude: media.query,
                                    body: None,
                                    raw: media.raw,
                                }),
                            }
                        }
                        items.push(CssItem::Media(MediaBlock {
                            query: at_rule_prelude(&prelude),
                            rules,
                            nested,
                            raw,
                        }));
                    }
                    Some(name) => items.push(CssItem::AtRule(AtRuleBlock {
                        name,
                        prelude: at_rule_prelude(&prelude),
                        body: Some(body),
                        raw,
                    })),
                    None => {
                        if prelude.is_empty() {
                            continue;
                        }
                        *order += 1;
                        items.push(CssItem::Rule(StyleRule {
                            selectors: split_selector_list(&prelude),
                            selector_text: prelude,
                            declarations: DeclarationBlock::parse(&body),
                            raw,
                            order: *order,
                        }));
                    }
                }
            }
            Some('}') => {
                scanner.bump();
            }
            _ => break,
        }
    }
    items
}

fn at_rule_name(prelude: &str) -> Option<String> {
    let rest = prelude.strip_prefix('@')?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

fn at_rule_prelude(prelude: &str) -> String {
    let rest = prelude.trim_start_matches('@');
    let name_len = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(char::len_utf8)
        .sum::<usize>();
    rest[name_len..].trim().to_string()
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_string(&mut self, quote: char, out: &mut String) {
        while let Some(ch) = self.bump() {
            out.push(ch);
            if ch == '\\' {
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
            } else if ch == quote {
                break;
            }
        }
    }

    /// Read up to `{`, `;` or an unbalanced `}` at paren depth zero. The
    /// terminator is consumed except for `}`.
    fn read_prelude(&mut self) -> (String, Option<char>) {
        let mut out = String::new();
        let mut parens = 0i32;
        while let Some(ch) = self.peek() {
            match ch {
                '"' | '\'' => {
                    self.bump();
                    out.push(ch);
                    self.skip_string(ch, &mut out);
                    continue;
                }
                '(' | '[' => parens += 1,
                ')' | ']' => parens = (parens - 1).max(0),
                '{' | ';' if parens == 0 => {
                    self.bump();
                    return (out, Some(ch));
                }
                '}' if parens == 0 => return (out, Some('}')),
                _ => {}
            }
            self.bump();
            out.push(ch);
        }
        (out, None)
    }

    /// Read the content of a block whose `{` was already consumed, up to the
    /// matching `}` (consumed, not included). Unterminated blocks run to EOF.
    fn read_block(&mut self) -> String {
        let mut out = String::new();
        let mut depth = 1i32;
        while let Some(ch) = self.bump() {
            match ch {
                '"' | '\'' => {
                    out.push(ch);
                    self.skip_string(ch, &mut out);
                    continue;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return out;
                    }
                }
                _ => {}
            }
            out.push(ch);
        }
        out
    }
}

/// Remove `/* ... */` comments, leaving quoted strings alone.
pub fn strip_css_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_comment = false;
    let mut quote: Option<char> = None;
    while let Some(ch) = chars.next() {
        if in_comment {
            if ch == '*' {
                if let Some('/') = chars.peek().copied() {
                    chars.next();
                    in_comment = false;
                }
            }
            continue;
        }
        if let Some(q) = quote {
            out.push(ch);
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                out.push(ch);
            }
            '/' if chars.peek().copied() == Some('*') => {
                chars.next();
                in_comment = true;
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Whitespace-level minification: comments removed, runs of whitespace
/// collapsed, spaces dropped around `{ } ; , >` and after `:`, and the last
/// semicolon of each block removed. Quoted strings are copied untouched.
pub fn minify_css(css: &str) -> String {
    let source = strip_css_comments(css);
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut pending_space = false;
    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        // a space before ':' can be a descendant combinator, so it stays
        let tight = matches!(ch, '{' | '}' | ';' | ',' | '>' | ')');
        if pending_space && !out.is_empty() && !tight && !ends_tight(&out) {
            out.push(' ');
        }
        pending_space = false;
        match ch {
            '"' | '\'' => {
                out.push(ch);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if inner == ch {
                        break;
                    }
                }
            }
            '}' => {
                if out.ends_with(';') {
                    out.pop();
                }
                out.push('}');
            }
            _ => out.push(ch),
        }
    }
    out
}

fn ends_tight(out: &str) -> bool {
    matches!(
        out.chars().last(),
        Some('{' | '}' | ';' | ',' | '>' | ':' | '(')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_media_and_at_rules_in_order() {
        let sheet = parse_stylesheet(
            r#"
            @import url("a.css");
            /* comment { not a rule } */
            .a, .b { color: red; }
            @media (max-width: 767px) { .a { color: blue } }
            @keyframes spin { from { transform: rotate(0) } to { transform: rotate(360deg) } }
            "#,
        );
        assert_eq!(sheet.items.len(), 4);
        match &sheet.items[0] {
            CssItem::AtRule(at) => {
                assert_eq!(at.name, "import");
                assert!(at.body.is_none());
            }
            other => panic!("unexpected item: {:?}", other),
        }
        match &sheet.items[1] {
            CssItem::Rule(rule) => {
                assert_eq!(rule.selectors, vec![".a", ".b"]);
                assert_eq!(rule.declarations.get("color"), Some("red"));
            }
            other => panic!("unexpected item: {:?}", other),
        }
        match &sheet.items[2] {
            CssItem::Media(media) => {
                assert_eq!(media.query, "(max-width: 767px)");
                assert_eq!(media.rules.len(), 1);
                assert_eq!(media.rules[0].order, 2);
            }
            other => panic!("unexpected item: {:?}", other),
        }
        match &sheet.items[3] {
            CssItem::AtRule(at) => {
                assert_eq!(at.name, "keyframes");
                assert_eq!(at.prelude, "spin");
                assert!(at.body.as_deref().unwrap_or("").contains("360deg"));
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn braces_inside_strings_do_not_close_blocks() {
        let sheet = parse_stylesheet(".q::after { content: \"}\"; color: red }");
        assert_eq!(sheet.items.len(), 1);
        match &sheet.items[0] {
            CssItem::Rule(rule) => assert_eq!(rule.declarations.get("color"), Some("red")),
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn minify_collapses_whitespace_but_keeps_descendants() {
        let out = minify_css(".a  .b > .c {\n  color: red ;\n  margin: 0 auto;\n}\n");
        assert_eq!(out, ".a .b>.c{color:red;margin:0 auto}");
    }

    #[test]
    fn minify_keeps_strings_and_calc_spacing() {
        let out = minify_css(".x { content: \"a  b\"; width: calc(100% - 2px); }");
        assert_eq!(out, ".x{content:\"a  b\";width:calc(100% - 2px)}");
    }
}
