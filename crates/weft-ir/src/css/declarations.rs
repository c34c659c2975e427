use std::fmt;

/// One `property: value` pair. Property names are lowercased except for
/// custom properties, which are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// Ordered declaration list with per-property override.
///
/// Setting a property that is already present replaces the value in place, so
/// the first declaration position is kept and later rules win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationBlock {
    entries: Vec<Declaration>,
}

impl DeclarationBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a declaration body (`color: red; margin: 0`). Semicolons inside
    /// parentheses or quotes do not split.
    pub fn parse(body: &str) -> Self {
        let mut block = Self::new();
        for raw in split_top_level(body, ';') {
            let Some((name, value)) = raw.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            block.set(normalize_property(name), value);
        }
        block
    }

    /// Alias of [`DeclarationBlock::parse`] for the `styleLess` strings of the
    /// emitted graph.
    pub fn from_less(less: &str) -> Self {
        Self::parse(less)
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|decl| decl.property == property)
            .map(|decl| decl.value.as_str())
    }

    pub fn contains(&self, property: &str) -> bool {
        self.get(property).is_some()
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<String>) {
        let property = property.into();
        let value = value.into();
        match self.entries.iter_mut().find(|decl| decl.property == property) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Declaration { property, value }),
        }
    }

    pub fn remove(&mut self, property: &str) -> Option<String> {
        let pos = self.entries.iter().position(|decl| decl.property == property)?;
        Some(self.entries.remove(pos).value)
    }

    /// Apply every declaration of `other` on top of this block.
    pub fn merge(&mut self, other: &DeclarationBlock) {
        for decl in other.iter() {
            self.set(decl.property.clone(), decl.value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Declaration> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a flat "less" string: `prop: value;` pairs joined by a space.
    pub fn to_less(&self) -> String {
        self.entries
            .iter()
            .map(|decl| format!("{}: {};", decl.property, decl.value))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render for a CSS rule body: `prop: value; prop: value`.
    pub fn to_css_body(&self) -> String {
        self.entries
            .iter()
            .map(|decl| format!("{}: {}", decl.property, decl.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for DeclarationBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_less())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeclarationBlock {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut block = Self::new();
        for (property, value) in iter {
            block.set(normalize_property(&property.into()), value);
        }
        block
    }
}

pub(crate) fn normalize_property(name: &str) -> String {
    let name = name.trim();
    if name.starts_with("--") {
        name.to_string()
    } else {
        name.to_ascii_lowercase()
    }
}

/// Split on `sep` outside of parentheses, brackets and quoted strings.
/// Empty pieces are dropped and each piece is trimmed.
pub(crate) fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in input.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' => {
                depth = (depth - 1).max(0);
                current.push(ch);
            }
            c if c == sep && depth == 0 => {
                let piece = current.trim();
                if !piece.is_empty() {
                    parts.push(piece.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let piece = current.trim();
    if !piece.is_empty() {
        parts.push(piece.to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_declaration_overrides_in_place() {
        let block = DeclarationBlock::parse("color: red; margin: 0; COLOR: blue");
        assert_eq!(block.len(), 2);
        assert_eq!(block.get("color"), Some("blue"));
        assert_eq!(block.to_less(), "color: blue; margin: 0;");
    }

    #[test]
    fn semicolons_inside_urls_do_not_split() {
        let block = DeclarationBlock::parse(
            "background: url(data:image/png;base64,AAA=) no-repeat; content: \"a;b\"",
        );
        assert_eq!(
            block.get("background"),
            Some("url(data:image/png;base64,AAA=) no-repeat")
        );
        assert_eq!(block.get("content"), Some("\"a;b\""));
    }

    #[test]
    fn custom_properties_keep_case() {
        let block = DeclarationBlock::parse("--Brand-Color: #fff; Gap: 4px");
        assert_eq!(block.get("--Brand-Color"), Some("#fff"));
        assert_eq!(block.get("gap"), Some("4px"));
    }

    #[test]
    fn less_round_trip_is_stable() {
        let less = "display: flex; gap: 1rem;";
        assert_eq!(DeclarationBlock::from_less(less).to_less(), less);
    }
}
