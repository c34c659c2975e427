use nanoid::nanoid;

const PREFIX_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Fresh prefix for a run that was not given one. Ids are only stable across
/// runs when the caller pins the prefix.
pub fn random_prefix() -> String {
    nanoid!(8, &PREFIX_ALPHABET)
}

/// Sequential node ids of the form `{prefix}-{base}-{n}`.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    counter: u64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_id(&mut self, base: &str) -> String {
        self.counter += 1;
        format!("{}-{}-{}", self.prefix, sanitize_id_part(base), self.counter)
    }
}

/// Style id for a class. It does not depend on emission order, so a patch
/// can name the style of a class that does not exist yet. Distinct class
/// names always get distinct ids, see [`encode_class_name`].
pub fn style_id(prefix: &str, class: &str) -> String {
    format!("{prefix}-class-{}", encode_class_name(class))
}

/// Reversible id form of a class name. Lowercase ASCII alphanumerics and `-`
/// pass through; after a `_` comes either `_` (a literal underscore), a
/// lowercase letter (its uppercase form) or a decimal code point closed by
/// `_`.
pub fn encode_class_name(class: &str) -> String {
    let mut out = String::with_capacity(class.len());
    for ch in class.chars() {
        match ch {
            'a'..='z' | '0'..='9' | '-' => out.push(ch),
            '_' => out.push_str("__"),
            'A'..='Z' => {
                out.push('_');
                out.push(ch.to_ascii_lowercase());
            }
            other => {
                out.push('_');
                out.push_str(&u32::from(other).to_string());
                out.push('_');
            }
        }
    }
    out
}

/// Lowercase ASCII alphanumerics, `-` and `_`; anything else becomes `-`
/// and the ends are trimmed.
pub fn sanitize_id_part(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '_' {
            ch.to_ascii_lowercase()
        } else {
            '-'
        };
        out.push(mapped);
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "node".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_sanitized() {
        let mut ids = IdGenerator::new("wf");
        assert_eq!(ids.next_id("Hero Card"), "wf-hero-card-1");
        assert_eq!(ids.next_id("text"), "wf-text-2");
        assert_eq!(ids.next_id("@@"), "wf-node-3");
    }

    #[test]
    fn style_ids_ignore_sequence() {
        assert_eq!(style_id("wf", "btn--primary"), "wf-class-btn--primary");
        assert_eq!(style_id("wf", "md:flex"), "wf-class-md_58_flex");
        assert_eq!(style_id("wf", "card"), style_id("wf", "card"));
    }

    #[test]
    fn style_ids_keep_similar_classes_apart() {
        let classes = ["card", "Card", "CARD", "md:flex", "md-flex", "md_flex", "a.b", "a-b", "_c", "C", "-a", "a"];
        let ids: std::collections::BTreeSet<String> = classes.iter().map(|c| style_id("wf", c)).collect();
        assert_eq!(ids.len(), classes.len());
        assert_eq!(style_id("wf", "Card"), "wf-class-_card");
        assert_eq!(style_id("wf", "md_flex"), "wf-class-md__flex");
    }

    #[test]
    fn random_prefixes_are_lowercase_alphanumeric() {
        let prefix = random_prefix();
        assert_eq!(prefix.len(), 8);
        assert!(prefix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
