//! Selector analysis shared by the class index and the router.

/// Pseudo-classes the target platform expresses as style variants.
pub const SUPPORTED_PSEUDO_CLASSES: &[&str] = &[
    "hover",
    "focus",
    "active",
    "visited",
    "focus-visible",
    "first-child",
    "last-child",
];

/// Pseudo-elements that CSS2 allowed with a single colon.
const LEGACY_PSEUDO_ELEMENTS: &[&str] = &["before", "after", "first-line", "first-letter"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoClass {
    pub name: String,
    pub args: Option<String>,
}

/// One compound selector: everything between two combinators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub universal: bool,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<String>,
    pub pseudo_classes: Vec<PseudoClass>,
    pub pseudo_elements: Vec<String>,
}

impl Compound {
    /// More than one simple selector that constrains the element.
    pub fn is_compound(&self) -> bool {
        let parts = self.tag.iter().count() + self.ids.len() + self.classes.len();
        parts > 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorAnalysis {
    pub compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`
    pub combinators: Vec<Combinator>,
}

impl SelectorAnalysis {
    /// The compound the selector applies to.
    pub fn subject(&self) -> Option<&Compound> {
        self.compounds.last()
    }

    pub fn all_classes(&self) -> impl Iterator<Item = &str> {
        self.compounds
            .iter()
            .flat_map(|compound| compound.classes.iter().map(String::as_str))
    }

    /// The last class in source order; the class the index files the rule under.
    pub fn last_class(&self) -> Option<&str> {
        self.all_classes().last()
    }

    pub fn class_count(&self) -> usize {
        self.all_classes().count()
    }

    pub fn has_pseudo_element(&self) -> bool {
        self.compounds
            .iter()
            .any(|compound| !compound.pseudo_elements.is_empty())
    }

    pub fn pseudo_classes(&self) -> impl Iterator<Item = &PseudoClass> {
        self.compounds
            .iter()
            .flat_map(|compound| compound.pseudo_classes.iter())
    }
}

pub fn is_supported_pseudo_class(pseudo: &PseudoClass) -> bool {
    pseudo.args.is_none() && SUPPORTED_PSEUDO_CLASSES.contains(&pseudo.name.as_str())
}

/// Split a selector list on top-level commas.
pub fn split_selector_list(list: &str) -> Vec<String> {
    super::declarations::split_top_level(list, ',')
}

/// Break a single selector into compounds and combinators.
pub fn analyze_selector(selector: &str) -> SelectorAnalysis {
    let mut analysis = SelectorAnalysis::default();
    let mut current = Compound::default();
    let mut pending: Option<Combinator> = None;
    let chars: Vec<char> = selector.trim().chars().collect();
    let mut i = 0usize;

    let flush = |analysis: &mut SelectorAnalysis,
                 current: &mut Compound,
                 pending: &mut Option<Combinator>| {
        if *current == Compound::default() {
            return;
        }
        if !analysis.compounds.is_empty() {
            analysis
                .combinators
                .push(pending.take().unwrap_or(Combinator::Descendant));
        }
        *pending = None;
        analysis.compounds.push(std::mem::take(current));
    };

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => {
                flush(&mut analysis, &mut current, &mut pending);
                if pending.is_none() && !analysis.compounds.is_empty() {
                    pending = Some(Combinator::Descendant);
                }
                i += 1;
            }
            '>' | '+' | '~' => {
                flush(&mut analysis, &mut current, &mut pending);
                pending = Some(match ch {
                    '>' => Combinator::Child,
                    '+' => Combinator::NextSibling,
                    _ => Combinator::SubsequentSibling,
                });
                i += 1;
            }
            '.' => {
                let (name, next) = read_ident(&chars, i + 1);
                if !name.is_empty() {
                    current.classes.push(name);
                }
                i = next;
            }
            '#' => {
                let (name, next) = read_ident(&chars, i + 1);
                if !name.is_empty() {
                    current.ids.push(name);
                }
                i = next;
            }
            '[' => {
                let (inner, next) = read_balanced(&chars, i, '[', ']');
                current.attributes.push(inner);
                i = next;
            }
            '*' => {
                current.universal = true;
                i += 1;
            }
            ':' => {
                let double = chars.get(i + 1) == Some(&':');
                let start = if double { i + 2 } else { i + 1 };
                let (name, mut next) = read_ident(&chars, start);
                let name = name.to_ascii_lowercase();
                let mut args = None;
                if chars.get(next) == Some(&'(') {
                    let (inner, after) = read_balanced(&chars, next, '(', ')');
                    args = Some(inner);
                    next = after;
                }
                if double || LEGACY_PSEUDO_ELEMENTS.contains(&name.as_str()) {
                    current.pseudo_elements.push(name);
                } else {
                    current.pseudo_classes.push(PseudoClass { name, args });
                }
                i = next;
            }
            _ => {
                let (name, next) = read_ident(&chars, i);
                if name.is_empty() {
                    i += 1;
                } else {
                    current.tag = Some(name.to_ascii_lowercase());
                    i = next;
                }
            }
        }
    }
    flush(&mut analysis, &mut current, &mut pending);
    analysis
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut out = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
        } else if c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
            i += 1;
        } else {
            break;
        }
    }
    (out, i)
}

/// Read from an opening delimiter at `start` to its match; returns the inner
/// text and the index after the closing delimiter.
fn read_balanced(chars: &[char], start: usize, open: char, close: char) -> (String, usize) {
    let mut depth = 0i32;
    let mut out = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == open {
            depth += 1;
            if depth > 1 {
                out.push(c);
            }
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return (out, i + 1);
            }
            out.push(c);
        } else {
            out.push(c);
        }
        i += 1;
    }
    (out, i)
}
