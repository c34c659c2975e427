use std::collections::BTreeMap;

use tracing::debug;

use super::declarations::DeclarationBlock;
use super::media::{Breakpoint, classify_media};
use super::parser::{StyleSheet, parse_stylesheet};
use super::selector::{SelectorAnalysis, analyze_selector, is_supported_pseudo_class};
use super::variables::CssVariableMap;

/// Everything the stylesheet says about one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassIndexEntry {
    pub name: String,
    /// Declarations from rules with no pseudo-class outside any media query
    pub base_styles: DeclarationBlock,
    /// `hover`, `small`, `small_hover`, ...
    pub variants: BTreeMap<String, DeclarationBlock>,
    pub is_layout_container: bool,
    /// Preceding class of a `.parent.child` combo chain
    pub parent_class: Option<String>,
    /// Indexed from at least one selector naming more than one class
    pub is_complex: bool,
}

impl ClassIndexEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn variant(&self, key: &str) -> Option<&DeclarationBlock> {
        self.variants.get(key)
    }

    /// Value of `property` at base, falling back to nothing.
    pub fn base(&self, property: &str) -> Option<&str> {
        self.base_styles.get(property)
    }

    fn refresh_layout_flag(&mut self) {
        self.is_layout_container = matches!(
            self.base_styles.get("display").map(str::trim),
            Some("flex" | "inline-flex" | "grid" | "inline-grid")
        );
    }
}

/// Class name -> merged declarations, built once per stylesheet.
#[derive(Debug, Clone, Default)]
pub struct ClassIndex {
    entries: BTreeMap<String, ClassIndexEntry>,
    /// Class names in order of first declaration
    order: Vec<String>,
    variables: CssVariableMap,
}

/// Variant key for a breakpoint and optional pseudo-class.
pub fn variant_key(breakpoint: Breakpoint, pseudo: Option<&str>) -> Option<String> {
    match (breakpoint, pseudo) {
        (Breakpoint::Base, None) => None,
        (Breakpoint::Base, Some(pseudo)) => Some(pseudo.to_string()),
        (bp, None) => Some(bp.key().to_string()),
        (bp, Some(pseudo)) => Some(format!("{}_{}", bp.key(), pseudo)),
    }
}

impl ClassIndex {
    pub fn from_css(css: &str) -> Self {
        Self::from_stylesheet(&parse_stylesheet(css))
    }

    pub fn from_stylesheet(sheet: &StyleSheet) -> Self {
        let mut index = ClassIndex {
            variables: CssVariableMap::from_stylesheet(sheet),
            ..ClassIndex::default()
        };

        for (query, rule) in sheet.rules() {
            let breakpoint = match query {
                None => Breakpoint::Base,
                Some(query) => match classify_media(query) {
                    Some(bp) => bp,
                    None => continue,
                },
            };
            for selector in &rule.selectors {
                let analysis = analyze_selector(selector);
                let Some((class, pseudo)) = indexable(&analysis) else {
                    continue;
                };
                let key = variant_key(breakpoint, pseudo.as_deref());
                let entry = index.entry_mut(&class);
                if analysis.class_count() > 1 {
                    entry.is_complex = true;
                }
                if entry.parent_class.is_none() {
                    entry.parent_class = combo_parent(&analysis);
                }
                match key {
                    None => {
                        entry.base_styles.merge(&rule.declarations);
                        entry.refresh_layout_flag();
                    }
                    Some(key) => entry
                        .variants
                        .entry(key)
                        .or_default()
                        .merge(&rule.declarations),
                }
            }
        }

        debug!(classes = index.entries.len(), "built class index");
        index
    }

    fn entry_mut(&mut self, class: &str) -> &mut ClassIndexEntry {
        if !self.entries.contains_key(class) {
            self.order.push(class.to_string());
        }
        self.entries
            .entry(class.to_string())
            .or_insert_with(|| ClassIndexEntry::new(class))
    }

    pub fn get(&self, class: &str) -> Option<&ClassIndexEntry> {
        self.entries.get(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.entries.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in order of first declaration.
    pub fn iter(&self) -> impl Iterator<Item = &ClassIndexEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn variables(&self) -> &CssVariableMap {
        &self.variables
    }
}

pub fn build_class_index(sheet: &StyleSheet) -> ClassIndex {
    ClassIndex::from_stylesheet(sheet)
}

/// The class a selector is filed under and its pseudo-class, if the
/// selector can be indexed at all. Pseudo-elements, pseudo-classes outside
/// the allowlist, more than one pseudo-class and pseudo-classes on anything
/// but the subject all disqualify it.
fn indexable(analysis: &SelectorAnalysis) -> Option<(String, Option<String>)> {
    if analysis.has_pseudo_element() {
        return None;
    }
    let class = analysis.last_class()?.to_string();
    let subject = analysis.subject()?;
    if !subject.classes.iter().any(|c| *c == class) {
        return None;
    }
    let total = analysis.pseudo_classes().count();
    match subject.pseudo_classes.as_slice() {
        [] if total == 0 => Some((class, None)),
        [only] if total == 1 && is_supported_pseudo_class(only) => {
            Some((class, Some(only.name.clone())))
        }
        _ => None,
    }
}

/// `.a.b` chains with nothing else in the selector record `a` as the parent
/// of `b`.
fn combo_parent(analysis: &SelectorAnalysis) -> Option<String> {
    if analysis.compounds.len() != 1 {
        return None;
    }
    let subject = analysis.subject()?;
    if subject.tag.is_some() || !subject.ids.is_empty() || !subject.attributes.is_empty() {
        return None;
    }
    match subject.classes.as_slice() {
        [.., parent, _] => Some(parent.clone()),
        _ => None,
    }
}
