//! Custom property extraction and `var()` substitution.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::declarations::{DeclarationBlock, split_top_level};
use super::parser::{CssItem, StyleSheet};

/// Value written for every variable that takes part in a reference cycle.
pub const CYCLE_VALUE: &str = "unset";

/// Raw `--name -> value` definitions from top-level `:root` rules. The first
/// definition of a name wins and the map is never rewritten by resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssVariableMap {
    vars: BTreeMap<String, String>,
}

/// Result of resolving a [`CssVariableMap`]: every value with its `var()`
/// references substituted as far as the definitions allow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedVariables {
    pub values: BTreeMap<String, String>,
    /// Variables that sit on a reference cycle
    pub cyclic: BTreeSet<String>,
    /// Names referenced without a definition or fallback
    pub unresolved: BTreeSet<String>,
}

/// Declaration block after substitution, plus the names that could not be
/// substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub block: DeclarationBlock,
    pub unresolved: Vec<String>,
}

impl CssVariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stylesheet(sheet: &StyleSheet) -> Self {
        let mut map = Self::new();
        for item in &sheet.items {
            let CssItem::Rule(rule) = item else {
                continue;
            };
            if !rule.selectors.iter().any(|sel| sel == ":root") {
                continue;
            }
            for decl in rule.declarations.iter() {
                if decl.property.starts_with("--") {
                    map.define(&decl.property, &decl.value);
                }
            }
        }
        debug!(count = map.len(), "extracted custom properties");
        map
    }

    /// Record a definition unless the name is already defined.
    pub fn define(&mut self, name: &str, value: &str) {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| value.trim().to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve every variable. Cycles are found first (references inside
    /// fallbacks count) and all of their members become `unset`; the rest are
    /// then substituted depth-first.
    pub fn resolve(&self) -> ResolvedVariables {
        let cyclic = self.find_cycles();
        for name in &cyclic {
            warn!(variable = %name, "circular custom property reference; using unset");
        }

        let mut resolved = ResolvedVariables {
            cyclic: cyclic.clone(),
            ..ResolvedVariables::default()
        };
        for name in &cyclic {
            resolved
                .values
                .insert(name.clone(), CYCLE_VALUE.to_string());
        }
        for name in self.vars.keys() {
            self.resolve_one(name, &mut resolved);
        }
        resolved
    }

    fn resolve_one(&self, name: &str, resolved: &mut ResolvedVariables) {
        if resolved.values.contains_key(name) {
            return;
        }
        let Some(raw) = self.vars.get(name) else {
            return;
        };
        for dep in references(raw) {
            if self.vars.contains_key(&dep) {
                self.resolve_one(&dep, resolved);
            }
        }
        let mut unresolved = Vec::new();
        let value = {
            let lookup = |n: &str| resolved.values.get(n).cloned();
            substitute(raw, &lookup, &mut unresolved)
        };
        resolved.unresolved.extend(unresolved);
        resolved.values.insert(name.to_string(), value);
    }

    /// Tarjan's strongly connected components over the reference graph.
    fn find_cycles(&self) -> BTreeSet<String> {
        struct State<'a> {
            index: usize,
            indices: BTreeMap<&'a str, usize>,
            lowlink: BTreeMap<&'a str, usize>,
            stack: Vec<&'a str>,
            on_stack: BTreeSet<&'a str>,
            cyclic: BTreeSet<String>,
        }

        fn visit<'a>(
            name: &'a str,
            graph: &BTreeMap<&'a str, Vec<&'a str>>,
            state: &mut State<'a>,
        ) {
            state.indices.insert(name, state.index);
            state.lowlink.insert(name, state.index);
            state.index += 1;
            state.stack.push(name);
            state.on_stack.insert(name);

            for &dep in graph.get(name).map(Vec::as_slice).unwrap_or(&[]) {
                if !state.indices.contains_key(dep) {
                    visit(dep, graph, state);
                    let low = state.lowlink[name].min(state.lowlink[dep]);
                    state.lowlink.insert(name, low);
                } else if state.on_stack.contains(dep) {
                    let low = state.lowlink[name].min(state.indices[dep]);
                    state.lowlink.insert(name, low);
                }
            }

            if state.lowlink[name] == state.indices[name] {
                let mut component = Vec::new();
                while let Some(member) = state.stack.pop() {
                    state.on_stack.remove(member);
                    component.push(member);
                    if member == name {
                        break;
                    }
                }
                let self_loop = graph
                    .get(name)
                    .is_some_and(|deps| deps.contains(&name));
                if component.len() > 1 || self_loop {
                    state
                        .cyclic
                        .extend(component.into_iter().map(str::to_string));
                }
            }
        }

        let refs: BTreeMap<&str, Vec<String>> = self
            .vars
            .iter()
            .map(|(name, value)| (name.as_str(), references(value)))
            .collect();
        let graph: BTreeMap<&str, Vec<&str>> = refs
            .iter()
            .map(|(name, deps)| {
                let deps = deps
                    .iter()
                    .filter_map(|d| self.vars.get_key_value(d.as_str()).map(|(k, _)| k.as_str()))
                    .collect();
                (*name, deps)
            })
            .collect();

        let mut state = State {
            index: 0,
            indices: BTreeMap::new(),
            lowlink: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            cyclic: BTreeSet::new(),
        };
        for &name in graph.keys() {
            if !state.indices.contains_key(name) {
                visit(name, &graph, &mut state);
            }
        }
        state.cyclic
    }
}

impl ResolvedVariables {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Substitute every `var()` in `value`. Names with neither a definition
    /// nor a fallback are left as written and appended to `unresolved`.
    pub fn resolve_value(&self, value: &str, unresolved: &mut Vec<String>) -> String {
        let lookup = |n: &str| self.values.get(n).cloned();
        substitute(value, &lookup, unresolved)
    }
}

pub fn extract_variables(sheet: &StyleSheet) -> CssVariableMap {
    CssVariableMap::from_stylesheet(sheet)
}

/// Resolve `var()` references in every declaration of `block`. Running it on
/// its own output changes nothing.
pub fn resolve_variables_in_properties(
    block: &DeclarationBlock,
    vars: &ResolvedVariables,
) -> Resolution {
    let mut out = block.clone();
    let mut unresolved = Vec::new();
    for decl in out.iter_mut() {
        if decl.value.contains("var(") {
            decl.value = vars.resolve_value(&decl.value, &mut unresolved);
        }
    }
    unresolved.dedup();
    Resolution {
        block: out,
        unresolved,
    }
}

/// Names referenced by `var()` anywhere in `value`, fallbacks included.
pub fn references(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = value;
    while let Some(pos) = rest.find("var(") {
        let after = &rest[pos + 4..];
        let name: String = after
            .trim_start()
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != ',' && *c != ')')
            .collect();
        if name.starts_with("--") && !names.contains(&name) {
            names.push(name);
        }
        rest = after;
    }
    names
}

/// If `value` is exactly one `var(--name)` with no fallback, the name.
pub fn single_reference(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix("var(")?.strip_suffix(')')?.trim();
    if inner.starts_with("--") && !inner.contains(',') && !inner.contains('(') {
        Some(inner)
    } else {
        None
    }
}

fn substitute(
    value: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    unresolved: &mut Vec<String>,
) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find("var(") {
        out.push_str(&rest[..pos]);
        let open = pos + 3;
        let Some(close) = matching_paren(rest, open) else {
            // unbalanced; keep the remainder untouched
            out.push_str(&rest[pos..]);
            return out;
        };
        let inner = &rest[open + 1..close];
        let (name, fallback) = split_first_comma(inner);
        let name = name.trim();

        match lookup(name) {
            Some(defined) => {
                // defined values are already resolved; recursing only picks up
                // the undefined names they still carry
                out.push_str(&substitute(&defined, lookup, unresolved));
            }
            None => match fallback {
                Some(fallback) if !fallback.trim().is_empty() => {
                    out.push_str(&substitute(fallback.trim(), lookup, unresolved));
                }
                _ => {
                    if !unresolved.iter().any(|n| n == name) {
                        unresolved.push(name.to_string());
                    }
                    out.push_str(&rest[pos..=close]);
                }
            },
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_first_comma(inner: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => return (&inner[..idx], Some(&inner[idx + 1..])),
            _ => {}
        }
    }
    (inner, None)
}

/// Split a shorthand value on top-level whitespace, keeping function calls
/// together.
pub(crate) fn value_tokens(value: &str) -> Vec<String> {
    split_top_level(value, ' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parser::parse_stylesheet;

    fn vars(css: &str) -> ResolvedVariables {
        CssVariableMap::from_stylesheet(&parse_stylesheet(css)).resolve()
    }

    #[test]
    fn first_definition_wins() {
        let map = CssVariableMap::from_stylesheet(&parse_stylesheet(
            ":root { --a: 1px; } :root { --a: 2px; --b: 3px }",
        ));
        assert_eq!(map.get("--a"), Some("1px"));
        assert_eq!(map.get("--b"), Some("3px"));
    }

    #[test]
    fn chains_resolve_through_each_other() {
        let resolved = vars(":root { --space: var(--base); --base: 8px; --pad: var(--space) var(--space) }");
        assert_eq!(resolved.get("--pad"), Some("8px 8px"));
        assert!(resolved.cyclic.is_empty());
    }

    #[test]
    fn cycles_become_unset() {
        let resolved = vars(":root { --a: var(--b); --b: var(--a); --c: var(--a); --d: var(--d) }");
        assert_eq!(resolved.get("--a"), Some("unset"));
        assert_eq!(resolved.get("--b"), Some("unset"));
        assert_eq!(resolved.get("--d"), Some("unset"));
        assert_eq!(resolved.get("--c"), Some("unset"));
        assert!(!resolved.cyclic.contains("--c"));
    }

    #[test]
    fn fallbacks_and_unresolved_names() {
        let resolved = vars(":root { --brand: #123456 }");
        let block = DeclarationBlock::parse(
            "color: var(--brand); border-color: var(--missing, var(--brand)); background: var(--nope)",
        );
        let out = resolve_variables_in_properties(&block, &resolved);
        assert_eq!(out.block.get("color"), Some("#123456"));
        assert_eq!(out.block.get("border-color"), Some("#123456"));
        assert_eq!(out.block.get("background"), Some("var(--nope)"));
        assert_eq!(out.unresolved, vec!["--nope".to_string()]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let resolved = vars(":root { --gap: 2rem }");
        let block = DeclarationBlock::parse("gap: var(--gap); margin: calc(var(--gap) * 2) var(--x)");
        let once = resolve_variables_in_properties(&block, &resolved);
        let twice = resolve_variables_in_properties(&once.block, &resolved);
        assert_eq!(once.block, twice.block);
        assert_eq!(once.block.get("margin"), Some("calc(2rem * 2) var(--x)"));
    }

    #[test]
    fn single_reference_detects_bare_tokens() {
        assert_eq!(single_reference("var(--space-4)"), Some("--space-4"));
        assert_eq!(single_reference("var(--a, 2px)"), None);
        assert_eq!(single_reference("calc(var(--a) * 2)"), None);
    }
}
