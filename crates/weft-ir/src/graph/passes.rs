//! Rewrites applied to each emitted style before it is serialized.

use std::collections::BTreeMap;

use super::XscpData;
use crate::css::{
    Breakpoint, ClassIndexEntry, DeclarationBlock, ResolvedVariables,
    resolve_variables_in_properties, single_reference, value_tokens,
};

/// Class the target platform uses to recognize grid containers.
pub const GRID_MARKER_CLASS: &str = "w-layout-grid";

/// Spacing token multipliers per breakpoint, applied to the rem value.
pub const SPACING_SCALE: [(Breakpoint, f64); 4] = [
    (Breakpoint::Base, 1.1),
    (Breakpoint::Medium, 1.0),
    (Breakpoint::Small, 0.9),
    (Breakpoint::Tiny, 0.85),
];

pub(crate) const SPACING_PROPERTIES: &[&str] = &[
    "margin",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "padding",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "gap",
    "row-gap",
    "column-gap",
];

pub(crate) fn is_spacing_property(property: &str) -> bool {
    SPACING_PROPERTIES.contains(&property)
}

/// Declarations of one class on their way into a `TargetStyle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StyleDraft {
    pub name: String,
    pub base: DeclarationBlock,
    pub variants: BTreeMap<String, DeclarationBlock>,
}

impl StyleDraft {
    pub fn from_entry(entry: &ClassIndexEntry) -> Self {
        Self {
            name: entry.name.clone(),
            base: entry.base_styles.clone(),
            variants: entry.variants.clone(),
        }
    }

    fn blocks_mut(&mut self) -> impl Iterator<Item = (Option<&str>, &mut DeclarationBlock)> {
        std::iter::once((None, &mut self.base)).chain(
            self.variants
                .iter_mut()
                .map(|(key, block)| (Some(key.as_str()), block)),
        )
    }
}

/// True when the declarations make the element a grid container.
pub(crate) fn declares_grid(block: &DeclarationBlock) -> bool {
    matches!(
        block.get("display").map(str::trim),
        Some("grid" | "inline-grid")
    ) || block.iter().any(|decl| decl.property.starts_with("grid-template-"))
}

/// Base spacing declarations written as a single `var(--token)` that
/// resolves to a length become fluid: the rem value times the base factor,
/// with medium, small and tiny variants at their own factors unless the
/// variant already sets the property. Returns a description per rewrite.
pub(crate) fn scale_spacing_tokens(
    draft: &mut StyleDraft,
    vars: &ResolvedVariables,
) -> Vec<String> {
    let mut scaled = Vec::new();
    let candidates: Vec<(String, String, f64)> = draft
        .base
        .iter()
        .filter(|decl| is_spacing_property(&decl.property))
        .filter_map(|decl| {
            let token = single_reference(&decl.value)?;
            let rem = length_to_rem(vars.get(token)?)?;
            Some((decl.property.clone(), token.to_string(), rem))
        })
        .collect();

    for (property, token, rem) in candidates {
        for (breakpoint, factor) in SPACING_SCALE {
            let value = format_rem(rem * factor);
            if breakpoint == Breakpoint::Base {
                draft.base.set(property.clone(), value);
                continue;
            }
            let variant = draft
                .variants
                .entry(breakpoint.key().to_string())
                .or_default();
            if !variant.contains(&property) {
                variant.set(property.clone(), value);
            }
        }
        scaled.push(format!(".{}: {property} scaled per breakpoint from {token}", draft.name));
    }
    scaled
}

/// Substitute `var()` in every block of the draft. Returns the names that
/// stayed unresolved.
pub(crate) fn resolve_draft_variables(
    draft: &mut StyleDraft,
    vars: &ResolvedVariables,
) -> Vec<String> {
    let mut unresolved = Vec::new();
    for (_, block) in draft.blocks_mut() {
        let resolution = resolve_variables_in_properties(block, vars);
        *block = resolution.block;
        for name in resolution.unresolved {
            if !unresolved.contains(&name) {
                unresolved.push(name);
            }
        }
    }
    unresolved
}

/// `opacity: 0` becomes `1` and `visibility: hidden` becomes `visible` in
/// every block. Returns a description per rewrite.
pub(crate) fn sanitize_visibility(draft: &mut StyleDraft) -> Vec<String> {
    let name = draft.name.clone();
    let mut fixes = Vec::new();
    for (key, block) in draft.blocks_mut() {
        let scope = key.map(|k| format!(" ({k})")).unwrap_or_default();
        for decl in block.iter_mut() {
            let value = decl.value.trim();
            if decl.property == "opacity" && is_zero(value) {
                decl.value = "1".to_string();
                fixes.push(format!(".{name}{scope}: opacity 0 -> 1"));
            } else if decl.property == "visibility" && value.eq_ignore_ascii_case("hidden") {
                decl.value = "visible".to_string();
                fixes.push(format!(".{name}{scope}: visibility hidden -> visible"));
            }
        }
    }
    fixes
}

/// Grids with three or more columns and no small/tiny column override get a
/// three-column small variant and a one-column tiny variant.
pub(crate) fn apply_grid_responsive_fix(draft: &mut StyleDraft) -> Option<String> {
    let columns = draft
        .base
        .get("grid-template-columns")
        .map(count_grid_columns)?;
    if columns < 3 {
        return None;
    }
    let overridden = [Breakpoint::Small, Breakpoint::Tiny].iter().any(|bp| {
        draft
            .variants
            .get(bp.key())
            .is_some_and(|block| block.contains("grid-template-columns"))
    });
    if overridden {
        return None;
    }
    draft
        .variants
        .entry(Breakpoint::Small.key().to_string())
        .or_default()
        .set("grid-template-columns", "repeat(3, 1fr)");
    draft
        .variants
        .entry(Breakpoint::Tiny.key().to_string())
        .or_default()
        .set("grid-template-columns", "1fr");
    Some(format!(
        ".{}: {columns}-column grid gets small (3 columns) and tiny (1 column) variants",
        draft.name
    ))
}

/// Number of explicit tracks in a `grid-template-columns` value.
/// `repeat(auto-fill, ...)` counts as zero.
pub(crate) fn count_grid_columns(value: &str) -> usize {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut count = 0usize;
    for token in value_tokens(&normalized) {
        if token.starts_with('[') {
            continue;
        }
        if let Some(args) = token
            .strip_prefix("repeat(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let Some((times, tracks)) = args.split_once(',') else {
                continue;
            };
            let per_repeat = value_tokens(tracks)
                .iter()
                .filter(|t| !t.starts_with('['))
                .count();
            let times = times.trim().parse::<usize>().unwrap_or(0);
            count = count.saturating_add(times.saturating_mul(per_repeat));
        } else {
            count = count.saturating_add(1);
        }
    }
    count
}

/// Re-run `var()` substitution over every style string of an emitted
/// graph, variants included. Used after patches land, since patch values may
/// reference tokens. Returns the names that stayed unresolved.
pub fn resolve_graph_variables(graph: &mut XscpData, vars: &ResolvedVariables) -> Vec<String> {
    let mut unresolved = Vec::new();
    let mut resolve = |less: &mut String| {
        if !less.contains("var(") {
            return;
        }
        let resolution = resolve_variables_in_properties(&DeclarationBlock::from_less(less), vars);
        *less = resolution.block.to_less();
        for name in resolution.unresolved {
            if !unresolved.contains(&name) {
                unresolved.push(name);
            }
        }
    };
    for style in &mut graph.payload.styles {
        resolve(&mut style.style_less);
        for variant in style.variants.values_mut() {
            resolve(&mut variant.style_less);
        }
    }
    unresolved
}

fn is_zero(value: &str) -> bool {
    value
        .trim_end_matches('%')
        .parse::<f64>()
        .is_ok_and(|v| v == 0.0)
}

fn length_to_rem(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse::<f64>().ok().map(|px| px / 16.0);
    }
    if let Some(rem) = value.strip_suffix("rem") {
        return rem.trim().parse::<f64>().ok();
    }
    None
}

fn format_rem(value: f64) -> String {
    let rounded = format!("{value:.4}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        return "0rem".to_string();
    }
    format!("{trimmed}rem")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::CssVariableMap;

    fn draft(base: &str) -> StyleDraft {
        StyleDraft {
            name: "x".to_string(),
            base: DeclarationBlock::parse(base),
            variants: BTreeMap::new(),
        }
    }

    #[test]
    fn spacing_tokens_scale_per_breakpoint() {
        let mut map = CssVariableMap::new();
        map.define("--space-lg", "32px");
        let vars = map.resolve();
        let mut d = draft("gap: var(--space-lg); color: var(--space-lg)");
        d.variants
            .insert("small".into(), DeclarationBlock::parse("gap: 4px"));

        assert_eq!(
            scale_spacing_tokens(&mut d, &vars),
            vec![".x: gap scaled per breakpoint from --space-lg".to_string()]
        );
        assert_eq!(d.base.get("gap"), Some("2.2rem"));
        assert_eq!(d.variants["medium"].get("gap"), Some("2rem"));
        assert_eq!(d.variants["small"].get("gap"), Some("4px"));
        assert_eq!(d.variants["tiny"].get("gap"), Some("1.7rem"));
        assert_eq!(d.base.get("color"), Some("var(--space-lg)"));
    }

    #[test]
    fn visibility_is_forced_on_in_every_block() {
        let mut d = draft("opacity: 0; visibility: hidden");
        d.variants
            .insert("hover".into(), DeclarationBlock::parse("opacity: 0.0"));
        let fixes = sanitize_visibility(&mut d);
        assert_eq!(fixes.len(), 3);
        assert_eq!(d.base.get("opacity"), Some("1"));
        assert_eq!(d.base.get("visibility"), Some("visible"));
        assert_eq!(d.variants["hover"].get("opacity"), Some("1"));
    }

    #[test]
    fn wide_grids_get_small_and_tiny_columns() {
        let mut d = draft("display: grid; grid-template-columns: repeat(4, 1fr)");
        assert!(apply_grid_responsive_fix(&mut d).is_some());
        assert_eq!(
            d.variants["small"].get("grid-template-columns"),
            Some("repeat(3, 1fr)")
        );
        assert_eq!(d.variants["tiny"].get("grid-template-columns"), Some("1fr"));

        let mut narrow = draft("grid-template-columns: 1fr 2fr");
        assert!(apply_grid_responsive_fix(&mut narrow).is_none());

        let mut overridden = draft("grid-template-columns: 1fr 1fr 1fr");
        overridden.variants.insert(
            "tiny".into(),
            DeclarationBlock::parse("grid-template-columns: 1fr"),
        );
        assert!(apply_grid_responsive_fix(&mut overridden).is_none());
        assert!(!overridden.variants.contains_key("small"));
    }

    #[test]
    fn column_counting() {
        assert_eq!(count_grid_columns("repeat(4, 1fr)"), 4);
        assert_eq!(count_grid_columns("200px 1fr [end] 1fr"), 3);
        assert_eq!(count_grid_columns("repeat(2, 1fr 2fr) 100px"), 5);
        assert_eq!(count_grid_columns("repeat(auto-fill, minmax(200px, 1fr))"), 0);
        assert_eq!(count_grid_columns("repeat(18446744073709551615, 1fr 1fr) 1fr"), usize::MAX);
    }

    #[test]
    fn graph_styles_are_re_resolved() {
        let mut map = CssVariableMap::new();
        map.define("--brand", "#0af");
        let vars = map.resolve();
        let mut graph = XscpData::default();
        let mut style = crate::graph::TargetStyle::new("wf-class-a", "a");
        style.style_less = "color: var(--brand); border-color: var(--nope);".into();
        style.variants.insert(
            "hover".into(),
            crate::graph::StyleVariant {
                style_less: "color: var(--brand, red);".into(),
            },
        );
        graph.payload.styles.push(style);

        let unresolved = resolve_graph_variables(&mut graph, &vars);
        assert_eq!(unresolved, vec!["--nope".to_string()]);
        let style = &graph.payload.styles[0];
        assert_eq!(style.style_less, "color: #0af; border-color: var(--nope);");
        assert_eq!(style.variants["hover"].style_less, "color: #0af;");

        let before = graph.clone();
        resolve_graph_variables(&mut graph, &vars);
        assert_eq!(graph, before);
    }
}
