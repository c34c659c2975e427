//! Splits a stylesheet into CSS the target can hold as native style objects
//! and CSS that has to ship as a literal embed block.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error, warn};
use weft_config::PipelineConfig;

use super::media::{Breakpoint, classify_media};
use super::parser::{AtRuleBlock, CssItem, StyleRule, minify_css, parse_stylesheet};
use super::selector::{Combinator, analyze_selector, is_supported_pseudo_class};
use super::variables::{CssVariableMap, ResolvedVariables, resolve_variables_in_properties};
use crate::warning::{Warning, WarningKind};

/// Properties that always ship in the embed, prefixed or not.
pub const ALWAYS_EMBED_PROPERTIES: &[&str] = &[
    "background-clip",
    "-webkit-background-clip",
    "text-fill-color",
    "-webkit-text-fill-color",
    "-webkit-appearance",
    "appearance",
    "-webkit-text-stroke",
    "-webkit-mask",
];

/// At-rules that are embedded whole.
const EMBED_AT_RULES: &[&str] = &[
    "keyframes",
    "font-face",
    "supports",
    "layer",
    "charset",
    "import",
    "namespace",
    "page",
    "property",
    "container",
    "counter-style",
    "font-feature-values",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedReason {
    AtRule,
    RootRule,
    NonStandardMedia,
    DescendantSelector,
    CompoundSelector,
    PseudoElement,
    ComplexPseudoClass,
    AttributeSelector,
    Combinator,
    IdSelector,
    BareElementSelector,
    VendorPrefix,
    AlwaysEmbedProperty,
}

/// Classification of one rule or at-rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    /// Selector list, or `@name prelude` for at-rules
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    pub needs_embed: bool,
    pub reasons: Vec<EmbedReason>,
}

impl RoutingDecision {
    fn embed(subject: String, media: Option<String>, reasons: Vec<EmbedReason>) -> Self {
        Self {
            subject,
            media,
            needs_embed: true,
            reasons,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    pub embed_warn_bytes: usize,
    pub embed_error_bytes: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            embed_warn_bytes: 40 * 1024,
            embed_error_bytes: 50 * 1024,
        }
    }
}

impl From<&PipelineConfig> for RouterOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            embed_warn_bytes: config.embed_warn_bytes,
            embed_error_bytes: config.embed_error_bytes,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutedCss {
    /// One rule per line, variables resolved, media queries restored
    pub native: String,
    /// Minified, grouped by breakpoint, variables intact
    pub embed: String,
    pub decisions: Vec<RoutingDecision>,
    pub embed_bytes: usize,
    pub warnings: Vec<Warning>,
    pub unresolved: Vec<String>,
}

/// Embed text collected per breakpoint before it is labeled and minified.
#[derive(Default)]
struct EmbedGroups {
    groups: BTreeMap<Breakpoint, Vec<String>>,
}

impl EmbedGroups {
    fn push(&mut self, breakpoint: Breakpoint, css: String) {
        self.groups.entry(breakpoint).or_default().push(css);
    }

    fn push_in_media(&mut self, breakpoint: Breakpoint, query: &str, css: String) {
        self.push(breakpoint, format!("@media {query} {{ {css} }}"));
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for breakpoint in Breakpoint::ORDER {
            let Some(chunks) = self.groups.get(&breakpoint) else {
                continue;
            };
            let body = minify_css(&chunks.join("\n"));
            if body.is_empty() {
                continue;
            }
            out.push_str(&format!("/* {} */\n{}\n", breakpoint.key(), body));
        }
        out
    }
}

pub fn route_css(css: &str, options: &RouterOptions) -> RoutedCss {
    let sheet = parse_stylesheet(css);
    let resolved = CssVariableMap::from_stylesheet(&sheet).resolve();

    let mut routed = RoutedCss::default();
    let mut embed = EmbedGroups::default();
    let mut native_lines: Vec<String> = Vec::new();

    for item in &sheet.items {
        match item {
            CssItem::AtRule(at) => {
                routed.decisions.push(at_rule_decision(at, None));
                embed.push(Breakpoint::Base, at.raw.clone());
            }
            CssItem::Rule(rule) => {
                let decision = classify_rule(rule, None);
                if decision.needs_embed {
                    embed.push(Breakpoint::Base, rule.raw.clone());
                } else {
                    native_lines.push(render_native(rule, &resolved, &mut routed.unresolved));
                }
                routed.decisions.push(decision);
            }
            CssItem::Media(media) => {
                let Some(breakpoint) = classify_media(&media.query) else {
                    routed.decisions.push(RoutingDecision::embed(
                        format!("@media {}", media.query),
                        Some(media.query.clone()),
                        vec![EmbedReason::NonStandardMedia],
                    ));
                    embed.push(Breakpoint::Base, media.raw.clone());
                    continue;
                };
                let mut native_in_media = Vec::new();
                for rule in &media.rules {
                    let decision = classify_rule(rule, Some(&media.query));
                    if decision.needs_embed {
                        embed.push_in_media(breakpoint, &media.query, rule.raw.clone());
                    } else {
                        native_in_media.push(format!(
                            "  {}",
                            render_native(rule, &resolved, &mut routed.unresolved)
                        ));
                    }
                    routed.decisions.push(decision);
                }
                for nested in &media.nested {
                    routed
                        .decisions
                        .push(at_rule_decision(nested, Some(&media.query)));
                    embed.push_in_media(breakpoint, &media.query, nested.raw.clone());
                }
                if !native_in_media.is_empty() {
                    native_lines.push(format!(
                        "@media {} {{\n{}\n}}",
                        media.query,
                        native_in_media.join("\n")
                    ));
                }
            }
        }
    }

    routed.native = if native_lines.is_empty() {
        String::new()
    } else {
        native_lines.join("\n") + "\n"
    };
    routed.embed = embed.render();
    routed.embed_bytes = routed.embed.len();

    for name in &routed.unresolved {
        warn!(variable = %name, "unresolved custom property in native CSS");
        routed.warnings.push(Warning::new(
            WarningKind::UnresolvedVariable,
            format!("var({name}) has no definition or fallback"),
        ));
    }
    check_embed_size(&mut routed, options);
    check_embed_syntax(&mut routed);

    debug!(
        native_bytes = routed.native.len(),
        embed_bytes = routed.embed_bytes,
        decisions = routed.decisions.len(),
        "routed stylesheet"
    );
    routed
}

fn at_rule_decision(at: &AtRuleBlock, media: Option<&str>) -> RoutingDecision {
    if !EMBED_AT_RULES.contains(&base_at_rule_name(&at.name)) {
        debug!(at_rule = %at.name, "unknown at-rule kept in embed");
    }
    RoutingDecision::embed(
        format!("@{} {}", at.name, at.prelude).trim().to_string(),
        media.map(str::to_string),
        vec![EmbedReason::AtRule],
    )
}

/// `-webkit-keyframes` and friends classify like `keyframes`.
fn base_at_rule_name(name: &str) -> &str {
    if let Some(rest) = name.strip_prefix('-') {
        if let Some((_, base)) = rest.split_once('-') {
            return base;
        }
    }
    name
}

/// Decide whether one style rule can stay native. Reasons are collected
/// over every selector in the list and every declaration, without repeats.
pub fn classify_rule(rule: &StyleRule, media: Option<&str>) -> RoutingDecision {
    let mut reasons: Vec<EmbedReason> = Vec::new();
    let mut add = |reason: EmbedReason| {
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    };

    for selector in &rule.selectors {
        if selector.trim() == ":root" {
            add(EmbedReason::RootRule);
            continue;
        }
        let analysis = analyze_selector(selector);
        for combinator in &analysis.combinators {
            match combinator {
                Combinator::Descendant => add(EmbedReason::DescendantSelector),
                _ => add(EmbedReason::Combinator),
            }
        }
        let total_pseudo = analysis.pseudo_classes().count();
        for compound in &analysis.compounds {
            if compound.is_compound() {
                add(EmbedReason::CompoundSelector);
            }
            if !compound.pseudo_elements.is_empty() {
                add(EmbedReason::PseudoElement);
            }
            if !compound.attributes.is_empty() {
                add(EmbedReason::AttributeSelector);
            }
            if !compound.ids.is_empty() {
                add(EmbedReason::IdSelector);
            }
            if compound.classes.is_empty() && compound.ids.is_empty() {
                add(EmbedReason::BareElementSelector);
            }
            if compound
                .pseudo_classes
                .iter()
                .any(|pseudo| total_pseudo > 1 || !is_supported_pseudo_class(pseudo))
            {
                add(EmbedReason::ComplexPseudoClass);
            }
        }
        if analysis.compounds.is_empty() {
            add(EmbedReason::BareElementSelector);
        }
    }

    for decl in rule.declarations.iter() {
        if ALWAYS_EMBED_PROPERTIES.contains(&decl.property.as_str()) {
            add(EmbedReason::AlwaysEmbedProperty);
        } else if decl.property.starts_with('-') && !decl.property.starts_with("--") {
            add(EmbedReason::VendorPrefix);
        }
    }

    RoutingDecision {
        subject: rule.selector_text.clone(),
        media: media.map(str::to_string),
        needs_embed: !reasons.is_empty(),
        reasons,
    }
}

fn render_native(
    rule: &StyleRule,
    resolved: &ResolvedVariables,
    unresolved: &mut Vec<String>,
) -> String {
    let resolution = resolve_variables_in_properties(&rule.declarations, resolved);
    for name in resolution.unresolved {
        if !unresolved.contains(&name) {
            unresolved.push(name);
        }
    }
    format!(
        "{} {{ {} }}",
        rule.selectors.join(", "),
        resolution.block.to_css_body()
    )
}

fn check_embed_size(routed: &mut RoutedCss, options: &RouterOptions) {
    let bytes = routed.embed_bytes;
    if bytes > options.embed_error_bytes {
        error!(bytes, limit = options.embed_error_bytes, "embed CSS exceeds hard size limit");
        routed.warnings.push(Warning::error(
            WarningKind::EmbedSize,
            format!(
                "embed CSS is {bytes} bytes, over the {} byte limit",
                options.embed_error_bytes
            ),
        ));
    } else if bytes > options.embed_warn_bytes {
        warn!(bytes, limit = options.embed_warn_bytes, "embed CSS is close to the size limit");
        routed.warnings.push(Warning::new(
            WarningKind::EmbedSize,
            format!(
                "embed CSS is {bytes} bytes, over the {} byte warning threshold",
                options.embed_warn_bytes
            ),
        ));
    }
}

#[cfg(feature = "embed-check")]
fn check_embed_syntax(routed: &mut RoutedCss) {
    use lightningcss::stylesheet::{ParserOptions, StyleSheet};

    if routed.embed.is_empty() {
        return;
    }
    if let Err(err) = StyleSheet::parse(&routed.embed, ParserOptions::default()) {
        warn!(error = %err, "embed CSS did not parse");
        routed.warnings.push(Warning::new(
            WarningKind::EmbedParse,
            format!("embed CSS did not parse: {err}"),
        ));
    }
}

#[cfg(not(feature = "embed-check"))]
fn check_embed_syntax(_routed: &mut RoutedCss) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons_for(css: &str) -> Vec<EmbedReason> {
        let sheet = parse_stylesheet(css);
        match &sheet.items[0] {
            CssItem::Rule(rule) => classify_rule(rule, None).reasons,
            other => panic!("expected a rule, got {other:?}"),
        }
    }

    #[test]
    fn plain_class_rules_stay_native() {
        assert!(reasons_for(".card { padding: 8px }").is_empty());
        assert!(reasons_for(".card:hover { color: red }").is_empty());
    }

    #[test]
    fn selector_shapes_force_embed() {
        assert_eq!(reasons_for(".a .b { color: red }"), vec![EmbedReason::DescendantSelector]);
        assert_eq!(reasons_for(".a > .b { color: red }"), vec![EmbedReason::Combinator]);
        assert_eq!(reasons_for(".a.b { color: red }"), vec![EmbedReason::CompoundSelector]);
        assert_eq!(reasons_for(".a::before { content: '' }"), vec![EmbedReason::PseudoElement]);
        assert_eq!(reasons_for("#hero { color: red }"), vec![EmbedReason::IdSelector]);
        assert_eq!(reasons_for("h1 { color: red }"), vec![EmbedReason::BareElementSelector]);
        assert_eq!(reasons_for("* { margin: 0 }"), vec![EmbedReason::BareElementSelector]);
        assert_eq!(
            reasons_for(".a:nth-child(2n) { color: red }"),
            vec![EmbedReason::ComplexPseudoClass]
        );
        assert!(reasons_for("[data-x] { color: red }").contains(&EmbedReason::AttributeSelector));
    }

    #[test]
    fn prefixed_and_listed_properties_force_embed() {
        assert_eq!(
            reasons_for(".t { -webkit-background-clip: text; color: red }"),
            vec![EmbedReason::AlwaysEmbedProperty]
        );
        assert_eq!(
            reasons_for(".t { -moz-user-select: none }"),
            vec![EmbedReason::VendorPrefix]
        );
        assert!(reasons_for(".t { --local: 1px }").is_empty());
    }

    #[test]
    fn embed_groups_follow_breakpoint_order() {
        let routed = route_css(
            r#"
            @media (min-width: 1280px) { .a::after { content: 'x' } }
            @media (max-width: 479px) { .a .b { color: red } }
            :root { --brand: red; }
            @media (max-width: 991px) { .a > .b { color: blue } }
            "#,
            &RouterOptions::default(),
        );
        let base = routed.embed.find("/* base */").unwrap();
        let medium = routed.embed.find("/* medium */").unwrap();
        let tiny = routed.embed.find("/* tiny */").unwrap();
        let xlarge = routed.embed.find("/* xlarge */").unwrap();
        assert!(base < medium && medium < tiny && tiny < xlarge);
        assert!(routed.embed.contains(":root{--brand:red}"));
        assert!(routed.native.is_empty());
    }

    #[test]
    fn native_rules_resolve_variables_and_keep_media() {
        let routed = route_css(
            ":root { --gap: 12px } .row { gap: var(--gap) } @media (max-width: 767px) { .row { gap: var(--gap-sm) } }",
            &RouterOptions::default(),
        );
        assert!(routed.native.contains(".row { gap: 12px }"));
        assert!(routed.native.contains("@media (max-width: 767px) {\n  .row { gap: var(--gap-sm) }\n}"));
        assert_eq!(routed.unresolved, vec!["--gap-sm".to_string()]);
        assert!(routed
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::UnresolvedVariable));
    }

    #[test]
    fn non_standard_media_is_embedded_verbatim() {
        let routed = route_css(
            "@media (prefers-reduced-motion: reduce) { .a { animation: none } }",
            &RouterOptions::default(),
        );
        assert!(routed.native.is_empty());
        assert!(routed.embed.contains("@media (prefers-reduced-motion:reduce){.a{animation:none}}"));
        assert_eq!(routed.decisions[0].reasons, vec![EmbedReason::NonStandardMedia]);
    }

    #[test]
    fn oversize_embed_is_reported_not_blocked() {
        let big: String = (0..200)
            .map(|i| format!(".c{i}::before {{ content: '{}' }}\n", "x".repeat(60)))
            .collect();
        let routed = route_css(
            &big,
            &RouterOptions {
                embed_warn_bytes: 1_000,
                embed_error_bytes: 100_000,
            },
        );
        let size = routed
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::EmbedSize)
            .unwrap();
        assert_eq!(size.severity, crate::warning::Severity::Warning);

        let routed = route_css(
            &big,
            &RouterOptions {
                embed_warn_bytes: 500,
                embed_error_bytes: 1_000,
            },
        );
        assert!(routed
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::EmbedSize
                && w.severity == crate::warning::Severity::Error));
    }
}
