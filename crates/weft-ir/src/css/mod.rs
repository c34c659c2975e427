//! Stylesheet front end: parsing, class index, custom properties and routing.

mod class_index;
mod declarations;
mod media;
mod parser;
mod router;
mod selector;
mod variables;

pub use class_index::{ClassIndex, ClassIndexEntry, build_class_index, variant_key};
pub use declarations::{Declaration, DeclarationBlock};
pub use media::{Breakpoint, classify_media};
pub use parser::{
    AtRuleBlock, CssItem, MediaBlock, StyleRule, StyleSheet, minify_css, parse_stylesheet,
    strip_css_comments,
};
pub use router::{
    ALWAYS_EMBED_PROPERTIES, EmbedReason, RoutedCss, RouterOptions, RoutingDecision,
    classify_rule, route_css,
};
pub use selector::{
    Combinator, Compound, PseudoClass, SUPPORTED_PSEUDO_CLASSES, SelectorAnalysis,
    analyze_selector, split_selector_list,
};
pub use variables::{
    CYCLE_VALUE, CssVariableMap, Resolution, ResolvedVariables, extract_variables, references,
    resolve_variables_in_properties, single_reference,
};

pub(crate) use variables::value_tokens;
