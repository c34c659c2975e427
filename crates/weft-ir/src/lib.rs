//! Transcoding core: static HTML + CSS into the page builder's clipboard graph.
//!
//! The stages run leaves first:
//!
//! 1. [`html`] parses markup into an [`html::ElementNode`] tree.
//! 2. [`css`] parses the stylesheet, builds the class index and variable map,
//!    and routes every rule into native or embed output.
//! 3. [`graph`] emits the node/style graph ([`graph::XscpData`]).
//! 4. [`diagnostics`] compares source and output; [`logic`] applies typed
//!    patches; [`repair`] asks the semantic repair service for the patches the
//!    deterministic pass cannot derive.
//! 5. [`pipeline`] drives the whole run.
//!
//! [`schema`] holds the embedded JSON schemas for the repair response and
//! the clipboard document.

pub mod css;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod html;
pub mod logic;
pub mod pipeline;
pub mod repair;
pub mod schema;
pub mod warning;

pub use css::{ClassIndex, CssVariableMap, RoutedCss, route_css};
pub use diagnostics::{DeterministicFix, DiagnosticReport, Diagnostics, Finding};
pub use error::WeftError;
pub use graph::{GraphBuilder, TargetNode, TargetStyle, XscpData};
pub use html::{ElementNode, parse_html};
pub use logic::{PatchInstruction, apply_patches};
pub use pipeline::{RunState, Status, TranscodeOutput, TranscodeReport, Transcoder};
pub use repair::{NoAssistant, RepairError, RepairLoop, RepairRequest, SemanticAssistant};
pub use warning::{Severity, Warning, WarningKind};
