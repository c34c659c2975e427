//! One transcoding run from markup and stylesheet to clipboard graph.
//!
//! `Parsed -> Deterministic -> RepairAttempted -> Reconciled`. The repair
//! step only happens when diagnostics ask for it and an assistant is
//! configured. Nothing here returns an error: every failure ends up as a
//! warning or a report line.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};
use weft_config::{PipelineConfig, StyleScopeMode};

use crate::css::{ClassIndex, ResolvedVariables, RoutedCss, RouterOptions, route_css};
use crate::diagnostics::{DiagnosticReport, Diagnostics};
use crate::error::WeftError;
use crate::graph::{BuildOptions, GraphBuilder, XscpData, random_prefix, resolve_graph_variables};
use crate::html::{ElementNode, HtmlBackend, parse_html_with};
use crate::logic::{PatchInstruction, apply_patches};
use crate::repair::{NoAssistant, RepairContext, RepairLoop, SemanticAssistant, translate_response};
use crate::warning::{Warning, WarningKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Parsed,
    Deterministic,
    RepairAttempted,
    Reconciled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeReport {
    pub status: Status,
    pub deterministic_fixes: Vec<String>,
    pub semantic_fixes: Vec<String>,
    pub claude_reasons: Vec<String>,
    pub remaining_issues: Vec<String>,
}

impl TranscodeReport {
    fn new(
        deterministic_fixes: Vec<String>,
        semantic_fixes: Vec<String>,
        claude_reasons: Vec<String>,
        remaining_issues: Vec<String>,
    ) -> Self {
        let status = if remaining_issues.is_empty() {
            Status::Pass
        } else {
            Status::Fail
        };
        Self {
            status,
            deterministic_fixes,
            semantic_fixes,
            claude_reasons,
            remaining_issues,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    /// `None` only when the markup held no element
    pub data: Option<XscpData>,
    pub routed: RoutedCss,
    pub report: TranscodeReport,
    pub diagnostics: DiagnosticReport,
    pub warnings: Vec<Warning>,
    /// States the run went through, in order
    pub trail: Vec<RunState>,
    pub prefix: String,
}

impl TranscodeOutput {
    pub fn state(&self) -> RunState {
        self.trail.last().copied().unwrap_or(RunState::Parsed)
    }

    pub fn repair_attempted(&self) -> bool {
        self.trail.contains(&RunState::RepairAttempted)
    }
}

/// Everything a run holds between the deterministic half and the end.
struct Run {
    source: ElementNode,
    index: ClassIndex,
    vars: ResolvedVariables,
    data: XscpData,
    routed: RoutedCss,
    diagnostics: Diagnostics,
    report: DiagnosticReport,
    warnings: Vec<Warning>,
    deterministic_fixes: Vec<String>,
    trail: Vec<RunState>,
}

enum Begun {
    Ready(Box<Run>),
    Finished(Box<TranscodeOutput>),
}

/// Drives runs with one configuration. Reusable and shareable across
/// threads; each run owns its own state.
pub struct Transcoder<A = NoAssistant> {
    config: PipelineConfig,
    prefix: String,
    backend: HtmlBackend,
    repair: Option<RepairLoop<A>>,
}

impl Transcoder<NoAssistant> {
    /// Deterministic passes only.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::build(config, None)
    }
}

impl<A: SemanticAssistant> Transcoder<A> {
    pub fn with_repair(config: &PipelineConfig, repair: RepairLoop<A>) -> Self {
        Self::build(config, Some(repair))
    }

    fn build(config: &PipelineConfig, repair: Option<RepairLoop<A>>) -> Self {
        let prefix = config
            .id_prefix
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(random_prefix);
        Self {
            config: config.clone(),
            prefix,
            backend: HtmlBackend::default(),
            repair,
        }
    }

    pub fn with_backend(mut self, backend: HtmlBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full run, repair included when needed and available.
    pub async fn transcode(&self, html: &str, css: &str) -> TranscodeOutput {
        let mut run = match self.begin(html, css) {
            Begun::Ready(run) => run,
            Begun::Finished(output) => return *output,
        };
        let mut semantic_fixes = Vec::new();
        let mut reasons = Vec::new();
        let mut extra_issues = Vec::new();

        let wanted = run
            .diagnostics
            .should_invoke_repair(&run.report, &run.source, &run.data);
        if let (true, Some(repair)) = (wanted, self.repair.as_ref()) {
            run.trail.push(RunState::RepairAttempted);
            let graph_json = match run.data.to_json_pretty().map_err(WeftError::from) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "graph could not be serialized for repair");
                    String::new()
                }
            };
            let issues = run.report.issues();
            let diagnostics = if issues.is_empty() {
                "No direct findings. Classes used more than once have no spacing in their emitted style.".to_string()
            } else {
                issues.join("\n")
            };
            let context = RepairContext {
                html,
                css,
                graph_json: &graph_json,
                diagnostics: &diagnostics,
            };
            let attempt = repair.run(&context).await;
            match attempt.response {
                Some(response) => {
                    let translation = translate_response(
                        &response,
                        &run.data,
                        &run.report.phantom_ids(),
                        &self.prefix,
                    );
                    for rejected in translation.rejected {
                        run.warnings
                            .push(Warning::new(WarningKind::RejectedPatch, rejected));
                    }
                    semantic_fixes = self.apply(&mut run, &translation.patches);
                    reasons = response.reasons;
                }
                None => {
                    let detail = attempt
                        .failures
                        .last()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    warn!(calls = attempt.calls, error = %detail, "semantic repair abandoned");
                    let message = format!(
                        "semantic repair failed after {} call(s): {detail}",
                        attempt.calls
                    );
                    run.warnings
                        .push(Warning::error(WarningKind::RepairFailed, message.clone()));
                    extra_issues.push(message);
                }
            }
        }
        self.finish(*run, semantic_fixes, reasons, extra_issues)
    }

    /// The synchronous half on its own: parse, route, build and the
    /// deterministic fixes. Never calls the repair service.
    pub fn transcode_deterministic(&self, html: &str, css: &str) -> TranscodeOutput {
        match self.begin(html, css) {
            Begun::Ready(run) => self.finish(*run, Vec::new(), Vec::new(), Vec::new()),
            Begun::Finished(output) => *output,
        }
    }

    fn begin(&self, html: &str, css: &str) -> Begun {
        let parsed = parse_html_with(html, self.backend);
        let mut warnings = parsed.warnings;
        let routed = route_css(css, &RouterOptions::from(&self.config));
        warnings.extend(routed.warnings.iter().cloned());

        let Some(source) = parsed.root else {
            warn!("markup has no root element");
            let remaining = vec![WeftError::NoRoot.to_string()];
            return Begun::Finished(Box::new(TranscodeOutput {
                data: None,
                routed,
                report: TranscodeReport::new(Vec::new(), Vec::new(), Vec::new(), remaining),
                diagnostics: DiagnosticReport::default(),
                warnings,
                trail: vec![RunState::Parsed],
                prefix: self.prefix.clone(),
            }));
        };

        let index = ClassIndex::from_css(css);
        let vars = index.variables().resolve();
        let built = GraphBuilder::new(&index, &vars, BuildOptions::from_config(&self.config, self.prefix.clone()))
            .build(&source);
        warnings.extend(built.warnings);

        let diagnostics = Diagnostics::new(self.prefix.clone())
            .with_established(self.established())
            .with_variables(vars.clone());
        let mut run = Run {
            source,
            index,
            vars,
            data: built.data,
            routed,
            diagnostics,
            report: DiagnosticReport::default(),
            warnings,
            deterministic_fixes: built.fixes,
            trail: vec![RunState::Parsed, RunState::Deterministic],
        };

        let fixes = run
            .diagnostics
            .deterministic_fixes(&run.source, &run.index, &run.data);
        let patches: Vec<PatchInstruction> = fixes.iter().map(|fix| fix.patch.clone()).collect();
        let outcome = apply_patches(&mut run.data, &patches, &self.prefix);
        if outcome.skipped.is_empty() {
            run.deterministic_fixes
                .extend(fixes.into_iter().map(|fix| fix.description));
        } else {
            run.deterministic_fixes.extend(outcome.applied);
        }
        self.reresolve(&mut run);
        run.report = run.diagnostics.diagnose(&run.source, &run.index, &run.data);
        Begun::Ready(Box::new(run))
    }

    fn apply(&self, run: &mut Run, patches: &[PatchInstruction]) -> Vec<String> {
        let outcome = apply_patches(&mut run.data, patches, &self.prefix);
        for err in outcome.skipped {
            run.warnings
                .push(Warning::new(WarningKind::RejectedPatch, err.to_string()));
        }
        self.reresolve(run);
        outcome.applied
    }

    fn reresolve(&self, run: &mut Run) {
        for name in resolve_graph_variables(&mut run.data, &run.vars) {
            let already = run
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::UnresolvedVariable && w.message.contains(&name));
            if !already {
                run.warnings.push(Warning::new(
                    WarningKind::UnresolvedVariable,
                    format!("var({name}) has no definition or fallback"),
                ));
            }
        }
    }

    fn finish(
        &self,
        mut run: Run,
        semantic_fixes: Vec<String>,
        reasons: Vec<String>,
        extra_issues: Vec<String>,
    ) -> TranscodeOutput {
        let final_report = run.diagnostics.diagnose(&run.source, &run.index, &run.data);
        run.trail.push(RunState::Reconciled);
        let mut remaining = final_report.issues();
        remaining.extend(extra_issues);
        let report = TranscodeReport::new(run.deterministic_fixes, semantic_fixes, reasons, remaining);
        info!(
            status = ?report.status,
            nodes = run.data.payload.nodes.len(),
            styles = run.data.payload.styles.len(),
            warnings = run.warnings.len(),
            remaining = report.remaining_issues.len(),
            "transcode finished"
        );
        TranscodeOutput {
            data: Some(run.data),
            routed: run.routed,
            report,
            diagnostics: final_report,
            warnings: run.warnings,
            trail: run.trail,
            prefix: self.prefix.clone(),
        }
    }

    fn established(&self) -> BTreeSet<String> {
        match self.config.style_scope {
            StyleScopeMode::Component => BTreeSet::new(),
            StyleScopeMode::Incremental => self.config.established_classes.clone(),
        }
    }
}
