use std::sync::Mutex;

use anyhow::{Context, Result};
use weft_config::{PipelineConfig, RepairConfig};
use weft_ir::{
    RepairError, RepairLoop, RepairRequest, RunState, SemanticAssistant, Status, Transcoder,
    WarningKind,
};

/// Returns canned replies in order.
struct Canned {
    replies: Mutex<Vec<String>>,
}

impl Canned {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        }
    }
}

impl SemanticAssistant for Canned {
    async fn complete(&self, _request: &RepairRequest) -> Result<String, RepairError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(RepairError::Transport("no more replies".into()));
        }
        Ok(replies.remove(0))
    }
}

const HTML: &str = r#"<div class="wrap"><div class="tile">a</div><div class="tile">b</div></div>"#;
const CSS: &str = ":root { --space: 8px } .wrap { padding: 4px } .tile { color: red }";

fn pipeline() -> PipelineConfig {
    PipelineConfig {
        id_prefix: Some("wf".to_string()),
        ..PipelineConfig::default()
    }
}

fn repair_config() -> RepairConfig {
    RepairConfig {
        timeout_secs: 5,
        ..RepairConfig::default()
    }
}

#[tokio::test]
async fn repair_patches_apply_and_non_phantom_removals_are_refused() -> Result<()> {
    let reply = r#"{
        "reasons": ["tiles have no spacing"],
        "styleFixes": [{"className":"tile","category":"spacing","variant":null,
                        "properties":{"padding":"var(--space)"},"reason":"separate tiles"}],
        "parentChildFixes": [],
        "phantomRemovals": [{"nodeId":"wf-tile-2","reason":"duplicate"}]
    }"#;
    let transcoder = Transcoder::with_repair(&pipeline(), RepairLoop::new(&repair_config(), Canned::new(&[reply])));
    let out = transcoder.transcode(HTML, CSS).await;

    assert_eq!(
        out.trail,
        vec![
            RunState::Parsed,
            RunState::Deterministic,
            RunState::RepairAttempted,
            RunState::Reconciled
        ]
    );
    assert_eq!(out.report.status, Status::Pass, "{:?}", out.report);
    assert_eq!(out.report.claude_reasons, vec!["tiles have no spacing".to_string()]);
    assert_eq!(out.report.semantic_fixes, vec![".tile: set padding".to_string()]);

    let data = out.data.context("no graph")?;
    assert!(data.node("wf-tile-2").is_some(), "legitimate node must survive");
    assert_eq!(data.style_by_name("tile").context("tile style")?.style_less, "color: red; padding: 8px;");
    assert!(out.diagnostics.phantom.is_empty());
    assert!(out.warnings.iter().any(|w| w.kind == WarningKind::RejectedPatch));
    Ok(())
}

#[tokio::test]
async fn invalid_replies_fall_back_to_the_deterministic_graph() -> Result<()> {
    let assistant = Canned::new(&["I think it looks fine", r#"{"reasons": []}"#]);
    let transcoder = Transcoder::with_repair(&pipeline(), RepairLoop::new(&repair_config(), assistant));
    let deterministic = transcoder.transcode_deterministic(HTML, CSS);
    let out = transcoder.transcode(HTML, CSS).await;

    assert!(out.repair_attempted());
    assert_eq!(out.report.status, Status::Fail);
    assert_eq!(out.report.remaining_issues.len(), 1);
    assert!(out.report.remaining_issues[0].starts_with("semantic repair failed after 2 call(s)"));
    assert_eq!(out.data, deterministic.data);
    Ok(())
}

#[tokio::test]
async fn clean_input_never_calls_the_assistant() -> Result<()> {
    let transcoder = Transcoder::with_repair(
        &pipeline(),
        RepairLoop::new(&repair_config(), Canned::new(&[])),
    );
    let out = transcoder
        .transcode(r#"<p class="lead">Hi</p>"#, ".lead { margin: 0 0 8px }")
        .await;
    assert!(!out.repair_attempted());
    assert_eq!(out.report.status, Status::Pass);
    Ok(())
}
