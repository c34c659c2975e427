//! Semantic repair: asks an external assistant for the fixes the
//! deterministic pass cannot derive, validates the answer and turns it into
//! [`PatchInstruction`]s.
//!
//! The transport lives outside this crate behind [`SemanticAssistant`]; the
//! loop here owns the prompt, the timeout, the single corrective retry and
//! the translation rules.

mod prompt;
mod translate;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use weft_config::RepairConfig;

use crate::schema::semantic_response_errors;

pub use prompt::{RepairContext, SYSTEM_PROMPT, corrective_instruction, render_prompt, truncate_section};
pub use translate::{Translation, translate_response};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepairError {
    /// Connection or protocol failure below HTTP.
    #[error("repair transport failed: {0}")]
    Transport(String),

    #[error("repair service answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("repair call timed out after {0}s")]
    Timeout(u64),

    /// The reply held no parseable JSON object.
    #[error("repair response is not valid JSON: {0}")]
    Parse(String),

    #[error("repair response failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("no repair service is configured")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairMessage {
    pub role: Role,
    pub content: String,
}

impl RepairMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What goes over the wire: model identifier plus the conversation so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<RepairMessage>,
}

/// Outbound half of the repair loop. Implementations return the raw text of
/// the assistant's reply.
pub trait SemanticAssistant: Send + Sync {
    fn complete(&self, request: &RepairRequest) -> impl Future<Output = Result<String, RepairError>> + Send;
}

/// Assistant used when repair is disabled or unconfigured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssistant;

impl SemanticAssistant for NoAssistant {
    async fn complete(&self, _request: &RepairRequest) -> Result<String, RepairError> {
        Err(RepairError::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SemanticResponse {
    pub reasons: Vec<String>,
    pub style_fixes: Vec<StyleFix>,
    pub parent_child_fixes: Vec<ParentChildFix>,
    pub phantom_removals: Vec<PhantomRemoval>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixCategory {
    Typography,
    Layout,
    Spacing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StyleFix {
    pub class_name: String,
    pub category: FixCategory,
    pub variant: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParentChildAction {
    CopyProperties,
    AddClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParentChildFix {
    pub action: ParentChildAction,
    pub parent_class: Option<String>,
    pub child_class: String,
    pub add_class: Option<String>,
    pub properties: Option<BTreeMap<String, String>>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PhantomRemoval {
    pub node_id: String,
    pub reason: String,
}

/// Result of one repair exchange (at most two calls).
#[derive(Debug, Clone, Default)]
pub struct RepairAttempt {
    pub response: Option<SemanticResponse>,
    pub calls: u8,
    /// One entry per failed call, in order
    pub failures: Vec<RepairError>,
}

impl RepairAttempt {
    pub fn succeeded(&self) -> bool {
        self.response.is_some()
    }
}

pub struct RepairLoop<A> {
    assistant: A,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    timeout_secs: u64,
    max_section_chars: usize,
}

impl<A: SemanticAssistant> RepairLoop<A> {
    pub fn new(config: &RepairConfig, assistant: A) -> Self {
        Self {
            assistant,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
            timeout_secs: config.timeout_secs,
            max_section_chars: config.max_section_chars,
        }
    }

    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    /// Ask once; on any failure ask again with a corrective instruction.
    /// Never more than two calls.
    pub async fn run(&self, context: &RepairContext<'_>) -> RepairAttempt {
        let mut attempt = RepairAttempt::default();
        let mut request = RepairRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![RepairMessage::user(render_prompt(context, self.max_section_chars))],
        };

        for call in 1..=2u8 {
            attempt.calls = call;
            let (reply, outcome) = self.call(&request).await;
            match outcome {
                Ok(response) => {
                    info!(
                        call,
                        style_fixes = response.style_fixes.len(),
                        parent_child_fixes = response.parent_child_fixes.len(),
                        phantom_removals = response.phantom_removals.len(),
                        "repair response accepted"
                    );
                    attempt.response = Some(response);
                    return attempt;
                }
                Err(err) => {
                    warn!(call, error = %err, "repair call failed");
                    if let Some(reply) = reply {
                        request.messages.push(RepairMessage::assistant(reply));
                    }
                    request.messages.push(RepairMessage::user(corrective_instruction(&err)));
                    attempt.failures.push(err);
                    if matches!(attempt.failures.last(), Some(RepairError::Unavailable)) {
                        break;
                    }
                }
            }
        }
        attempt
    }

    /// One bounded call. Returns the raw reply when there was one, so the
    /// retry can show the assistant what it said.
    async fn call(&self, request: &RepairRequest) -> (Option<String>, Result<SemanticResponse, RepairError>) {
        let reply = match tokio::time::timeout(self.timeout, self.assistant.complete(request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return (None, Err(err)),
            Err(_) => return (None, Err(RepairError::Timeout(self.timeout_secs))),
        };
        debug!(bytes = reply.len(), "repair reply received");
        let outcome = parse_response(&reply);
        (Some(reply), outcome)
    }
}

/// Pull the JSON object out of a reply (replies sometimes arrive wrapped in
/// a code fence), validate it and decode it.
pub fn parse_response(reply: &str) -> Result<SemanticResponse, RepairError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return Err(RepairError::Parse("no JSON object in reply".to_string())),
    };
    let value: Value = serde_json::from_str(body).map_err(|err| RepairError::Parse(err.to_string()))?;
    let errors = semantic_response_errors(&value);
    if !errors.is_empty() {
        return Err(RepairError::Schema(errors));
    }
    serde_json::from_value(value).map_err(|err| RepairError::Parse(err.to_string()))
}
