use super::RepairError;

/// Fixed instructions sent as the system prompt of every repair call.
pub const SYSTEM_PROMPT: &str = r#"You repair page-builder clipboard graphs produced from static HTML and CSS.
You receive the original HTML, the original CSS, the emitted graph as JSON and a diagnostic report.
Answer with one JSON object and nothing else. It must have exactly these keys:

{
  "reasons": [string],
  "styleFixes": [{ "className": string, "category": "typography" | "layout" | "spacing",
                   "variant": string | null, "properties": { property: value }, "reason": string }],
  "parentChildFixes": [{ "action": "copy-properties" | "add-class", "parentClass": string | null,
                         "childClass": string, "addClass": string | null,
                         "properties": { property: value } | null, "reason": string }],
  "phantomRemovals": [{ "nodeId": string, "reason": string }]
}

Rules:
- Use class names as written in the HTML, never style ids.
- "variant" is null for the base style, otherwise a breakpoint or state key such as "small", "tiny" or "hover".
- "copy-properties" merges "properties" onto "parentClass".
- "add-class" adds "addClass" to every node whose child carries "childClass".
- Only propose removals for node ids the report lists as phantom.
- Never invent content. Leave arrays empty when nothing applies."#;

/// Inputs of one repair prompt.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub html: &'a str,
    pub css: &'a str,
    pub graph_json: &'a str,
    pub diagnostics: &'a str,
}

pub fn render_prompt(context: &RepairContext<'_>, max_section_chars: usize) -> String {
    let sections = [
        ("ORIGINAL HTML", context.html),
        ("ORIGINAL CSS", context.css),
        ("EMITTED GRAPH", context.graph_json),
        ("DIAGNOSTICS", context.diagnostics),
    ];
    let mut out = String::new();
    for (title, body) in sections {
        out.push_str("## ");
        out.push_str(title);
        out.push('\n');
        out.push_str(&truncate_section(body, max_section_chars));
        out.push_str("\n\n");
    }
    out.push_str("Return the JSON object now.");
    out
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_section(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}\n[... {} more characters truncated]", total - max_chars)
}

/// Follow-up user message for the single retry.
pub fn corrective_instruction(error: &RepairError) -> String {
    match error {
        RepairError::Schema(errors) => {
            let mut out = String::from(
                "Your previous answer did not match the required JSON shape. Fix these problems and answer again with the JSON object only:\n",
            );
            for err in errors {
                out.push_str("- ");
                out.push_str(err);
                out.push('\n');
            }
            out
        }
        RepairError::Parse(detail) => format!(
            "Your previous answer was not a parseable JSON object ({detail}). Answer again with the JSON object only."
        ),
        other => format!(
            "The previous request failed ({other}). Answer again with the JSON object only."
        ),
    }
}
