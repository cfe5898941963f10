//! Parsing oracle output into the typed response schema.
//!
//! The oracle is untrusted: responses are ideally clean JSON matching
//! [`AgentResponse`], but models wrap JSON in markdown fences, leave
//! trailing commas, or prepend prose. Recovery strategies are tried in
//! order; if all fail, the caller records an `agent_error` and the agent
//! skips the tick.

use emotionsim_types::AgentResponse;

use crate::error::OracleError;

/// Parse raw oracle text into a validated [`AgentResponse`].
///
/// Strategies, in order:
/// 1. Direct deserialization of the trimmed text.
/// 2. Extraction from a markdown code fence, then deserialization.
/// 3. Trailing-comma stripping, then deserialization.
/// 4. Fence extraction combined with comma stripping.
/// 5. First `{` to last `}` substring, then deserialization.
///
/// # Errors
///
/// Returns [`OracleError::EmptyResponse`] for blank input and
/// [`OracleError::Parse`] when every strategy fails.
pub fn parse_agent_response(raw: &str) -> Result<AgentResponse, OracleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OracleError::EmptyResponse);
    }

    if let Ok(parsed) = serde_json::from_str::<AgentResponse>(trimmed) {
        return Ok(parsed);
    }

    if let Some(fenced) = extract_from_fence(trimmed) {
        if let Ok(parsed) = serde_json::from_str::<AgentResponse>(fenced) {
            return Ok(parsed);
        }
        let cleaned = strip_trailing_commas(fenced);
        if let Ok(parsed) = serde_json::from_str::<AgentResponse>(&cleaned) {
            return Ok(parsed);
        }
    }

    let cleaned = strip_trailing_commas(trimmed);
    if let Ok(parsed) = serde_json::from_str::<AgentResponse>(&cleaned) {
        return Ok(parsed);
    }

    if let Some(braced) = extract_braced(trimmed) {
        let cleaned = strip_trailing_commas(braced);
        if let Ok(parsed) = serde_json::from_str::<AgentResponse>(&cleaned) {
            return Ok(parsed);
        }
    }

    Err(OracleError::Parse(format!(
        "all parse strategies failed for: {}",
        truncate_for_log(trimmed)
    )))
}

/// Pull the body out of the first markdown code fence, if any.
fn extract_from_fence(text: &str) -> Option<&str> {
    let after_open = text.split_once("```")?.1;
    // Skip an optional language tag on the fence line.
    let body = after_open.split_once('\n')?.1;
    let inner = body.split_once("```")?.0;
    Some(inner.trim())
}

/// Take the substring from the first `{` to the last `}`.
fn extract_braced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    text.get(start..=end)
}

/// Remove commas that directly precede a closing bracket or brace.
fn strip_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            // Look ahead past whitespace for a closer.
            let mut lookahead = chars.clone();
            let mut next_significant = None;
            while let Some(&candidate) = lookahead.peek() {
                if candidate.is_whitespace() {
                    let _ = lookahead.next();
                } else {
                    next_significant = Some(candidate);
                    break;
                }
            }
            if matches!(next_significant, Some('}' | ']')) {
                continue;
            }
        }
        result.push(c);
    }
    result
}

/// Bound raw text for log output.
fn truncate_for_log(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        text.to_owned()
    } else {
        let prefix: String = text.chars().take(LIMIT).collect();
        format!("{prefix}…")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emotionsim_types::ActionType;

    use super::*;

    const CLEAN: &str = r#"{
        "actions": [{"action_type": "move", "target": "shelter"}],
        "message": null,
        "state_changes": {"stress": 1},
        "reasoning": "moving to safety"
    }"#;

    #[test]
    fn parses_clean_json() {
        let response = parse_agent_response(CLEAN).unwrap();
        assert_eq!(response.actions.len(), 1);
        assert_eq!(
            response.actions.first().map(|a| a.action_type),
            Some(ActionType::Move)
        );
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("Here is my decision:\n```json\n{CLEAN}\n```\nDone.");
        let response = parse_agent_response(&fenced).unwrap();
        assert_eq!(response.actions.len(), 1);
    }

    #[test]
    fn parses_fence_without_language_tag() {
        let fenced = format!("```\n{CLEAN}\n```");
        assert!(parse_agent_response(&fenced).is_ok());
    }

    #[test]
    fn strips_trailing_commas() {
        let sloppy = r#"{
            "actions": [{"action_type": "wait"},],
            "reasoning": "resting",
        }"#;
        let response = parse_agent_response(sloppy).unwrap();
        assert_eq!(
            response.actions.first().map(|a| a.action_type),
            Some(ActionType::Wait)
        );
    }

    #[test]
    fn recovers_json_with_surrounding_prose() {
        let prose = format!("I think the best move is clear. {CLEAN} That is all.");
        assert!(parse_agent_response(&prose).is_ok());
    }

    #[test]
    fn empty_input_is_its_own_error() {
        assert!(matches!(
            parse_agent_response("   "),
            Err(OracleError::EmptyResponse)
        ));
    }

    #[test]
    fn garbage_fails_with_parse_error() {
        assert!(matches!(
            parse_agent_response("the agent shrugs"),
            Err(OracleError::Parse(_))
        ));
    }

    #[test]
    fn unknown_action_type_fails() {
        let bad = r#"{"actions": [{"action_type": "fly"}]}"#;
        assert!(parse_agent_response(bad).is_err());
    }

    #[test]
    fn empty_object_is_a_valid_skip() {
        let response = parse_agent_response("{}").unwrap();
        assert!(response.is_empty());
    }
}
