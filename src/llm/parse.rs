//! Output parsers for raw model completions.
//!
//! Models do not always follow format instructions exactly, so both parsers
//! tolerate the usual noise (code fences, surrounding prose, quoted items)
//! while still rejecting answers that carry no usable content.

use serde_json::Value;

use super::{LlmError, LlmResult};
use crate::models::{Ranking, MAX_SCORE, MIN_SCORE};

/// Parse a comma separated list of terms.
///
/// Items are trimmed and stripped of wrapping quotes; empty items are
/// dropped. A list with no remaining items is a malformed response.
pub fn parse_comma_list(text: &str) -> LlmResult<Vec<String>> {
    let body = strip_code_fence(text);

    let items: Vec<String> = body
        .split(|c| c == ',' || c == '\n')
        .map(clean_item)
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return Err(LlmError::MalformedResponse(format!(
            "expected a comma separated list, got {:?}",
            truncate(text, 80)
        )));
    }

    Ok(items)
}

/// Parse a ranking JSON object out of a completion.
///
/// Accepts the object bare, inside a markdown code fence, or embedded in
/// prose. The score must be a whole number within `1..=10`.
pub fn parse_ranking(text: &str) -> LlmResult<Ranking> {
    let object = extract_json_object(text).ok_or_else(|| {
        LlmError::MalformedResponse(format!("no JSON object in {:?}", truncate(text, 80)))
    })?;

    let value: Value = serde_json::from_str(object)
        .map_err(|e| LlmError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let score = value
        .get("relevance_score")
        .ok_or_else(|| LlmError::MalformedResponse("missing relevance_score".to_string()))
        .and_then(score_from_value)?;

    let justification = value
        .get("justification")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LlmError::MalformedResponse("missing justification".to_string()))?;

    Ok(Ranking {
        relevance_score: score,
        justification: justification.to_string(),
    })
}

fn score_from_value(value: &Value) -> LlmResult<u8> {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| LlmError::MalformedResponse(format!("relevance_score is not an integer: {}", value)))?;

    if raw < MIN_SCORE as i64 || raw > MAX_SCORE as i64 {
        return Err(LlmError::MalformedResponse(format!(
            "relevance_score {} outside {}..={}",
            raw, MIN_SCORE, MAX_SCORE
        )));
    }

    Ok(raw as u8)
}

/// Return the outermost `{...}` span of `text`, ignoring any code fence.
fn extract_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fence(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn clean_item(item: &str) -> String {
    let item = item
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*')
        .trim();
    strip_number_marker(item)
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

/// Strip a leading `1.` or `1)` list marker. The marker must be followed by
/// whitespace so terms like "2.5D rendering" are left alone.
fn strip_number_marker(item: &str) -> &str {
    let digits = item.len() - item.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return item;
    }
    match item[digits..].strip_prefix(['.', ')']) {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => item,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_list_basic() {
        let terms = parse_comma_list("foo, bar,baz").unwrap();
        assert_eq!(terms, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn test_parse_comma_list_strips_quotes_and_blanks() {
        let terms =
            parse_comma_list("\"real-time voice conversion\", , 'audio style transfer',\n").unwrap();
        assert_eq!(terms, vec!["real-time voice conversion", "audio style transfer"]);
    }

    #[test]
    fn test_parse_comma_list_bulleted_lines() {
        let terms = parse_comma_list("- graph attention\n- message passing").unwrap();
        assert_eq!(terms, vec!["graph attention", "message passing"]);
    }

    #[test]
    fn test_parse_comma_list_numbered_lines() {
        let terms = parse_comma_list("1. graph attention\n2) message passing\n10. \"GNN\"\n2.5D rendering").unwrap();
        assert_eq!(
            terms,
            vec!["graph attention", "message passing", "GNN", "2.5D rendering"]
        );
    }

    #[test]
    fn test_parse_comma_list_empty_is_malformed() {
        assert!(matches!(
            parse_comma_list("  ,  , "),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(parse_comma_list(""), Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_ranking_bare_object() {
        let ranking =
            parse_ranking(r#"{"relevance_score": 8, "justification": "Directly on topic."}"#)
                .unwrap();
        assert_eq!(ranking.relevance_score, 8);
        assert_eq!(ranking.justification, "Directly on topic.");
    }

    #[test]
    fn test_parse_ranking_code_fence_and_prose() {
        let text = "Here is my answer:\n```json\n{\"relevance_score\": \"3\", \"justification\": \"Tangential.\"}\n```";
        let ranking = parse_ranking(text).unwrap();
        assert_eq!(ranking.relevance_score, 3);
    }

    #[test]
    fn test_parse_ranking_whole_float_accepted() {
        let ranking =
            parse_ranking(r#"{"relevance_score": 9.0, "justification": "Yes."}"#).unwrap();
        assert_eq!(ranking.relevance_score, 9);
    }

    #[test]
    fn test_parse_ranking_out_of_range_is_malformed() {
        for text in [
            r#"{"relevance_score": 0, "justification": "x"}"#,
            r#"{"relevance_score": 11, "justification": "x"}"#,
            r#"{"relevance_score": -2, "justification": "x"}"#,
            r#"{"relevance_score": 7.5, "justification": "x"}"#,
        ] {
            assert!(
                matches!(parse_ranking(text), Err(LlmError::MalformedResponse(_))),
                "should reject {}",
                text
            );
        }
    }

    #[test]
    fn test_parse_ranking_missing_fields() {
        assert!(parse_ranking(r#"{"justification": "x"}"#).is_err());
        assert!(parse_ranking(r#"{"relevance_score": 5}"#).is_err());
        assert!(parse_ranking(r#"{"relevance_score": 5, "justification": "  "}"#).is_err());
    }

    #[test]
    fn test_parse_ranking_not_json() {
        assert!(matches!(
            parse_ranking("I would rate this an 8."),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_ranking("{not json}"),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
