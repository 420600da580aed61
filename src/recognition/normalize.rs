//! Coercion of loose provider output into [`RecognitionResult`].
//!
//! Multimodal models are asked for a JSON array but routinely wrap it in
//! prose or a code fence, rename fields, or leave fields out. Everything in
//! here is total: any input yields either a valid result or `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{
    Difficulty, RecognitionResult, Subject, CONTENT_PLACEHOLDER, DEFAULT_CATEGORY,
};

/// Confidence assigned when a provider reports none (or an invalid one).
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

/// Candidate keys per target field, tried in order; first non-empty wins.
pub const FIELD_KEYS: FieldKeys = FieldKeys {
    content: &["content", "question", "text"],
    subject: &["subject"],
    category: &["category", "knowledgePoint", "knowledge_point"],
    difficulty: &["difficulty"],
    answer: &["answer"],
    explanation: &["explanation", "parse", "analysis"],
    confidence: &["confidence"],
};

/// Ordered key lists for each [`RecognitionResult`] field.
#[derive(Debug, Clone, Copy)]
pub struct FieldKeys {
    pub content: &'static [&'static str],
    pub subject: &'static [&'static str],
    pub category: &'static [&'static str],
    pub difficulty: &'static [&'static str],
    pub answer: &'static [&'static str],
    pub explanation: &'static [&'static str],
    pub confidence: &'static [&'static str],
}

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid regex"));

/// Normalize one raw item using [`DEFAULT_CONFIDENCE`].
pub fn normalize(raw: &Value) -> RecognitionResult {
    normalize_with(raw, DEFAULT_CONFIDENCE)
}

/// Normalize one raw item, substituting `default_confidence` for a missing
/// or out-of-range confidence.
pub fn normalize_with(raw: &Value, default_confidence: f64) -> RecognitionResult {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let content = first_text(obj, FIELD_KEYS.content)
        .unwrap_or_else(|| CONTENT_PLACEHOLDER.to_string());
    let subject = first_text(obj, FIELD_KEYS.subject)
        .and_then(|s| Subject::from_str(&s))
        .unwrap_or_default();
    let category =
        first_text(obj, FIELD_KEYS.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let difficulty = first_text(obj, FIELD_KEYS.difficulty)
        .and_then(|s| Difficulty::from_str(&s))
        .unwrap_or_default();
    let answer = first_text(obj, FIELD_KEYS.answer).unwrap_or_default();
    let explanation = first_text(obj, FIELD_KEYS.explanation);
    let confidence = first_number(obj, FIELD_KEYS.confidence)
        .filter(|c| in_unit_range(*c))
        .unwrap_or_else(|| fallback_confidence(default_confidence));

    RecognitionResult {
        content,
        subject,
        category,
        difficulty,
        answer,
        explanation,
        confidence,
    }
}

/// Re-apply the normalizer's constraints to an already typed result.
pub fn sanitize(mut result: RecognitionResult, default_confidence: f64) -> RecognitionResult {
    let content = result.content.trim();
    result.content = if content.is_empty() {
        CONTENT_PLACEHOLDER.to_string()
    } else {
        content.to_string()
    };
    let category = result.category.trim();
    result.category = if category.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        category.to_string()
    };
    result.answer = result.answer.trim().to_string();
    result.explanation = result
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if !in_unit_range(result.confidence) {
        result.confidence = fallback_confidence(default_confidence);
    }
    result
}

/// Recover a JSON array of question objects from model output.
///
/// Strategies, in order:
/// 1. the whole text as JSON (a bare array, or an object with a
///    `questions` array),
/// 2. the first fenced code block (```` ```json ```` or plain ```` ``` ````),
/// 3. the first balanced top-level `[...]` substring.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let trimmed = text.trim();

    if let Some(items) = parse_question_array(trimmed) {
        return Some(items);
    }

    if let Some(items) = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|block| parse_question_array(block.as_str()))
    {
        return Some(items);
    }

    first_bracketed(trimmed).and_then(parse_question_array)
}

fn parse_question_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => Some(items),
        Value::Object(mut obj) => match obj.remove("questions") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// Find the first `[` and its matching `]`, skipping brackets inside JSON
/// string literals.
fn first_bracketed(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn in_unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

fn fallback_confidence(default_confidence: f64) -> f64 {
    if in_unit_range(default_confidence) {
        default_confidence
    } else {
        DEFAULT_CONFIDENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_empty_object_uses_defaults() {
        let result = normalize(&json!({}));
        assert_eq!(result.content, CONTENT_PLACEHOLDER);
        assert_eq!(result.subject, Subject::Math);
        assert_eq!(result.category, DEFAULT_CATEGORY);
        assert_eq!(result.difficulty, Difficulty::Medium);
        assert_eq!(result.answer, "");
        assert_eq!(result.explanation, None);
        assert_eq!(result.confidence, DEFAULT_CONFIDENCE);
        assert!(result.is_valid());
    }

    #[test]
    fn test_normalize_non_object_inputs_are_total() {
        for raw in [
            json!(null),
            json!("just text"),
            json!(42),
            json!([1, 2, 3]),
            json!(true),
        ] {
            let result = normalize(&raw);
            assert!(result.is_valid(), "invalid result for {raw}");
            assert_eq!(result.content, CONTENT_PLACEHOLDER);
        }
    }

    #[test]
    fn test_normalize_key_precedence() {
        let raw = json!({
            "question": "second choice",
            "content": "first choice",
            "text": "third choice",
            "knowledgePoint": "几何",
            "parse": "because",
        });
        let result = normalize(&raw);
        assert_eq!(result.content, "first choice");
        assert_eq!(result.category, "几何");
        assert_eq!(result.explanation.as_deref(), Some("because"));
    }

    #[test]
    fn test_normalize_skips_blank_candidates() {
        let raw = json!({ "content": "   ", "question": "", "text": "fallback text" });
        assert_eq!(normalize(&raw).content, "fallback text");
    }

    #[test]
    fn test_normalize_invalid_enums_fall_back() {
        let raw = json!({ "content": "x", "subject": "art", "difficulty": "insane" });
        let result = normalize(&raw);
        assert_eq!(result.subject, Subject::Math);
        assert_eq!(result.difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_normalize_accepts_mixed_case_enums() {
        let raw = json!({ "subject": "Biology", "difficulty": " HARD " });
        let result = normalize(&raw);
        assert_eq!(result.subject, Subject::Biology);
        assert_eq!(result.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_normalize_confidence_clamped_to_provider_default() {
        for bad in [json!(1.5), json!(-0.1), json!("high"), json!(null)] {
            let result = normalize_with(&json!({ "confidence": bad }), 0.8);
            assert_eq!(result.confidence, 0.8);
        }
        let ok = normalize_with(&json!({ "confidence": "0.42" }), 0.8);
        assert_eq!(ok.confidence, 0.42);
    }

    #[test]
    fn test_normalize_invalid_default_confidence_is_replaced() {
        let result = normalize_with(&json!({}), 7.0);
        assert_eq!(result.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_normalize_numeric_answer() {
        let result = normalize(&json!({ "content": "1+1", "answer": 2 }));
        assert_eq!(result.answer, "2");
    }

    #[test]
    fn test_sanitize_repairs_typed_result() {
        let result = sanitize(
            RecognitionResult {
                content: "  ".to_string(),
                subject: Subject::History,
                category: String::new(),
                difficulty: Difficulty::Easy,
                answer: " A ".to_string(),
                explanation: Some(" ".to_string()),
                confidence: f64::INFINITY,
            },
            0.75,
        );
        assert_eq!(result.content, CONTENT_PLACEHOLDER);
        assert_eq!(result.category, DEFAULT_CATEGORY);
        assert_eq!(result.answer, "A");
        assert_eq!(result.explanation, None);
        assert_eq!(result.confidence, 0.75);
    }

    #[test]
    fn test_extract_bare_array() {
        let items = extract_json_array(r#"[{"content": "a"}, {"content": "b"}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_extract_questions_object() {
        let items = extract_json_array(r#"{"questions": [{"content": "a"}]}"#).unwrap();
        assert_eq!(items[0]["content"], "a");
    }

    #[test]
    fn test_extract_from_fence_with_prose() {
        let text = "Here are the questions:\n```json\n[{\"content\": \"a\"}]\n```\nDone.";
        assert_eq!(extract_json_array(text).unwrap().len(), 1);

        let plain = "```\n{\"questions\": [{\"content\": \"b\"}]}\n```";
        assert_eq!(extract_json_array(plain).unwrap()[0]["content"], "b");
    }

    #[test]
    fn test_extract_by_bracket_matching() {
        let text = r#"识别结果如下 [{"content": "数组 [1, 2] 的和", "answer": "3]"}] 以上。"#;
        let items = extract_json_array(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["answer"], "3]");
    }

    #[test]
    fn test_extract_failures_return_none() {
        assert!(extract_json_array("").is_none());
        assert!(extract_json_array("no json here").is_none());
        assert!(extract_json_array(r#"{"content": "single object"}"#).is_none());
        assert!(extract_json_array("[unclosed").is_none());
        assert!(extract_json_array("[not, valid, json]").is_none());
    }

    #[test]
    fn test_extract_empty_array_is_some() {
        assert_eq!(extract_json_array("[]"), Some(vec![]));
    }

    #[test]
    fn test_fenced_results_round_trip() {
        let originals = vec![
            RecognitionResult {
                content: "已知 f(x) = x² - 2x + 1，求 f(2)".to_string(),
                subject: Subject::Math,
                category: "函数".to_string(),
                difficulty: Difficulty::Easy,
                answer: "1".to_string(),
                explanation: Some("代入 x = 2".to_string()),
                confidence: 0.9,
            },
            RecognitionResult {
                content: "Choose the correct answer".to_string(),
                subject: Subject::English,
                category: "语法".to_string(),
                difficulty: Difficulty::Hard,
                answer: String::new(),
                explanation: None,
                confidence: 0.5,
            },
        ];
        let fenced = format!(
            "```json\n{}\n```",
            serde_json::to_string_pretty(&originals).unwrap()
        );

        let recovered: Vec<RecognitionResult> = extract_json_array(&fenced)
            .unwrap()
            .iter()
            .map(normalize)
            .collect();
        assert_eq!(recovered, originals);
    }
}
