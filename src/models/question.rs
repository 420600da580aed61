//! Recognized question records.
//!
//! A `RecognitionResult` is the canonical unit produced by every recognition
//! provider. Once it has passed through the normalizer its enum fields are
//! always valid and its confidence always lies in `[0, 1]`.

use serde::{Deserialize, Serialize};

/// Placeholder used when no question text could be extracted.
pub const CONTENT_PLACEHOLDER: &str = "未识别到题目内容";

/// Knowledge-point label used when a provider supplies none ("other").
pub const DEFAULT_CATEGORY: &str = "其他";

/// School subject of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    #[default]
    Math,
    Chinese,
    English,
    Physics,
    Chemistry,
    Biology,
    History,
    Geography,
    Politics,
}

impl Subject {
    /// All subjects, in the order used for keyword-score tie breaking.
    pub const ALL: [Subject; 9] = [
        Subject::Math,
        Subject::Chinese,
        Subject::English,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
        Subject::History,
        Subject::Geography,
        Subject::Politics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::Chinese => "chinese",
            Self::English => "english",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::Biology => "biology",
            Self::History => "history",
            Self::Geography => "geography",
            Self::Politics => "politics",
        }
    }

    /// Parse a subject code, ignoring case and surrounding whitespace.
    pub fn from_str(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|subject| subject.as_str() == needle)
    }

    /// Chinese display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Math => "数学",
            Self::Chinese => "语文",
            Self::English => "英语",
            Self::Physics => "物理",
            Self::Chemistry => "化学",
            Self::Biology => "生物",
            Self::History => "历史",
            Self::Geography => "地理",
            Self::Politics => "政治",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated difficulty of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question recognized from an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Transcribed question text. Never empty.
    pub content: String,
    pub subject: Subject,
    /// Free-text knowledge-point label.
    pub category: String,
    pub difficulty: Difficulty,
    /// May be empty when the provider cannot supply an answer.
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Reliability estimate in `[0, 1]`.
    pub confidence: f64,
}

impl RecognitionResult {
    /// Check every invariant a normalized result must satisfy.
    pub fn is_valid(&self) -> bool {
        !self.content.trim().is_empty()
            && !self.category.trim().is_empty()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_parse_is_case_insensitive() {
        assert_eq!(Subject::from_str(" Physics "), Some(Subject::Physics));
        assert_eq!(Subject::from_str("MATH"), Some(Subject::Math));
        assert_eq!(Subject::from_str("art"), None);
        assert_eq!(Subject::from_str(""), None);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!(Difficulty::from_str("hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_str("Easy"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::from_str("extreme"), None);
    }

    #[test]
    fn test_serialized_enums_are_lowercase() {
        let result = RecognitionResult {
            content: "求 x".to_string(),
            subject: Subject::Chemistry,
            category: DEFAULT_CATEGORY.to_string(),
            difficulty: Difficulty::Hard,
            answer: String::new(),
            explanation: None,
            confidence: 0.5,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["subject"], "chemistry");
        assert_eq!(json["difficulty"], "hard");
        assert!(json.get("explanation").is_none());
    }

    #[test]
    fn test_is_valid_rejects_out_of_range_confidence() {
        let mut result = RecognitionResult {
            content: "题".to_string(),
            subject: Subject::Math,
            category: "代数".to_string(),
            difficulty: Difficulty::Medium,
            answer: String::new(),
            explanation: None,
            confidence: 1.0,
        };
        assert!(result.is_valid());
        result.confidence = 1.5;
        assert!(!result.is_valid());
        result.confidence = f64::NAN;
        assert!(!result.is_valid());
    }
}
