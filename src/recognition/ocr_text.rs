//! Keyword heuristics that turn plain OCR text into structured questions.
//!
//! Used by the OCR-only backend, which returns raw text with no notion of
//! subject, difficulty or question boundaries.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::sanitize;
use crate::models::{Difficulty, RecognitionResult, Subject, DEFAULT_CATEGORY};

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid regex"));

static QUESTION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\n)(?:\d+[.、]|\(\d+\)|[①-⑩])").expect("valid regex")
});

static ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:答案[:：]|正确答案[:：])\s*(.+?)(?:\n|$)").expect("valid regex")
});

static EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:解析[:：]|解答[:：])\s*(.+?)(?:\n\n|$)").expect("valid regex")
});

const SUBJECT_KEYWORDS: [(Subject, &[&str]); 9] = [
    (
        Subject::Math,
        &["函数", "方程", "几何", "三角", "数列", "导数", "积分", "概率", "统计", "代数"],
    ),
    (
        Subject::Chinese,
        &["古诗", "文言文", "阅读", "作文", "成语", "修辞", "作者", "作品"],
    ),
    (
        Subject::English,
        &["grammar", "vocabulary", "reading", "translation", "choose", "fill"],
    ),
    (
        Subject::Physics,
        &["力", "速度", "加速度", "电流", "电压", "电阻", "光", "热", "能量"],
    ),
    (
        Subject::Chemistry,
        &["化学", "元素", "分子", "原子", "反应", "方程式", "酸碱", "氧化"],
    ),
    (
        Subject::Biology,
        &["细胞", "基因", "DNA", "生物", "植物", "动物", "遗传", "进化"],
    ),
    (
        Subject::History,
        &["历史", "朝代", "皇帝", "战争", "革命", "条约", "年代"],
    ),
    (
        Subject::Geography,
        &["地理", "气候", "地形", "河流", "山脉", "国家", "城市"],
    ),
    (
        Subject::Politics,
        &["政治", "经济", "哲学", "文化", "社会", "制度", "政策"],
    ),
];

const HARD_KEYWORDS: &[&str] = &["证明", "推导", "综合", "应用", "拓展", "探究", "分析"];
const EASY_KEYWORDS: &[&str] = &["计算", "选择", "填空", "直接", "简单", "写出", "列举"];

fn category_keywords(subject: Subject) -> &'static [&'static str] {
    match subject {
        Subject::Math => &[
            "代数", "几何", "函数", "三角", "概率", "统计", "数列", "不等式", "立体几何",
            "解析几何",
        ],
        Subject::Chinese => &["文言文", "诗歌鉴赏", "现代文阅读", "作文", "语言基础", "名著阅读"],
        Subject::English => &["语法", "词汇", "阅读理解", "完形填空", "写作", "听力"],
        Subject::Physics => &["力学", "电学", "光学", "热学", "原子物理"],
        Subject::Chemistry => &["有机化学", "无机化学", "化学反应", "物质结构", "化学实验"],
        Subject::Biology => &["细胞生物学", "遗传学", "生态学", "人体生理", "植物学", "动物学"],
        Subject::History => &["中国古代史", "中国近代史", "世界史", "文化史"],
        Subject::Geography => &["自然地理", "人文地理", "区域地理", "地图与地理信息"],
        Subject::Politics => &["经济生活", "政治生活", "文化生活", "哲学"],
    }
}

/// Split OCR output into one string per question.
///
/// Blank-line separated blocks win; a single block is split on question
/// numbers (`1.`, `2、`, `(3)`, `④`) and renumbered.
pub fn split_questions(text: &str) -> Vec<String> {
    let blocks: Vec<&str> = PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect();

    if blocks.len() != 1 {
        return blocks.into_iter().map(str::to_string).collect();
    }

    let pieces: Vec<&str> = QUESTION_NUMBER
        .split(blocks[0])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if pieces.len() > 1 {
        pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| format!("{}. {}", i + 1, piece))
            .collect()
    } else {
        vec![blocks[0].to_string()]
    }
}

/// Subject with the most keyword hits; earlier subjects win ties.
pub fn infer_subject(text: &str) -> Subject {
    let lowered = text.to_lowercase();
    let mut best = Subject::Math;
    let mut best_score = 0;

    for (subject, keywords) in SUBJECT_KEYWORDS {
        let score = keywords
            .iter()
            .filter(|k| lowered.contains(&k.to_lowercase()))
            .count();
        if score > best_score {
            best = subject;
            best_score = score;
        }
    }
    best
}

pub fn infer_difficulty(text: &str) -> Difficulty {
    let hard = HARD_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
    let easy = EASY_KEYWORDS.iter().filter(|k| text.contains(*k)).count();

    match hard.cmp(&easy) {
        std::cmp::Ordering::Greater => Difficulty::Hard,
        std::cmp::Ordering::Less => Difficulty::Easy,
        std::cmp::Ordering::Equal => Difficulty::Medium,
    }
}

pub fn extract_category(text: &str, subject: Subject) -> String {
    category_keywords(subject)
        .iter()
        .find(|k| text.contains(*k))
        .map(|k| k.to_string())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Split off an `答案：` line. Returns `(content, answer)`.
pub fn extract_answer(text: &str) -> (String, String) {
    match ANSWER.captures(text) {
        Some(caps) => {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let answer = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            (text[..start].trim().to_string(), answer.to_string())
        }
        None => (text.trim().to_string(), String::new()),
    }
}

pub fn extract_explanation(text: &str) -> Option<String> {
    EXPLANATION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|e| !e.is_empty())
}

/// Build one result per question found in `text`, all with `confidence`.
pub fn build_results(text: &str, confidence: f64) -> Vec<RecognitionResult> {
    split_questions(text)
        .into_iter()
        .map(|question| {
            let subject = infer_subject(&question);
            let (content, answer) = extract_answer(&question);
            let result = RecognitionResult {
                subject,
                category: extract_category(&question, subject),
                difficulty: infer_difficulty(&question),
                explanation: extract_explanation(&question),
                content,
                answer,
                confidence,
            };
            sanitize(result, confidence)
        })
        .collect()
}
