//! Prompts sent to the multimodal providers.

/// Shape of the JSON array every multimodal provider is asked to return.
const RESULT_SCHEMA: &str = r#"[
  {
    "content": "题目内容（完整的题干）",
    "subject": "学科代码（math/chinese/english/physics/chemistry/biology/history/geography/politics）",
    "category": "知识点分类（例如：代数/几何/文言文/阅读理解等）",
    "difficulty": "难度（easy/medium/hard）",
    "answer": "正确答案",
    "explanation": "答案解析（可选）",
    "confidence": 0.95
  }
]"#;

/// Single-turn prompt for DashScope (no system role).
pub fn question_prompt() -> String {
    format!(
        r#"你是一个专业的题目识别助手。请仔细分析这张图片中的题目，并按照以下JSON格式返回结果（可以包含多道题目）：

{RESULT_SCHEMA}

要求：
1. 准确识别题目的完整内容
2. 根据题目内容判断学科，必须是上述9个学科之一
3. 分析知识点分类
4. 评估难度级别
5. 如果图片包含答案或解析，请一并提取
6. confidence 表示识别的置信度（0-1之间）
7. 如果图片中有多道题目，请全部识别并返回数组

请直接返回JSON数组，不要有其他内容。"#
    )
}

/// System instruction for Gemini.
pub const SYSTEM_INSTRUCTION: &str = r#"你是一个专业的题目识别助手。请仔细分析图片中的题目，并按照指定的JSON格式返回结果。

要求：
1. 准确识别题目的完整内容，包括公式和特殊符号
2. 根据题目内容判断学科，必须是以下之一：math（数学）、chinese（语文）、english（英语）、physics（物理）、chemistry（化学）、biology（生物）、history（历史）、geography（地理）、politics（政治）
3. 分析知识点分类（如代数、几何、文言文、阅读理解等）
4. 评估难度级别：easy（简单）、medium（中等）、hard（困难）
5. 如果图片包含答案或解析，请一并提取
6. confidence 表示识别的置信度（0-1之间）
7. 如果图片中有多道题目，请全部识别并返回数组

请严格按照JSON Schema返回结果。"#;

/// User turn paired with [`SYSTEM_INSTRUCTION`].
pub fn extraction_prompt() -> String {
    format!(
        "请识别并提取图中所有的题目，返回以下格式的JSON数组：\n\n{RESULT_SCHEMA}\n\n请直接返回JSON数组，不要有其他内容。"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_schema() {
        for prompt in [question_prompt(), extraction_prompt()] {
            assert!(prompt.contains("\"difficulty\""));
            assert!(prompt.contains("JSON数组"));
        }
    }
}
