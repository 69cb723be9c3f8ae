//! 结果解析器
//!
//! 从模型返回的自由文本中提取并修复JSON数组/对象。部分模型的输出
//! 不稳定：代码围栏、缺失逗号、数组写成键值对等畸形都在这里兜住。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::error::{AnnotationError, AnnotationResult};

/// 一条替换单元：原词及其译文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub original: String,
    pub translation: String,
}

/// 词条详情
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordDetail {
    pub phonetic: String,
    pub pos: String,
    pub meaning: String,
    pub example_target: String,
    pub example_native: String,
}

/// 解析替换单元列表，逐条应用约束谓词
///
/// 不满足谓词的记录被静默丢弃，不会使整次调用失败。
pub fn parse_records<F>(raw: &str, constraint: F) -> AnnotationResult<Vec<TranslationUnit>>
where
    F: Fn(&TranslationUnit) -> bool,
{
    let cleaned = strip_code_fences(raw);

    let json_str = locate_json_span(&cleaned).ok_or_else(|| {
        AnnotationError::ParseError(format!("响应中未找到JSON: {}", truncate_for_log(&cleaned)))
    })?;

    let value = match serde_json::from_str::<Value>(json_str) {
        Ok(value) => value,
        Err(_) => {
            // 修复一次后重新解析，仍失败则本次调用终止
            let repaired = repair_malformed_json(json_str);
            serde_json::from_str::<Value>(&repaired).map_err(|e| {
                AnnotationError::ParseError(format!(
                    "JSON修复后仍无法解析: {} ({})",
                    e,
                    truncate_for_log(&cleaned)
                ))
            })?
        }
    };

    let records = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    Ok(records
        .into_iter()
        .filter_map(|item| serde_json::from_value::<TranslationUnit>(item).ok())
        .filter(|unit| !unit.original.is_empty() && !unit.translation.is_empty())
        .filter(|unit| constraint(unit))
        .collect())
}

/// 解析句子翻译结果
///
/// 约束：`original` 必须逐字出现在原文中。
pub fn parse_units(raw: &str, source_text: &str) -> AnnotationResult<Vec<TranslationUnit>> {
    parse_records(raw, |unit| source_text.contains(&unit.original))
}

/// 解析词条详情
///
/// 取首个 `{...}` 片段直接解析，不做修复；失败返回 `None`。
pub fn parse_word_detail(raw: &str) -> Option<WordDetail> {
    let cleaned = strip_code_fences(raw);
    let start = cleaned.find('{')?;
    let end = cleaned[start..].find('}')? + start;
    let candidate = &cleaned[start..=end];

    match serde_json::from_str::<WordDetail>(candidate) {
        Ok(detail) => Some(detail),
        Err(e) => {
            tracing::debug!("词条详情解析失败: {}", e);
            None
        }
    }
}

/// 去掉Markdown代码围栏标记
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "")
}

/// 定位首个JSON片段：优先 `[...]`，其次 `{...}`
fn locate_json_span(text: &str) -> Option<&str> {
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            return Some(&text[start..=end]);
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Some(&text[start..=end]);
        }
    }
    None
}

/// 修复畸形JSON（某些模型返回不稳定）
fn repair_malformed_json(raw: &str) -> String {
    // 修复 ["key": "value"] 为 {"key": "value"}
    let open_pair = regex::Regex::new(r#"\[\s*"([^"]+)"\s*:"#);
    let close_pair = regex::Regex::new(r#":\s*"([^"]*)"\s*\]"#);
    let missing_comma = regex::Regex::new(r"\}\s*\{");

    let mut fixed = raw.to_string();
    if let Ok(re) = open_pair {
        fixed = re.replace_all(&fixed, "{\"$1\":").to_string();
    }
    if let Ok(re) = close_pair {
        fixed = re.replace_all(&fixed, ":\"$1\"}").to_string();
    }
    // 修复 }{ 之间缺少逗号的情况
    if let Ok(re) = missing_comma {
        fixed = re.replace_all(&fixed, "},{").to_string();
    }

    // 修复最外层缺少方括号的情况
    let trimmed = fixed.trim();
    if trimmed.starts_with('{') {
        fixed = format!("[{}]", trimmed);
    }

    fixed
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_constraint_filters_units() {
        let raw = r#"[{"original":"apples","translation":"苹果"},{"original":"bananas","translation":"香蕉"}]"#;
        let units = parse_units(raw, "I like apples").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].original, "apples");
    }

    #[test]
    fn test_code_fences_are_stripped() {
        let raw = "```json\n[{\"original\":\"学习\",\"translation\":\"learning\"}]\n```";
        let units = parse_units(raw, "我在学习").unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_bare_object_treated_as_single_element_list() {
        let raw = r#"{"original":"学习","translation":"learning"}"#;
        let units = parse_units(raw, "我在学习").unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_repair_array_of_pairs() {
        // 直接解析会失败，修复后变成对象并包上方括号
        let raw = r#"["original": "学习", "translation": "learning"]"#;
        let units = parse_units(raw, "我在学习").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].translation, "learning");
    }

    #[test]
    fn test_repair_missing_comma_between_objects() {
        let raw = r#"[{"original":"学习","translation":"learning"}{"original":"世界","translation":"world"}]"#;
        let units = parse_units(raw, "学习改变世界").unwrap();
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_unrepairable_content_is_terminal() {
        let result = parse_units("the model refused to answer", "text");
        assert!(matches!(result, Err(AnnotationError::ParseError(_))));

        let still_broken = parse_units("[{{{]", "text");
        assert!(still_broken.is_err());
    }

    #[test]
    fn test_records_missing_fields_are_dropped() {
        let raw = r#"[{"original":"学习"},{"original":"","translation":"x"},{"original":"世界","translation":"world"}]"#;
        let units = parse_units(raw, "学习世界").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].original, "世界");
    }

    #[test]
    fn test_word_detail_parse_without_repair() {
        let raw = "```json\n{\"phonetic\":\"/ˈæpl/\",\"pos\":\"n.\",\"meaning\":\"苹果\",\"example_target\":\"An apple a day.\",\"example_native\":\"一天一苹果。\"}\n```";
        let detail = parse_word_detail(raw).unwrap();
        assert_eq!(detail.pos, "n.");

        assert!(parse_word_detail("no braces here").is_none());
    }
}
