//! 页面扫描器
//!
//! 遍历DOM找出适合标注的块级文本容器，过滤掉结构性噪音区域、
//! 隐藏元素和内容过短的元素。同时负责页面语言检测，
//! 据此决定翻译方向。

use std::cell::Cell;

use markup5ever_rcdom::{Handle, NodeData};

use crate::annotation::config::constants;
use crate::annotation::settings::{Direction, Settings};
use crate::parsers::html::{get_node_attr, get_node_name, text_content};

/// 一个待标注的页面元素
#[derive(Clone)]
pub struct PageElement {
    /// 扫描时分配的稳定标识，任务注册表用它跟踪状态
    pub id: u64,
    pub handle: Handle,
    /// 扫描时的整理后文本
    pub text: String,
}

/// 页面扫描器
pub struct PageScanner {
    direction: Direction,
    next_id: Cell<u64>,
}

impl PageScanner {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            next_id: Cell::new(0),
        }
    }

    /// 按文档顺序收集候选元素
    ///
    /// 同一元素绝不会返回两次；被选中的候选不再向下递归，
    /// 避免嵌套容器的文本被重复标注。
    pub fn find_candidates(&self, root: &Handle) -> Vec<PageElement> {
        let mut found = Vec::new();
        self.walk(root, &mut found);
        found
    }

    fn walk(&self, node: &Handle, found: &mut Vec<PageElement>) {
        if let Some(name) = get_node_name(node) {
            if is_excluded_element(node, name) || is_hidden(node) {
                return;
            }

            if constants::CANDIDATE_TAGS.contains(&name) && self.content_eligible(node) {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                found.push(PageElement {
                    id,
                    handle: node.clone(),
                    text: text_content(node).trim().to_string(),
                });
                return;
            }
        }

        for child in node.children.borrow().iter() {
            self.walk(child, found);
        }
    }

    /// 判断单个元素是否具备标注资格
    ///
    /// 包含对祖先链的排除检查，可独立于整树扫描使用。
    pub fn is_eligible(&self, node: &Handle) -> bool {
        let name = match get_node_name(node) {
            Some(name) => name,
            None => return false,
        };
        if !constants::CANDIDATE_TAGS.contains(&name) {
            return false;
        }
        if is_excluded_element(node, name) || is_hidden(node) {
            return false;
        }
        if has_excluded_ancestor(node) {
            return false;
        }
        self.content_eligible(node)
    }

    /// 文本内容检查：最小长度与方向相关的字符数阈值
    fn content_eligible(&self, node: &Handle) -> bool {
        if get_node_attr(node, constants::PROCESSED_ATTR).is_some() {
            return false;
        }

        let text = text_content(node);
        let text = text.trim();
        if text.chars().count() < constants::MIN_TEXT_LENGTH {
            return false;
        }

        match self.direction {
            Direction::NativeToTarget => {
                text.chars().filter(|c| is_cjk(*c)).count() >= constants::MIN_CJK_CHARS
            }
            Direction::TargetToNative => {
                text.chars().filter(|c| c.is_ascii_alphabetic()).count()
                    >= constants::MIN_LATIN_CHARS
            }
        }
    }
}

fn is_excluded_element(node: &Handle, name: &str) -> bool {
    if constants::EXCLUDED_TAGS.contains(&name) {
        return true;
    }
    if let Some(class) = get_node_attr(node, "class") {
        for token in class.split_whitespace() {
            let token = token.to_ascii_lowercase();
            if token == constants::WORD_CLASS
                || constants::EXCLUDED_CLASSES.contains(&token.as_str())
            {
                return true;
            }
        }
    }
    if let Some(editable) = get_node_attr(node, "contenteditable") {
        if editable.eq_ignore_ascii_case("true") {
            return true;
        }
    }
    false
}

/// 隐藏检查
///
/// 序列化文档没有计算样式，这里检查内联 `style` 和 `hidden` 属性。
fn is_hidden(node: &Handle) -> bool {
    if get_node_attr(node, "hidden").is_some() {
        return true;
    }
    if let Some(style) = get_node_attr(node, "style") {
        let style = style.replace(' ', "").to_ascii_lowercase();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

fn has_excluded_ancestor(node: &Handle) -> bool {
    let mut current = node.parent.take();
    node.parent.set(current.clone());
    while let Some(weak) = current {
        let parent = match weak.upgrade() {
            Some(parent) => parent,
            None => break,
        };
        if let Some(name) = get_node_name(&parent) {
            if is_excluded_element(&parent, name) || is_hidden(&parent) {
                return true;
            }
        }
        current = parent.parent.take();
        parent.parent.set(current.clone());
    }
    false
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

fn is_kana(c: char) -> bool {
    ('\u{3040}'..='\u{309f}').contains(&c) || ('\u{30a0}'..='\u{30ff}').contains(&c)
}

fn is_hangul(c: char) -> bool {
    ('\u{ac00}'..='\u{d7af}').contains(&c)
}

/// 检测页面语言
///
/// 优先使用 html 元素的 lang 属性，缺失时根据正文前1000个
/// 字符的文字比例推断。
pub fn detect_page_language(document: &Handle) -> Option<String> {
    if let Some(html) = find_element(document, "html") {
        if let Some(lang) = get_node_attr(&html, "lang") {
            let lang = lang.to_ascii_lowercase();
            if !lang.is_empty() {
                if lang.starts_with("zh") {
                    return Some(if lang.contains("tw") || lang.contains("hant") {
                        "zh-TW".to_string()
                    } else {
                        "zh-CN".to_string()
                    });
                }
                for prefix in ["en", "ja", "ko", "fr", "de", "es"] {
                    if lang.starts_with(prefix) {
                        return Some(prefix.to_string());
                    }
                }
            }
        }
    }

    // 通过内容比例检测
    let body = find_element(document, "body")?;
    let text: String = text_content(&body).chars().take(1000).collect();

    let chinese = text.chars().filter(|c| is_cjk(*c)).count();
    let japanese = text.chars().filter(|c| is_kana(*c)).count();
    let korean = text.chars().filter(|c| is_hangul(*c)).count();
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();

    let total = chinese + japanese + korean + latin;
    if total == 0 {
        return None;
    }

    let ratio = |count: usize| count as f64 / total as f64;
    if ratio(chinese) > 0.3 {
        return Some("zh-CN".to_string());
    }
    if ratio(japanese) > 0.1 {
        return Some("ja".to_string());
    }
    if ratio(korean) > 0.1 {
        return Some("ko".to_string());
    }
    if ratio(latin) > 0.5 {
        return Some("en".to_string());
    }
    None
}

/// 根据页面语言和设置决定翻译方向
///
/// 母语页面走正向；目标语言页面在开启反向学习时走反向；
/// 其余页面不做标注。
pub fn resolve_direction(settings: &Settings, page_language: &str) -> Option<Direction> {
    let native_prefix = settings.native_language.split('-').next().unwrap_or("");
    let target_prefix = settings.target_language.split('-').next().unwrap_or("");

    if !native_prefix.is_empty() && page_language.starts_with(native_prefix) {
        Some(Direction::NativeToTarget)
    } else if !target_prefix.is_empty()
        && page_language.starts_with(target_prefix)
        && settings.reverse_learning
    {
        Some(Direction::TargetToNative)
    } else {
        None
    }
}

fn find_element(node: &Handle, tag: &str) -> Option<Handle> {
    if get_node_name(node) == Some(tag) {
        return Some(node.clone());
    }
    for child in node.children.borrow().iter() {
        if let Some(found) = find_element(child, tag) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::html_to_dom;

    const ZH_PARAGRAPH: &str =
        "这是一个足够长的中文段落，用来测试页面扫描器的资格判定逻辑是否正确。";

    fn dom_with_body(body: &str) -> markup5ever_rcdom::RcDom {
        html_to_dom(
            format!("<html><body>{}</body></html>", body).as_bytes(),
            "utf-8".to_string(),
        )
    }

    #[test]
    fn test_candidates_in_document_order() {
        let dom = dom_with_body(&format!(
            "<h1>{zh}</h1><p>{zh}一</p><p>{zh}二</p>",
            zh = ZH_PARAGRAPH
        ));
        let scanner = PageScanner::new(Direction::NativeToTarget);
        let candidates = scanner.find_candidates(&dom.document);

        assert_eq!(candidates.len(), 3);
        assert!(candidates[1].text.ends_with('一'));
        assert!(candidates[2].text.ends_with('二'));
        // 标识按文档顺序分配
        assert_eq!(candidates[0].id, 0);
        assert_eq!(candidates[2].id, 2);
    }

    #[test]
    fn test_short_text_is_skipped() {
        let dom = dom_with_body("<p>短文本</p>");
        let scanner = PageScanner::new(Direction::NativeToTarget);
        assert!(scanner.find_candidates(&dom.document).is_empty());
    }

    #[test]
    fn test_denylisted_regions_are_skipped() {
        let dom = dom_with_body(&format!(
            "<nav><p>{zh}</p></nav>\
             <div class=\"sidebar\"><p>{zh}</p></div>\
             <footer><p>{zh}</p></footer>\
             <p>{zh}</p>",
            zh = ZH_PARAGRAPH
        ));
        let scanner = PageScanner::new(Direction::NativeToTarget);
        let candidates = scanner.find_candidates(&dom.document);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_hidden_elements_are_skipped() {
        let dom = dom_with_body(&format!(
            "<p style=\"display: none\">{zh}</p><p hidden>{zh}</p><p>{zh}</p>",
            zh = ZH_PARAGRAPH
        ));
        let scanner = PageScanner::new(Direction::NativeToTarget);
        assert_eq!(scanner.find_candidates(&dom.document).len(), 1);
    }

    #[test]
    fn test_processed_elements_are_skipped() {
        let dom = dom_with_body(&format!(
            "<p data-lw-processed=\"done\">{zh}</p><p>{zh}</p>",
            zh = ZH_PARAGRAPH
        ));
        let scanner = PageScanner::new(Direction::NativeToTarget);
        assert_eq!(scanner.find_candidates(&dom.document).len(), 1);
    }

    #[test]
    fn test_direction_thresholds() {
        let latin = "This English paragraph definitely has more than twenty latin letters.";
        let dom = dom_with_body(&format!("<p>{}</p>", latin));

        // 中文页面方向：拉丁文本不合格
        let scanner = PageScanner::new(Direction::NativeToTarget);
        assert!(scanner.find_candidates(&dom.document).is_empty());

        // 反向学习方向：拉丁文本合格
        let scanner = PageScanner::new(Direction::TargetToNative);
        assert_eq!(scanner.find_candidates(&dom.document).len(), 1);
    }

    #[test]
    fn test_is_eligible_checks_ancestors() {
        let dom = dom_with_body(&format!("<nav><p>{}</p></nav>", ZH_PARAGRAPH));
        let scanner = PageScanner::new(Direction::NativeToTarget);
        let p = find_element(&dom.document, "p").unwrap();
        assert!(!scanner.is_eligible(&p));
    }

    #[test]
    fn test_detect_language_from_lang_attr() {
        let dom = html_to_dom(
            b"<html lang=\"zh-CN\"><body><p>x</p></body></html>",
            "utf-8".to_string(),
        );
        assert_eq!(detect_page_language(&dom.document), Some("zh-CN".to_string()));
    }

    #[test]
    fn test_detect_language_from_content_ratio() {
        let dom = dom_with_body(&format!("<p>{}</p>", ZH_PARAGRAPH));
        assert_eq!(detect_page_language(&dom.document), Some("zh-CN".to_string()));

        let dom = dom_with_body("<p>Plain English content for ratio detection purposes.</p>");
        assert_eq!(detect_page_language(&dom.document), Some("en".to_string()));
    }

    #[test]
    fn test_resolve_direction_respects_reverse_learning() {
        let mut settings = Settings::default();
        assert_eq!(
            resolve_direction(&settings, "zh-CN"),
            Some(Direction::NativeToTarget)
        );
        assert_eq!(
            resolve_direction(&settings, "en"),
            Some(Direction::TargetToNative)
        );
        assert_eq!(resolve_direction(&settings, "fr"), None);

        settings.reverse_learning = false;
        assert_eq!(resolve_direction(&settings, "en"), None);
    }
}
