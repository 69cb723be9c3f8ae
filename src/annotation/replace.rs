//! 替换渲染模块
//!
//! 把接受的替换单元就地拼接进元素的文本节点：每个单元只替换
//! 文档顺序上第一处未被替换的出现位置，已定型的替换span内部
//! 不再触碰。渲染样式决定span的展示文本。

use std::cell::RefCell;

use html5ever::interface::{Attribute, QualName};
use html5ever::tendril::StrTendril;
use html5ever::LocalName;
use html5ever::{namespace_url, ns};
use markup5ever_rcdom::{Handle, Node, NodeData};

use crate::annotation::config::constants;
use crate::annotation::parser::TranslationUnit;
use crate::annotation::settings::DisplayStyle;
use crate::parsers::html::{create_text_node, get_node_attr};

/// 将一批替换单元应用到元素，返回实际完成的替换数
///
/// 找不到匹配位置的单元被静默跳过，不算作错误。
pub fn apply_units(element: &Handle, units: &[TranslationUnit], style: DisplayStyle) -> usize {
    let context: String = crate::parsers::html::text_content(element)
        .trim()
        .chars()
        .take(constants::CONTEXT_CHARS)
        .collect();

    let mut count = 0;
    for unit in units {
        if replace_first_occurrence(element, unit, style, &context) {
            count += 1;
        }
    }
    count
}

/// 替换元素文本节点中 `original` 的第一处出现
///
/// 跳过带处理标记的子元素（已定型的替换span）。
pub fn replace_first_occurrence(
    node: &Handle,
    unit: &TranslationUnit,
    style: DisplayStyle,
    context: &str,
) -> bool {
    let mut index = 0;
    loop {
        let child = {
            let children = node.children.borrow();
            match children.get(index) {
                Some(child) => child.clone(),
                None => return false,
            }
        };

        match &child.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if let Some(pos) = text.find(&unit.original) {
                    let before = &text[..pos];
                    let after = &text[pos + unit.original.len()..];

                    let mut replacement: Vec<Handle> = Vec::with_capacity(3);
                    if !before.is_empty() {
                        replacement.push(create_text_node(before));
                    }
                    replacement.push(build_annotation_span(unit, style, context));
                    if !after.is_empty() {
                        replacement.push(create_text_node(after));
                    }

                    let mut children = node.children.borrow_mut();
                    children.remove(index);
                    for (offset, new_node) in replacement.into_iter().enumerate() {
                        children.insert(index + offset, new_node);
                    }
                    return true;
                }
            }
            NodeData::Element { .. } => {
                if get_node_attr(&child, constants::PROCESSED_ATTR).is_none()
                    && replace_first_occurrence(&child, unit, style, context)
                {
                    return true;
                }
            }
            _ => {}
        }

        index += 1;
    }
}

/// 按显示样式渲染span的展示文本
fn render_display_text(unit: &TranslationUnit, style: DisplayStyle) -> String {
    match style {
        DisplayStyle::TranslationOnly => unit.translation.clone(),
        DisplayStyle::OriginalTranslation => {
            format!("{}({})", unit.original, unit.translation)
        }
        DisplayStyle::TranslationOriginal => {
            format!("{}({})", unit.translation, unit.original)
        }
    }
}

/// 构建替换span
///
/// 携带原词、译文和语境的data属性，供词典弹窗消费；
/// 处理标记保证后续扫描和替换不再进入该span。
fn build_annotation_span(unit: &TranslationUnit, style: DisplayStyle, context: &str) -> Handle {
    let attrs = vec![
        attribute("class", constants::WORD_CLASS),
        attribute("data-original", &unit.original),
        attribute("data-translation", &unit.translation),
        attribute("data-context", context),
        attribute(constants::PROCESSED_ATTR, "done"),
    ];

    let span = Node::new(NodeData::Element {
        name: QualName::new(None, ns!(), LocalName::from("span")),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    });

    let label = create_text_node(&render_display_text(unit, style));
    span.children.borrow_mut().push(label);
    span
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, ns!(), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{html_to_dom, serialize_document, text_content};
    use markup5ever_rcdom::RcDom;

    fn unit(original: &str, translation: &str) -> TranslationUnit {
        TranslationUnit {
            original: original.to_string(),
            translation: translation.to_string(),
        }
    }

    fn first_p(dom: &RcDom) -> Handle {
        fn walk(node: &Handle) -> Option<Handle> {
            if crate::parsers::html::get_node_name(node) == Some("p") {
                return Some(node.clone());
            }
            for child in node.children.borrow().iter() {
                if let Some(found) = walk(child) {
                    return Some(found);
                }
            }
            None
        }
        walk(&dom.document).unwrap()
    }

    #[test]
    fn test_replace_splices_span_into_text() {
        let dom = html_to_dom("<p>我喜欢学习新知识</p>".as_bytes(), "utf-8".to_string());
        let p = first_p(&dom);

        let replaced = replace_first_occurrence(
            &p,
            &unit("学习", "learning"),
            DisplayStyle::TranslationOriginal,
            "ctx",
        );
        assert!(replaced);

        let html = String::from_utf8(serialize_document(dom)).unwrap();
        assert!(html.contains("class=\"lw-word\""));
        assert!(html.contains("learning(学习)"));
        assert!(html.contains("data-original=\"学习\""));
    }

    #[test]
    fn test_only_first_occurrence_is_replaced() {
        let dom = html_to_dom(
            "<p>学习使人进步，学习永无止境</p>".as_bytes(),
            "utf-8".to_string(),
        );
        let p = first_p(&dom);

        apply_units(&p, &[unit("学习", "learning")], DisplayStyle::TranslationOnly);

        let text = text_content(&p);
        // 第一处被替换为译文，第二处保持原样
        let occurrences = text.matches("学习").count();
        assert_eq!(occurrences, 1);
        assert_eq!(text.matches("learning").count(), 1);
    }

    #[test]
    fn test_unmatched_unit_is_skipped() {
        let dom = html_to_dom("<p>这里没有目标词</p>".as_bytes(), "utf-8".to_string());
        let p = first_p(&dom);

        let count = apply_units(&p, &[unit("不存在", "missing")], DisplayStyle::TranslationOnly);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_finalized_spans_are_not_revisited() {
        let dom = html_to_dom("<p>学习学习</p>".as_bytes(), "utf-8".to_string());
        let p = first_p(&dom);

        // 第一次替换吞掉第一处出现
        apply_units(&p, &[unit("学习", "A")], DisplayStyle::TranslationOnly);
        // 第二次替换只能命中span之外剩下的文本
        apply_units(&p, &[unit("学习", "B")], DisplayStyle::TranslationOnly);

        let text = text_content(&p);
        assert!(text.contains('A'));
        assert!(text.contains('B'));
        assert!(!text.contains("学习"));
    }

    #[test]
    fn test_display_styles() {
        let u = unit("学习", "learning");
        assert_eq!(
            render_display_text(&u, DisplayStyle::TranslationOnly),
            "learning"
        );
        assert_eq!(
            render_display_text(&u, DisplayStyle::OriginalTranslation),
            "学习(learning)"
        );
        assert_eq!(
            render_display_text(&u, DisplayStyle::TranslationOriginal),
            "learning(学习)"
        );
    }

    #[test]
    fn test_replacement_preserves_surrounding_text() {
        let dom = html_to_dom("<p>前缀学习后缀</p>".as_bytes(), "utf-8".to_string());
        let p = first_p(&dom);

        apply_units(&p, &[unit("学习", "learning")], DisplayStyle::TranslationOnly);
        let text = text_content(&p);
        assert_eq!(text, "前缀learning后缀");
    }
}
