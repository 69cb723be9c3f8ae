use std::cell::RefCell;

use encoding_rs::Encoding;
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: String) -> RcDom {
    let s: String;

    if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
        let (string, _, _) = encoding.decode(data);
        s = string.to_string();
    } else {
        s = String::from_utf8_lossy(data).to_string();
    }

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap()
}

/// 获取元素节点的标签名
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 读取元素节点的属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 写入（或移除）元素节点的属性值
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    use html5ever::interface::{Attribute, QualName};
    use html5ever::LocalName;
    use html5ever::{namespace_url, ns};

    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr_i: Option<usize> = None;

        while i < attrs_mut.len() {
            let name = attrs_mut[i].name.local.as_ref();

            if name.eq_ignore_ascii_case(attr_name) {
                found_existing_attr_i = Some(i);
            }

            i += 1;
        }

        if let Some(attr_i) = found_existing_attr_i {
            match attr_value {
                Some(value) => {
                    let _ = &attrs_mut[attr_i].value.clear();
                    let _ = &attrs_mut[attr_i].value.push_slice(value.as_str());
                }
                None => {
                    attrs_mut.remove(attr_i);
                }
            }
        } else if let Some(value) = attr_value {
            let name = LocalName::from(attr_name);

            attrs_mut.push(Attribute {
                name: QualName::new(None, ns!(), name),
                value: StrTendril::from(value),
            });
        }
    }
}

/// 创建一个独立的文本节点
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// 拼接节点的全部后代文本
pub fn text_content(node: &Handle) -> String {
    let mut result = String::new();
    collect_text(node, &mut result);
    result
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => {
            out.push_str(&contents.borrow());
        }
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}
