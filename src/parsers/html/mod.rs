//! HTML解析器模块
//!
//! 提供DOM的构建、节点访问和序列化功能，是标注系统操作文档的基础层。

pub mod dom;
pub mod serializer;

pub use dom::{
    create_text_node, get_node_attr, get_node_name, html_to_dom, set_node_attr, text_content,
};
pub use serializer::serialize_document;
