//! # 解析器模块
//!
//! 包含HTML文档的解析、节点操作和序列化功能：
//!
//! - `html` - HTML解析器和DOM操作工具

pub mod html;
