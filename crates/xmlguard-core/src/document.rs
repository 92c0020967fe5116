//! 解析结果的树形表示（元素 / 文档容器 / 解析结果哨兵）
use serde::Serialize;
use thiserror::Error;

/// 子节点：元素或文本（CDATA 一并视为文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 直接子元素
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// 第一个同名直接子元素
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    /// 直接文本子节点拼接
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// 全部后代文本拼接（DOM `nodeValue`/`textContent` 语义）
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for n in &self.children {
            match n {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// 文档序（先序）收集自身及后代中的同名元素
    pub fn elements_by_tag_name<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        self.collect_named(name, &mut out);
        out
    }

    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
        }
        for e in self.elements() {
            e.collect_named(name, out);
        }
    }
}

/// 调用方可预先构造的文档容器（对应 DOM Document）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub version: String,
    pub encoding: Option<String>,
    pub root: Option<Element>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new("1.0")
    }
}

impl Document {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), encoding: None, root: None }
    }

    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    pub fn elements_by_tag_name(&self, name: &str) -> Vec<&Element> {
        self.root
            .as_ref()
            .map(|r| r.elements_by_tag_name(name))
            .unwrap_or_default()
    }
}

/// 干净但格式错误的输入：非安全问题，作为哨兵值返回而非错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed XML at position {position}: {message}")]
pub struct MalformedXml {
    pub message: String,
    pub position: u64,
}

/// 解析结果：成功或格式错误（安全拒绝走 `GuardError::EntityDetected`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Malformed(MalformedXml),
}

impl<T> ParseOutcome<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    pub fn parsed(&self) -> Option<&T> {
        match self {
            ParseOutcome::Parsed(v) => Some(v),
            ParseOutcome::Malformed(_) => None,
        }
    }

    pub fn into_parsed(self) -> Option<T> {
        match self {
            ParseOutcome::Parsed(v) => Some(v),
            ParseOutcome::Malformed(_) => None,
        }
    }

    pub fn malformed(&self) -> Option<&MalformedXml> {
        match self {
            ParseOutcome::Parsed(_) => None,
            ParseOutcome::Malformed(m) => Some(m),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseOutcome<U> {
        match self {
            ParseOutcome::Parsed(v) => ParseOutcome::Parsed(f(v)),
            ParseOutcome::Malformed(m) => ParseOutcome::Malformed(m),
        }
    }
}
