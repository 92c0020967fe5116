//! 解析委托：预扫描通过后，把原始字节交给 quick-xml 构建树
//!
//! - XML 模式严格：结束标签必须匹配，未闭合/多根/根外文本/未知实体均视为格式错误。
//! - HTML 模式宽松：忽略不匹配的结束标签，空元素自闭合，EOF 时自动闭合。
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::document::{Document, Element, MalformedXml, Node};
use crate::encoding::decode_document;
use crate::options::HtmlOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Xml,
    Html(HtmlOptions),
}

/// HTML 空元素（无结束标签）
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn malformed(message: impl Into<String>, position: u64) -> MalformedXml {
    MalformedXml { message: message.into(), position }
}

/// 将原始字节解析进 `doc`；失败时返回格式错误（不修改调用方容器以外的状态）
pub(crate) fn parse_into(raw: &[u8], doc: &mut Document, mode: Mode) -> Result<(), MalformedXml> {
    // 与预扫描使用同一套形态判定；单字节形态再参考声明的遗留编码
    let text = decode_document(raw).map_err(|message| malformed(message, 0))?;

    let mut reader = Reader::from_str(&text);
    if let Mode::Html(_) = mode {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut builder = TreeBuilder::new(mode);
    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                let err = malformed(e.to_string(), reader.error_position() as u64);
                debug!(%err, "parse failed");
                return Err(err);
            }
        };
        let pos = reader.buffer_position() as u64;
        match event {
            Event::Decl(decl) => {
                if let Ok(v) = decl.version() {
                    doc.version = String::from_utf8_lossy(&v).into_owned();
                }
                if let Some(Ok(enc)) = decl.encoding() {
                    doc.encoding = Some(String::from_utf8_lossy(&enc).into_owned());
                }
            }
            Event::Start(e) => builder.open(&e, pos)?,
            Event::Empty(e) => {
                let el = builder.element_from(&e, pos)?;
                builder.attach(el, pos)?;
            }
            Event::End(e) => {
                let name = builder.normalize_name(e.name().as_ref());
                builder.close(&name, pos)?;
            }
            Event::Text(t) => {
                let s = match t.unescape() {
                    Ok(s) => s.into_owned(),
                    Err(e) if builder.is_html() => {
                        debug!(error = %e, "keeping unrecognized entity verbatim");
                        String::from_utf8_lossy(&t).into_owned()
                    }
                    Err(e) => return Err(malformed(e.to_string(), pos)),
                };
                builder.text(s, pos)?;
            }
            Event::CData(c) => builder.text(String::from_utf8_lossy(&c).into_owned(), pos)?,
            Event::Eof => break,
            // 注释、处理指令、DOCTYPE（已被预扫描拦截）均不入树
            _ => {}
        }
    }

    doc.root = builder.finish(reader.buffer_position() as u64)?;
    Ok(())
}

/// 基于栈的树构建器
struct TreeBuilder {
    mode: Mode,
    stack: Vec<Element>,
    top: Vec<Node>,
}

impl TreeBuilder {
    fn new(mode: Mode) -> Self {
        Self { mode, stack: Vec::new(), top: Vec::new() }
    }

    fn is_html(&self) -> bool {
        matches!(self.mode, Mode::Html(_))
    }

    fn html_flag(&self, flag: HtmlOptions) -> bool {
        match self.mode {
            Mode::Html(opts) => opts.contains(flag),
            Mode::Xml => false,
        }
    }

    fn normalize_name(&self, raw: &[u8]) -> String {
        let name = String::from_utf8_lossy(raw).into_owned();
        if self.is_html() && !self.html_flag(HtmlOptions::PRESERVE_CASE) {
            name.to_ascii_lowercase()
        } else {
            name
        }
    }

    fn element_from(&self, start: &BytesStart<'_>, pos: u64) -> Result<Element, MalformedXml> {
        let mut el = Element::new(self.normalize_name(start.name().as_ref()));
        let attrs = if self.is_html() { start.html_attributes() } else { start.attributes() };
        for attr in attrs {
            let attr = attr.map_err(|e| malformed(e.to_string(), pos))?;
            let key = self.normalize_name(attr.key.as_ref());
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) if self.is_html() => String::from_utf8_lossy(&attr.value).into_owned(),
                Err(e) => return Err(malformed(e.to_string(), pos)),
            };
            el.attributes.push((key, value));
        }
        Ok(el)
    }

    fn open(&mut self, start: &BytesStart<'_>, pos: u64) -> Result<(), MalformedXml> {
        let el = self.element_from(start, pos)?;
        if self.is_html() && VOID_ELEMENTS.contains(&el.name.to_ascii_lowercase().as_str()) {
            return self.attach(el, pos);
        }
        self.stack.push(el);
        Ok(())
    }

    fn close(&mut self, name: &str, pos: u64) -> Result<(), MalformedXml> {
        if !self.is_html() {
            // 名称匹配已由 reader 校验
            return match self.stack.pop() {
                Some(el) => self.attach(el, pos),
                None => Err(malformed(format!("unexpected end tag </{}>", name), pos)),
            };
        }
        // HTML：关闭最近的同名元素，其间未闭合的元素一并闭合；找不到则忽略
        let Some(idx) = self.stack.iter().rposition(|e| e.name.eq_ignore_ascii_case(name)) else {
            debug!(name, "ignoring unmatched end tag");
            return Ok(());
        };
        while self.stack.len() > idx {
            if let Some(el) = self.stack.pop() {
                self.attach(el, pos)?;
            }
        }
        Ok(())
    }

    fn attach(&mut self, el: Element, pos: u64) -> Result<(), MalformedXml> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(Node::Element(el));
            return Ok(());
        }
        let has_root = self.top.iter().any(|n| matches!(n, Node::Element(_)));
        if has_root && !self.is_html() {
            return Err(malformed(format!("multiple root elements (found <{}>)", el.name), pos));
        }
        self.top.push(Node::Element(el));
        Ok(())
    }

    fn text(&mut self, text: String, pos: u64) -> Result<(), MalformedXml> {
        let blank = text.trim().is_empty();
        if blank && self.html_flag(HtmlOptions::NO_BLANKS) {
            return Ok(());
        }
        let html = self.is_html();
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(Node::Text(text)),
            // 根外空白允许（序言与根之间的换行等）
            None if blank => {}
            None if html => self.top.push(Node::Text(text)),
            None => return Err(malformed("text outside root element", pos)),
        }
        Ok(())
    }

    fn finish(mut self, pos: u64) -> Result<Option<Element>, MalformedXml> {
        match self.mode {
            Mode::Xml => {
                if let Some(open) = self.stack.last() {
                    return Err(malformed(format!("unclosed element <{}>", open.name), pos));
                }
                let root = self.top.into_iter().find_map(|n| match n {
                    Node::Element(e) => Some(e),
                    Node::Text(_) => None,
                });
                match root {
                    Some(r) => Ok(Some(r)),
                    None => Err(malformed("no root element", pos)),
                }
            }
            Mode::Html(opts) => {
                // EOF 自动闭合
                while let Some(el) = self.stack.pop() {
                    self.attach(el, pos)?;
                }
                Ok(Self::html_root(self.top, opts))
            }
        }
    }

    fn html_root(mut top: Vec<Node>, opts: HtmlOptions) -> Option<Element> {
        if opts.contains(HtmlOptions::NO_IMPLIED) {
            let mut elements = top.into_iter().filter_map(|n| match n {
                Node::Element(e) => Some(e),
                Node::Text(_) => None,
            });
            let mut root = elements.next()?;
            root.children.extend(elements.map(Node::Element));
            return Some(root);
        }
        match top.len() {
            0 => None,
            1 if matches!(top[0], Node::Element(_)) => match top.pop() {
                Some(Node::Element(e)) => Some(e),
                _ => None,
            },
            _ => {
                let mut html = Element::new("html");
                html.children = top;
                Some(html)
            }
        }
    }
}
