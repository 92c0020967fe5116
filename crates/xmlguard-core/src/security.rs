//! 对外入口：先预扫描，通过后才委托解析
//!
//! 命中标记时返回 `GuardError::EntityDetected`，解析器不会被调用；
//! 输入干净但格式错误时返回 `ParseOutcome::Malformed`，不是错误。
use std::path::Path;

use tracing::debug;

use crate::document::{Document, Element, MalformedXml, ParseOutcome};
use crate::error::{GuardError, Result};
use crate::heuristic::{heuristic_scan_with, inspect_with, ScanOutcome};
use crate::markers::MarkerSet;
use crate::options::{GuardOptions, HtmlOptions};
use crate::parser::{parse_into, Mode};

/// 带配置的扫描器（无内部可变状态，可跨线程共享）
#[derive(Debug, Clone, Default)]
pub struct Guard {
    options: GuardOptions,
    markers: MarkerSet,
}

impl Guard {
    pub fn new(options: GuardOptions) -> Self {
        let markers = MarkerSet::with_extra(options.extra_markers.iter().cloned());
        Self { options, markers }
    }

    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    /// 只做预扫描，不解析
    pub fn inspect(&self, xml: &[u8]) -> Result<ScanOutcome> {
        inspect_with(xml, &self.markers)
    }

    /// 扫描并解析为根元素
    pub fn scan(&self, xml: &[u8]) -> Result<ParseOutcome<Element>> {
        let outcome = self.scan_into(xml, Document::default())?;
        Ok(match outcome {
            ParseOutcome::Parsed(Document { root: Some(root), .. }) => ParseOutcome::Parsed(root),
            ParseOutcome::Parsed(_) => ParseOutcome::Malformed(MalformedXml {
                message: "no root element".into(),
                position: 0,
            }),
            ParseOutcome::Malformed(m) => ParseOutcome::Malformed(m),
        })
    }

    /// 扫描并解析进调用方提供的文档容器
    pub fn scan_into(&self, xml: &[u8], document: Document) -> Result<ParseOutcome<Document>> {
        self.gate_and_parse(xml, document, Mode::Xml)
    }

    pub fn scan_file(&self, path: impl AsRef<Path>) -> Result<ParseOutcome<Element>> {
        let bytes = self.read_file(path.as_ref())?;
        self.scan(&bytes)
    }

    pub fn scan_file_into(&self, path: impl AsRef<Path>, document: Document) -> Result<ParseOutcome<Document>> {
        let bytes = self.read_file(path.as_ref())?;
        self.scan_into(&bytes, document)
    }

    /// HTML 模式：预扫描闸门与 XML 相同，解析宽松
    pub fn scan_html(&self, html: &[u8], document: Document, options: HtmlOptions) -> Result<ParseOutcome<Document>> {
        self.gate_and_parse(html, document, Mode::Html(options))
    }

    /// 读取文件后按 HTML 模式扫描（同样受 `max_file_size` 约束）
    pub fn scan_html_file(
        &self,
        path: impl AsRef<Path>,
        document: Document,
        options: HtmlOptions,
    ) -> Result<ParseOutcome<Document>> {
        let bytes = self.read_file(path.as_ref())?;
        self.scan_html(&bytes, document, options)
    }

    fn gate_and_parse(&self, raw: &[u8], mut document: Document, mode: Mode) -> Result<ParseOutcome<Document>> {
        heuristic_scan_with(raw, &self.markers)?;
        Ok(match parse_into(raw, &mut document, mode) {
            Ok(()) => ParseOutcome::Parsed(document),
            Err(m) => ParseOutcome::Malformed(m),
        })
    }

    /// 整读文件；超过 `max_file_size` 时拒绝
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let io_err = |source| GuardError::Io { path: path.to_path_buf(), source };
        if let Some(limit) = self.options.max_file_size {
            let size = std::fs::metadata(path).map_err(io_err)?.len();
            if size > limit {
                return Err(GuardError::FileTooLarge { path: path.to_path_buf(), size, limit });
            }
        }
        let bytes = std::fs::read(path).map_err(io_err)?;
        debug!(path = %path.display(), len = bytes.len(), "read file");
        Ok(bytes)
    }
}

/// 以默认配置扫描并解析为根元素
pub fn scan(xml: &[u8]) -> Result<ParseOutcome<Element>> {
    Guard::default().scan(xml)
}

pub fn scan_into(xml: &[u8], document: Document) -> Result<ParseOutcome<Document>> {
    Guard::default().scan_into(xml, document)
}

pub fn scan_file(path: impl AsRef<Path>) -> Result<ParseOutcome<Element>> {
    Guard::default().scan_file(path)
}

pub fn scan_file_into(path: impl AsRef<Path>, document: Document) -> Result<ParseOutcome<Document>> {
    Guard::default().scan_file_into(path, document)
}

pub fn scan_html(html: &[u8], document: Document, options: HtmlOptions) -> Result<ParseOutcome<Document>> {
    Guard::default().scan_html(html, document, options)
}

pub fn scan_html_file(path: impl AsRef<Path>, document: Document, options: HtmlOptions) -> Result<ParseOutcome<Document>> {
    Guard::default().scan_html_file(path, document, options)
}
