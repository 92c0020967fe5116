//! XML 预解析安全过滤
//!
//! 设计要点：
//! - 解析前按文档实际编码（BOM / 首字节 / 声明）查找 `<!DOCTYPE`、`<!ENTITY`，命中即拒绝（fail closed）。
//! - 标记在每个候选编码下重新编码后做字节匹配，避免 ASCII 模式漏检 UTF-16/32 输入。
//! - 预扫描通过后才把原始字节交给 quick-xml；格式错误以哨兵值返回，与安全拒绝区分。

mod batch;
mod config;
mod document;
mod encoding;
mod error;
mod heuristic;
mod markers;
mod options;
mod parser;
mod security;

pub use batch::{report_file, scan_dir_and_write, FileReport, FileStatus};
pub use config::load_options;
pub use document::{Document, Element, MalformedXml, Node, ParseOutcome};
pub use encoding::{declared_encoding, decode_document, Encoding};
pub use error::{GuardError, Result};
pub use heuristic::{inspect, Detection, ScanOutcome};
pub use markers::{MarkerSet, DOCTYPE, ENTITY};
pub use options::{BatchStats, GuardOptions, HtmlOptions};
pub use security::{scan, scan_file, scan_file_into, scan_html, scan_html_file, scan_into, Guard};
