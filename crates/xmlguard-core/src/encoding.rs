//! 编码探测（BOM + 首字节嗅探 + XML 声明）
//!
//! 设计要点：
//! - BOM 优先，按长度降序匹配（`FF FE 00 00` 必须先于 `FF FE` 判定）。
//! - 无 BOM 时按 XML 1.0 附录 F 的首字节模式嗅探宽度/字节序。
//! - 声明中的 `encoding="..."` 只作为补充候选，不覆盖 BOM 结果。
//! - UTF-8/UTF-16 及声明的遗留编码交给 encoding_rs 解码，UTF-32 自行处理。
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// 文档实际使用的字符编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Encoding {
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "UTF-16LE")]
    Utf16Le,
    #[serde(rename = "UTF-16BE")]
    Utf16Be,
    #[serde(rename = "UTF-32LE")]
    Utf32Le,
    #[serde(rename = "UTF-32BE")]
    Utf32Be,
}

/// 嗅探声明时最多读取的码元数（`<?xml ... ?>` 足够短）
const PROLOG_UNITS: usize = 256;

impl Encoding {
    pub const ALL: [Encoding; 5] = [
        Encoding::Utf8,
        Encoding::Utf16Le,
        Encoding::Utf16Be,
        Encoding::Utf32Le,
        Encoding::Utf32Be,
    ];

    /// 仅依据 BOM 判定编码；无可识别 BOM 时退回 UTF-8（不报错）
    pub fn detect(input: &[u8]) -> Self {
        Self::from_bom(input).map(|(enc, _)| enc).unwrap_or(Encoding::Utf8)
    }

    /// 识别 BOM，返回编码与 BOM 字节长度
    pub fn from_bom(input: &[u8]) -> Option<(Self, usize)> {
        // 最长优先，避免 UTF-32LE 被误判为 UTF-16LE
        const BOMS: [(&[u8], Encoding); 5] = [
            (&[0xFF, 0xFE, 0x00, 0x00], Encoding::Utf32Le),
            (&[0x00, 0x00, 0xFE, 0xFF], Encoding::Utf32Be),
            (&[0xEF, 0xBB, 0xBF], Encoding::Utf8),
            (&[0xFF, 0xFE], Encoding::Utf16Le),
            (&[0xFE, 0xFF], Encoding::Utf16Be),
        ];
        BOMS.iter()
            .find(|(bom, _)| input.starts_with(bom))
            .map(|(bom, enc)| (*enc, bom.len()))
    }

    /// 无 BOM 时根据首个 `<` 的字节形态推断编码（XML 1.0 附录 F）
    pub fn sniff(input: &[u8]) -> Option<Self> {
        match input {
            [0x00, 0x00, 0x00, b'<', ..] => Some(Encoding::Utf32Be),
            [b'<', 0x00, 0x00, 0x00, ..] => Some(Encoding::Utf32Le),
            [0x00, b'<', ..] => Some(Encoding::Utf16Be),
            [b'<', 0x00, ..] => Some(Encoding::Utf16Le),
            _ => None,
        }
    }

    /// 文档的码元形态：BOM 优先，其次首字节嗅探，都没有则视为 UTF-8
    pub fn shape(input: &[u8]) -> Self {
        Self::from_bom(input)
            .map(|(enc, _)| enc)
            .or_else(|| Self::sniff(input))
            .unwrap_or(Encoding::Utf8)
    }

    /// 码元宽度（字节）
    pub const fn unit_width(self) -> usize {
        match self {
            Encoding::Utf8 => 1,
            Encoding::Utf16Le | Encoding::Utf16Be => 2,
            Encoding::Utf32Le | Encoding::Utf32Be => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf32Le => "UTF-32LE",
            Encoding::Utf32Be => "UTF-32BE",
        }
    }

    /// 将声明中的编码名映射为可能的字节形态
    /// - 未标注字节序的 UTF-16/UTF-32 同时返回 LE 与 BE
    /// - 其余（ISO-8859-*、US-ASCII、windows-* 等）对 ASCII 兼容，按 UTF-8 形态处理
    pub fn for_label(label: &str) -> &'static [Encoding] {
        let norm: String = label
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match norm.as_str() {
            "UTF16LE" | "UCS2LE" => &[Encoding::Utf16Le],
            "UTF16BE" | "UCS2BE" => &[Encoding::Utf16Be],
            "UTF16" | "UCS2" | "ISO10646UCS2" | "UNICODE" => &[Encoding::Utf16Le, Encoding::Utf16Be],
            "UTF32LE" | "UCS4LE" => &[Encoding::Utf32Le],
            "UTF32BE" | "UCS4BE" => &[Encoding::Utf32Be],
            "UTF32" | "UCS4" | "ISO10646UCS4" => &[Encoding::Utf32Le, Encoding::Utf32Be],
            _ => &[Encoding::Utf8],
        }
    }

    /// 将文本重新编码为本编码的字节序列（不带 BOM）
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Encoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Encoding::Utf32Le => text.chars().flat_map(|c| u32::from(c).to_le_bytes()).collect(),
            Encoding::Utf32Be => text.chars().flat_map(|c| u32::from(c).to_be_bytes()).collect(),
        }
    }

    /// 解码为 UTF-8 文本；若输入以本编码的 BOM 开头则先剥离
    pub fn decode(self, input: &[u8]) -> Result<Cow<'_, str>, String> {
        let bytes = match Self::from_bom(input) {
            Some((enc, len)) if enc == self => &input[len..],
            _ => input,
        };
        if let Some(codec) = self.codec() {
            return codec
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| format!("Invalid {}: malformed byte sequence", self.label()));
        }
        if bytes.len() % 4 != 0 {
            return Err(format!("Invalid {}: truncated code unit", self.label()));
        }
        bytes
            .chunks_exact(4)
            .map(|c| {
                let v = self.unit_at(c);
                char::from_u32(v).ok_or_else(|| format!("Invalid {}: scalar value {:#x}", self.label(), v))
            })
            .collect::<Result<String, _>>()
            .map(Cow::Owned)
    }

    /// encoding_rs 中对应的编解码器；UTF-32 不在 WHATWG 编码表里
    fn codec(self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            Encoding::Utf8 => Some(encoding_rs::UTF_8),
            Encoding::Utf16Le => Some(encoding_rs::UTF_16LE),
            Encoding::Utf16Be => Some(encoding_rs::UTF_16BE),
            Encoding::Utf32Le | Encoding::Utf32Be => None,
        }
    }

    /// 按本编码的字节序读取一个码元
    fn unit_at(self, chunk: &[u8]) -> u32 {
        match (self, chunk) {
            (Encoding::Utf16Le, [a, b]) => u32::from(u16::from_le_bytes([*a, *b])),
            (Encoding::Utf16Be, [a, b]) => u32::from(u16::from_be_bytes([*a, *b])),
            (Encoding::Utf32Le, [a, b, c, d]) => u32::from_le_bytes([*a, *b, *c, *d]),
            (Encoding::Utf32Be, [a, b, c, d]) => u32::from_be_bytes([*a, *b, *c, *d]),
            (_, [a, ..]) => u32::from(*a),
            _ => 0,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*<\?xml\s[^>]*?\bencoding\s*=\s*["']([A-Za-z][A-Za-z0-9._\-]*)["']"#)
            .expect("build encoding declaration regex")
    })
}

/// 以给定码元形态读取序言，提取 `<?xml ... encoding="..."?>` 中声明的编码名
///
/// 非 ASCII 码元投影为 `?`，因此即使序言之后的内容无法解码也不会失败。
pub fn declared_encoding(input: &[u8], shape: Encoding) -> Option<String> {
    let bytes = match Encoding::from_bom(input) {
        Some((_, len)) => &input[len..],
        None => input,
    };
    let width = shape.unit_width();
    let prolog: String = bytes
        .chunks_exact(width)
        .take(PROLOG_UNITS)
        .map(|c| match shape.unit_at(c) {
            v @ 0..=0x7F => v as u8 as char,
            _ => '?',
        })
        .take_while(|&c| c != '>')
        .chain(std::iter::once('>'))
        .collect();
    declaration_regex()
        .captures(&prolog)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 解码整份文档，供解析委托使用
///
/// 有 BOM 或宽字符形态时按该形态解码；否则若序言声明了 ASCII 兼容的遗留编码
/// （ISO-8859-1、windows-1252、Shift_JIS 等），按声明解码，其余一律按 UTF-8。
pub fn decode_document(input: &[u8]) -> Result<Cow<'_, str>, String> {
    let shape = Encoding::shape(input);
    if shape != Encoding::Utf8 || Encoding::from_bom(input).is_some() {
        return shape.decode(input);
    }
    let legacy = declared_encoding(input, shape)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .filter(|codec| *codec != encoding_rs::UTF_8 && codec.is_ascii_compatible());
    match legacy {
        Some(codec) => codec
            .decode_without_bom_handling_and_without_replacement(input)
            .ok_or_else(|| format!("Invalid {}: malformed byte sequence", codec.name())),
        None => shape.decode(input),
    }
}
