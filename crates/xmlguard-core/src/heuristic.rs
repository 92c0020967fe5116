//! 启发式预扫描：在真正解析之前按文档实际编码查找 DOCTYPE/ENTITY 声明
//!
//! 设计要点：
//! - 候选编码 = BOM 编码 ∪ 首字节嗅探编码 ∪ 声明编码 ∪ UTF-8 基线；声明只追加候选。
//! - 无 BOM 时首字节不一定是 `<`（前导空白、注释），四种宽字符编码全部加入候选。
//! - 任意偏移命中即拒绝，不判断是否真在 DTD 子集内（宁可误杀）。
//! - 纯函数，无共享状态，可并发调用。
use serde::Serialize;
use tracing::{debug, warn};

use crate::encoding::{declared_encoding, Encoding};
use crate::error::{GuardError, Result};
use crate::markers::{MarkerPlan, MarkerSet};

/// 命中详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub marker: String,
    pub encoding: Encoding,
    pub offset: usize,
}

/// 预扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    Flagged(Detection),
}

impl ScanOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanOutcome::Clean)
    }
}

/// 计算本次扫描需要覆盖的编码（去重，保持顺序）
pub(crate) fn candidate_encodings(xml: &[u8]) -> Vec<Encoding> {
    let mut out: Vec<Encoding> = Vec::with_capacity(4);
    let mut push = |enc: Encoding| {
        if !out.contains(&enc) {
            out.push(enc);
        }
    };

    // BOM 决定的字节形态优先；无 BOM 时尝试首字节嗅探
    let shape = Encoding::shape(xml);
    push(shape);

    // 声明编码仅作补充（防止 BOM 与声明不一致时被声明误导）
    if let Some(label) = declared_encoding(xml, shape) {
        for &enc in Encoding::for_label(&label) {
            push(enc);
        }
    }

    push(Encoding::Utf8);

    // 无 BOM 时嗅探可能落空，不能据此排除任何宽字符形态
    if Encoding::from_bom(xml).is_none() {
        for enc in [Encoding::Utf16Le, Encoding::Utf16Be, Encoding::Utf32Le, Encoding::Utf32Be] {
            push(enc);
        }
    }
    out
}

/// 按给定标记集合检查输入，不触发解析
pub(crate) fn inspect_with(xml: &[u8], markers: &MarkerSet) -> Result<ScanOutcome> {
    let encodings = candidate_encodings(xml);
    debug!(candidates = ?encodings, len = xml.len(), "heuristic scan");

    let base = Encoding::from_bom(xml).map_or(0, |(_, len)| len);
    let plan = MarkerPlan::build(markers, &encodings)?;
    Ok(match plan.first_hit(xml, base) {
        Some(hit) => ScanOutcome::Flagged(Detection {
            marker: hit.marker.to_string(),
            encoding: hit.encoding,
            offset: hit.offset,
        }),
        None => ScanOutcome::Clean,
    })
}

/// 以默认标记集合检查输入
pub fn inspect(xml: &[u8]) -> Result<ScanOutcome> {
    inspect_with(xml, &MarkerSet::default())
}

/// 预扫描闸门：命中即返回 `EntityDetected`，调用方不得继续解析
pub(crate) fn heuristic_scan_with(xml: &[u8], markers: &MarkerSet) -> Result<()> {
    match inspect_with(xml, markers)? {
        ScanOutcome::Clean => Ok(()),
        ScanOutcome::Flagged(d) => {
            warn!(marker = %d.marker, encoding = %d.encoding, offset = d.offset, "rejected XML declaration");
            Err(GuardError::EntityDetected {
                marker: d.marker,
                encoding: d.encoding,
                offset: d.offset,
            })
        }
    }
}

/// 默认标记集合下的闸门（crate 内测试直接调用）
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn heuristic_scan(xml: &[u8]) -> Result<()> {
    heuristic_scan_with(xml, &MarkerSet::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XXE: &str = r#"<?xml version="1.0" encoding="{ENCODING}"?>
<!DOCTYPE methodCall [
  <!ENTITY pocdata SYSTEM "file:///etc/passwd">
]>
<methodCall>
    <methodName>retrieved: &pocdata;</methodName>
</methodCall>"#;

    const NO_XXE: &str = r#"<?xml version="1.0" encoding="{ENCODING}"?>
<methodCall>
    <methodName>retrieved: &pocdata;</methodName>
</methodCall>"#;

    const MULTIBYTE: [Encoding; 4] =
        [Encoding::Utf16Le, Encoding::Utf16Be, Encoding::Utf32Le, Encoding::Utf32Be];

    fn bom(enc: Encoding) -> &'static [u8] {
        match enc {
            Encoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            Encoding::Utf16Le => &[0xFF, 0xFE],
            Encoding::Utf16Be => &[0xFE, 0xFF],
            Encoding::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
            Encoding::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
        }
    }

    fn encoded(template: &str, declared: &str, enc: Encoding) -> Vec<u8> {
        enc.encode(&template.replace("{ENCODING}", declared))
    }

    fn with_bom(enc: Encoding, body: Vec<u8>) -> Vec<u8> {
        let mut out = bom(enc).to_vec();
        out.extend(body);
        out
    }

    fn assert_rejected(xml: &[u8], enc: Encoding) {
        let err = heuristic_scan(xml).expect_err(&format!("{enc} input should be rejected"));
        assert!(err.is_entity_detected(), "{enc}: {err}");
        assert!(err.to_string().contains("ENTITY"), "{enc}: {err}");
    }

    #[test]
    fn test_detects_multibyte_xxe_without_bom() {
        for enc in MULTIBYTE {
            let xml = encoded(XXE, enc.label(), enc);
            assert!(!xml.starts_with(bom(enc)), "{enc} fixture must not carry a BOM");
            assert_rejected(&xml, enc);
        }
    }

    #[test]
    fn test_detects_multibyte_xxe_with_bom() {
        for enc in MULTIBYTE {
            let xml = with_bom(enc, encoded(XXE, enc.label(), enc));
            assert_rejected(&xml, enc);
        }
    }

    #[test]
    fn test_does_not_flag_valid_multibyte_xml() {
        for enc in MULTIBYTE {
            let plain = encoded(NO_XXE, enc.label(), enc);
            assert!(heuristic_scan(&plain).is_ok(), "{enc} without BOM");
            let xml = with_bom(enc, plain);
            assert!(heuristic_scan(&xml).is_ok(), "{enc} with BOM");
        }
    }

    #[test]
    fn test_detects_xxe_when_declared_encoding_differs_from_file_encoding() {
        for enc in MULTIBYTE {
            let xml = with_bom(enc, encoded(XXE, "UTF-8", enc));
            assert_rejected(&xml, enc);
            match inspect(&xml).unwrap() {
                ScanOutcome::Flagged(d) => assert_eq!(d.encoding, enc),
                ScanOutcome::Clean => panic!("{enc} should be flagged"),
            }
        }
    }

    #[test]
    fn test_detects_utf8_declarations() {
        let xml = br#"<?xml version="1.0"?>
<!DOCTYPE results [<!ENTITY harmless "completely harmless">]>
<results><result>This result is &harmless;</result></results>"#;
        match inspect(xml).unwrap() {
            ScanOutcome::Flagged(d) => {
                assert_eq!(d.marker, "<!DOCTYPE");
                assert_eq!(d.encoding, Encoding::Utf8);
                assert_eq!(d.offset, 22);
            }
            ScanOutcome::Clean => panic!("expected DOCTYPE to be flagged"),
        }
    }

    #[test]
    fn test_entity_without_doctype_is_flagged() {
        let xml = Encoding::Utf16Le.encode("<a><!ENTITY x 'y'></a>");
        match inspect(&xml).unwrap() {
            ScanOutcome::Flagged(d) => assert_eq!(d.marker, "<!ENTITY"),
            ScanOutcome::Clean => panic!("expected ENTITY to be flagged"),
        }
    }

    #[test]
    fn test_entity_reference_alone_is_clean() {
        assert!(inspect(b"<a>&amp; &custom;</a>").unwrap().is_clean());
        assert!(inspect(b"").unwrap().is_clean());
    }

    #[test]
    fn test_candidates_include_declared_both_endianness() {
        let xml = Encoding::Utf16Le.encode(r#"<?xml version="1.0" encoding="UTF-16"?><a/>"#);
        assert_eq!(
            candidate_encodings(&xml),
            vec![Encoding::Utf16Le, Encoding::Utf16Be, Encoding::Utf8, Encoding::Utf32Le, Encoding::Utf32Be]
        );
    }

    #[test]
    fn test_candidates_without_bom_cover_every_wide_shape() {
        let xml = Encoding::Utf32Be.encode("\n<a/>");
        let mut candidates = candidate_encodings(&xml);
        assert_eq!(candidates[0], Encoding::Utf8);
        candidates.sort_by_key(|e| e.label());
        let mut all = Encoding::ALL.to_vec();
        all.sort_by_key(|e| e.label());
        assert_eq!(candidates, all);
    }

    #[test]
    fn test_detects_multibyte_xxe_after_leading_whitespace() {
        let doc = "\n<!DOCTYPE r [<!ENTITY x SYSTEM \"file:///etc/passwd\">]><r>&x;</r>";
        for enc in MULTIBYTE {
            let xml = enc.encode(doc);
            assert_eq!(Encoding::sniff(&xml), None, "{enc} fixture must defeat sniffing");
            assert_rejected(&xml, enc);
            match inspect(&xml).unwrap() {
                ScanOutcome::Flagged(d) => {
                    assert_eq!(d.encoding, enc);
                    assert_eq!(d.offset, enc.unit_width());
                }
                ScanOutcome::Clean => panic!("{enc} should be flagged"),
            }
        }
    }

    #[test]
    fn test_detects_multibyte_xxe_after_leading_comment() {
        let doc = "<!-- generated -->\r\n<!ENTITY x SYSTEM \"http://evil.example/\"><r/>";
        for enc in MULTIBYTE {
            assert_rejected(&enc.encode(&format!(" {doc}")), enc);
        }
    }

    #[test]
    fn test_candidates_keep_bom_over_declaration() {
        let xml = with_bom(Encoding::Utf32Be, Encoding::Utf32Be.encode(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert_eq!(candidate_encodings(&xml), vec![Encoding::Utf32Be, Encoding::Utf8]);
    }

    #[test]
    fn test_extra_markers() {
        let markers = MarkerSet::with_extra(["<!ATTLIST"]);
        let xml = Encoding::Utf16Be.encode("<a><!ATTLIST a b CDATA #IMPLIED></a>");
        assert!(heuristic_scan(&xml).is_ok());
        let err = heuristic_scan_with(&xml, &markers).unwrap_err();
        assert!(err.to_string().contains("<!ATTLIST as UTF-16BE"));
    }
}
