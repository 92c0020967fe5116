//! 预扫描闸门的性质测试
//!
//! 不含 `<!` 的文本不可能携带声明，永远不应被拦截；拼入任意文本的声明无论
//! 有无 BOM，都必须按字节实际使用的编码被拦截。

use proptest::prelude::*;
use xmlguard_core::{inspect, Encoding, ScanOutcome};

fn any_encoding() -> impl Strategy<Value = Encoding> {
    prop::sample::select(Encoding::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn text_without_bang_is_never_flagged(s in "[^!]{0,400}", enc in any_encoding()) {
        let outcome = inspect(&enc.encode(&s)).unwrap();
        prop_assert!(outcome.is_clean(), "{} input flagged: {:?}", enc, s);
    }

    #[test]
    fn spliced_declaration_is_always_flagged(
        head in "[a-z<>/ ]{0,200}",
        tail in "\\PC{0,200}",
        marker in prop::sample::select(vec!["<!DOCTYPE", "<!ENTITY"]),
        enc in any_encoding(),
        with_bom in any::<bool>(),
    ) {
        let doc = format!("<?xml version=\"1.0\" encoding=\"{}\"?>{}{} x>{}", enc.label(), head, marker, tail);
        let mut raw = Vec::new();
        if with_bom {
            raw.extend(enc.encode("\u{FEFF}"));
        }
        raw.extend(enc.encode(&doc));
        match inspect(&raw).unwrap() {
            ScanOutcome::Flagged(d) => prop_assert_eq!(d.encoding, enc),
            ScanOutcome::Clean => prop_assert!(false, "{} input not flagged", enc),
        }
    }
}
