//! 标记集合与多编码匹配计划（Aho-Corasick）
//!
//! 每个标记在每个候选编码下重新编码为字节序列（而不是把 ASCII 模式直接拿去匹配
//! UTF-16/32 字节），所有字节模式合并进同一个自动机，命中的模式索引映射回
//! （标记，编码）。
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, BuildError, MatchKind};

use crate::encoding::Encoding;

pub const DOCTYPE: &str = "<!DOCTYPE";
pub const ENTITY: &str = "<!ENTITY";

/// 需要拒绝的声明标记（默认 DOCTYPE + ENTITY，只能追加不能删减）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    markers: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self { markers: vec![DOCTYPE.to_string(), ENTITY.to_string()] }
    }
}

impl MarkerSet {
    /// 在默认集合上追加额外标记；空串与重复项被忽略
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for m in extra {
            let m = m.into();
            if !m.is_empty() && !set.markers.contains(&m) {
                set.markers.push(m);
            }
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// 单次命中
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hit<'m> {
    pub(crate) marker: &'m str,
    pub(crate) encoding: Encoding,
    pub(crate) offset: usize,
}

/// 匹配计划：每次扫描按候选编码构建，用完即弃
pub(crate) struct MarkerPlan<'m> {
    ac: AhoCorasick,
    /// 模式索引 -> (标记, 编码)，与 ac 模式一一对应
    targets: Vec<(&'m str, Encoding)>,
}

impl<'m> MarkerPlan<'m> {
    pub(crate) fn build(markers: &'m MarkerSet, encodings: &[Encoding]) -> Result<Self, BuildError> {
        let mut patterns: Vec<Vec<u8>> = Vec::with_capacity(markers.len() * encodings.len());
        let mut targets = Vec::with_capacity(patterns.capacity());
        for &enc in encodings {
            for marker in markers.iter() {
                let bytes = enc.encode(marker);
                // ASCII 标记在 UTF-8 与未知单字节编码下字节相同，去重
                if patterns.contains(&bytes) {
                    continue;
                }
                patterns.push(bytes);
                targets.push((marker, enc));
            }
        }
        // 重叠匹配需要 Standard 语义
        let ac = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(&patterns)?;
        Ok(Self { ac, targets })
    }

    /// 任意位置出现任意模式即命中
    ///
    /// 优先返回与所属编码码元对齐（相对 `base`，即 BOM 之后）的最左命中；
    /// 没有对齐命中时返回最左的错位命中。UTF-16LE 文本错一个字节即是 UTF-16BE
    /// 的字节形态，对齐优先保证报告的编码是文档真正使用的那个。
    pub(crate) fn first_hit(&self, haystack: &[u8], base: usize) -> Option<Hit<'m>> {
        let mut aligned: Option<Hit<'m>> = None;
        let mut shifted: Option<Hit<'m>> = None;
        for m in self.ac.find_overlapping_iter(haystack) {
            let (marker, encoding) = self.targets[m.pattern().as_usize()];
            let hit = Hit { marker, encoding, offset: m.start() };
            let is_aligned = hit.offset >= base && (hit.offset - base) % encoding.unit_width() == 0;
            let slot = if is_aligned { &mut aligned } else { &mut shifted };
            if slot.as_ref().map_or(true, |best| hit.offset < best.offset) {
                *slot = Some(hit);
            }
        }
        aligned.or(shifted)
    }
}
