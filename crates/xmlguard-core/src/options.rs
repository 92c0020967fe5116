//! 扫描选项、HTML 解析选项与批量统计（模块）
use std::ops::{BitOr, BitOrAssign};

/// 扫描选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardOptions {
    /// 追加到默认 DOCTYPE/ENTITY 之外的标记
    pub extra_markers: Vec<String>,
    /// 最大文件大小（字节）；超过则拒绝读取
    pub max_file_size: Option<u64>,
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
}

/// HTML 模式解析选项（位集合，可组合）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HtmlOptions(u8);

impl HtmlOptions {
    /// 丢弃纯空白文本节点
    pub const NO_BLANKS: Self = Self(1 << 0);
    /// 多个顶层元素时不补 `<html>` 根，后续元素并入第一个根
    pub const NO_IMPLIED: Self = Self(1 << 1);
    /// 保留标签/属性名大小写（默认转小写）
    pub const PRESERVE_CASE: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for HtmlOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        HtmlOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for HtmlOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// 批量扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub files_scanned: usize,
    pub clean: usize,
    pub flagged: usize,
    pub malformed: usize,
    pub errors: usize,
}
