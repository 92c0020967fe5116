//! 配置文件加载（TOML）
use serde::Deserialize;
use std::path::Path;

use crate::error::{GuardError, Result};
use crate::options::GuardOptions;

/// 顶层配置文件结构（原始字段，加载后归一化为 GuardOptions）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    #[serde(default)]
    extra_markers: Vec<String>,
    #[serde(default)]
    max_file_size: Option<u64>,
    #[serde(default)]
    threads: Option<usize>,
}

/// 从 TOML 文件加载并校验扫描选项
pub fn load_options(path: &Path) -> Result<GuardOptions> {
    let txt = std::fs::read_to_string(path).map_err(|source| GuardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_options(&txt).map_err(|e| match e {
        ParseFailure::Toml(source) => GuardError::Config { path: path.to_path_buf(), source },
        ParseFailure::Invalid(msg) => GuardError::InvalidConfig(msg),
    })
}

#[derive(Debug)]
enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(String),
}

fn parse_options(txt: &str) -> std::result::Result<GuardOptions, ParseFailure> {
    let parsed: OptionsFile = toml::from_str(txt).map_err(ParseFailure::Toml)?;

    // 空标记会匹配任意位置，直接拒绝
    if parsed.extra_markers.iter().any(|m| m.is_empty()) {
        return Err(ParseFailure::Invalid("extra_markers must not contain empty strings".into()));
    }
    if parsed.threads == Some(0) {
        return Err(ParseFailure::Invalid("threads must be at least 1".into()));
    }

    Ok(GuardOptions {
        extra_markers: parsed.extra_markers,
        max_file_size: parsed.max_file_size,
        threads: parsed.threads,
    })
}
