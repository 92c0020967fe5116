//! 错误类型
use std::path::PathBuf;

use thiserror::Error;

use crate::encoding::Encoding;

#[derive(Error, Debug)]
pub enum GuardError {
    /// 启发式扫描命中 DOCTYPE/ENTITY 等声明；消息中始终包含 `ENTITY`
    #[error("Detected use of ENTITY in XML ({marker} as {encoding} at byte {offset}), disabled to prevent XXE/XEE attacks")]
    EntityDetected {
        marker: String,
        encoding: Encoding,
        offset: usize,
    },

    #[error("Failed to read file: {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File too large: {} ({size} bytes, limit {limit})", .path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Failed to parse config file: {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build marker automaton: {0}")]
    MarkerPlan(#[from] aho_corasick::BuildError),
}

impl GuardError {
    pub fn is_entity_detected(&self) -> bool {
        matches!(self, GuardError::EntityDetected { .. })
    }

    /// 底层 I/O 错误类别（仅 `Io` 变体）
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            GuardError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
