//! 批量目录扫描与报告输出
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::ParseOutcome;
use crate::encoding::Encoding;
use crate::error::GuardError;
use crate::options::{BatchStats, GuardOptions};
use crate::security::Guard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Clean,
    Flagged,
    Malformed,
    Error,
}

/// 单个文件的扫描报告（对应输出 JSON 数组中的一项）
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FileReport {
    fn new(path: &Path, status: FileStatus) -> Self {
        Self { path: path.display().to_string(), status, marker: None, encoding: None, detail: None }
    }
}

/// 扫描并解析单个文件，把结果归类为报告（错误不向上传播）
pub fn report_file(guard: &Guard, path: &Path) -> FileReport {
    match guard.scan_file(path) {
        Ok(ParseOutcome::Parsed(_)) => FileReport::new(path, FileStatus::Clean),
        Ok(ParseOutcome::Malformed(m)) => FileReport {
            detail: Some(m.to_string()),
            ..FileReport::new(path, FileStatus::Malformed)
        },
        Err(GuardError::EntityDetected { marker, encoding, .. }) => FileReport {
            marker: Some(marker),
            encoding: Some(encoding),
            ..FileReport::new(path, FileStatus::Flagged)
        },
        Err(e) => FileReport { detail: Some(e.to_string()), ..FileReport::new(path, FileStatus::Error) },
    }
}

/// 扫描目录并将报告以 JSON 数组流式写入 `out`
/// 稳定性保证：先收集文件并按文件名排序，并行扫描后按原顺序输出
pub fn scan_dir_and_write(input_dir: &Path, out: &mut dyn Write, opts: &GuardOptions) -> Result<BatchStats> {
    let guard = Guard::new(opts.clone());

    let mut files: Vec<PathBuf> = vec![];
    // 只扫描目录第一层
    for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", input_dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    debug!(files = files.len(), threads, "batch scan");

    let reports: Vec<FileReport> = if threads > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("build rayon pool")?;
        // par_iter + collect 保持输入顺序
        pool.install(|| files.par_iter().map(|p| report_file(&guard, p)).collect())
    } else {
        files.iter().map(|p| report_file(&guard, p)).collect()
    };

    let mut stats = BatchStats::default();
    write!(out, "[")?;
    for (i, report) in reports.iter().enumerate() {
        stats.files_scanned += 1;
        match report.status {
            FileStatus::Clean => stats.clean += 1,
            FileStatus::Flagged => stats.flagged += 1,
            FileStatus::Malformed => stats.malformed += 1,
            FileStatus::Error => stats.errors += 1,
        }
        if i > 0 {
            write!(out, ",")?;
        }
        serde_json::to_writer(&mut *out, report)?;
    }
    write!(out, "]")?;

    info!(scanned = stats.files_scanned, flagged = stats.flagged, "batch scan finished");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_clean.xml"), "<results><result>test</result></results>").unwrap();
        fs::write(dir.path().join("b_xxe.xml"), "<!DOCTYPE r [<!ENTITY x SYSTEM \"file:///etc/passwd\">]><r>&x;</r>").unwrap();
        let mut utf16 = vec![0xFF, 0xFE];
        utf16.extend(Encoding::Utf16Le.encode("<?xml version=\"1.0\" encoding=\"UTF-8\"?><!DOCTYPE r><r/>"));
        fs::write(dir.path().join("c_utf16.xml"), utf16).unwrap();
        fs::write(dir.path().join("d_broken.xml"), "<foo>test</bar>").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/skipped.xml"), "<!ENTITY x 'y'>").unwrap();
        dir
    }

    #[test]
    fn test_batch_report_order_and_stats() {
        let dir = fixture_dir();
        for threads in [1, 4] {
            let mut out = Vec::new();
            let opts = GuardOptions { threads: Some(threads), ..GuardOptions::default() };
            let stats = scan_dir_and_write(dir.path(), &mut out, &opts).unwrap();
            assert_eq!(
                stats,
                BatchStats { files_scanned: 4, clean: 1, flagged: 2, malformed: 1, errors: 0 }
            );

            let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
            let items = json.as_array().unwrap();
            let statuses: Vec<&str> = items.iter().map(|v| v["status"].as_str().unwrap()).collect();
            assert_eq!(statuses, vec!["clean", "flagged", "flagged", "malformed"]);
            assert_eq!(items[1]["marker"], "<!DOCTYPE");
            assert_eq!(items[2]["encoding"], "UTF-16LE");
            assert!(items[0].get("detail").is_none());
        }
    }

    #[test]
    fn test_report_file_error_status() {
        let report = report_file(&Guard::default(), Path::new("/nonexistent/file.xml"));
        assert_eq!(report.status, FileStatus::Error);
        assert!(report.detail.unwrap().contains("Failed to read file"));
    }
}
