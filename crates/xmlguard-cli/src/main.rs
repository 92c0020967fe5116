use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use xmlguard_core::{
    load_options, scan_dir_and_write, Document, Guard, GuardError, GuardOptions, HtmlOptions, ParseOutcome,
};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "xmlguard", version, about = "XML 预解析安全过滤（DOCTYPE/ENTITY 检测）")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 检查单个文件：0=干净，1=命中，2=格式错误
    Check {
        /// 待检查的 XML/HTML 文件
        file: PathBuf,

        /// 以 HTML 模式解析
        #[arg(long)]
        html: bool,

        /// 配置文件路径（TOML）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 额外拒绝的标记（可重复）
        #[arg(long = "marker")]
        markers: Vec<String>,
    },
    /// 扫描目录并生成报告（JSON 数组）
    Scan {
        /// 输入目录
        #[arg(long)]
        input: PathBuf,

        /// 输出文件
        #[arg(long, default_value = "./report.json")]
        output: PathBuf,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 最大扫描文件大小（单位字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        /// 配置文件路径（TOML）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 额外拒绝的标记（可重复）
        #[arg(long = "marker")]
        markers: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file, html, config, markers } => {
            let opts = resolve_options(config.as_deref(), markers)?;
            check_file(&Guard::new(opts), &file, html)
        }
        Commands::Scan { input, output, threads, max_file_size, config, markers } => {
            info!(?input, ?output, "starting scan");
            let mut opts = resolve_options(config.as_deref(), markers)?;
            // 命令行参数覆盖配置文件
            if let Some(threads) = parse_threads(&threads) {
                opts.threads = Some(threads);
            }
            if max_file_size.is_some() {
                opts.max_file_size = max_file_size;
            }

            let mut out = BufWriter::new(File::create(&output).context("create output file")?);
            let stats = scan_dir_and_write(&input, &mut out, &opts).context("scan and write failed")?;
            out.flush().context("flush output file")?;

            info!(
                files_scanned = stats.files_scanned,
                flagged = stats.flagged,
                malformed = stats.malformed,
                errors = stats.errors,
                "scan finished"
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 加载配置文件（可选）并追加命令行标记
fn resolve_options(config: Option<&Path>, markers: Vec<String>) -> Result<GuardOptions> {
    let mut opts = match config {
        Some(path) => load_options(path).with_context(|| format!("load config {}", path.display()))?,
        None => GuardOptions::default(),
    };
    opts.extra_markers.extend(markers.into_iter().filter(|m| !m.is_empty()));
    Ok(opts)
}

fn check_file(guard: &Guard, file: &Path, html: bool) -> Result<ExitCode> {
    let outcome = if html {
        guard.scan_html_file(file, Document::default(), HtmlOptions::empty())
    } else {
        guard.scan_file_into(file, Document::default())
    };

    match outcome {
        Ok(ParseOutcome::Parsed(doc)) => {
            let root = doc.root().map(|r| r.name.as_str()).unwrap_or("-");
            println!("clean: {} (root <{}>)", file.display(), root);
            Ok(ExitCode::SUCCESS)
        }
        Ok(ParseOutcome::Malformed(m)) => {
            println!("malformed: {}: {}", file.display(), m);
            Ok(ExitCode::from(2))
        }
        Err(e @ GuardError::EntityDetected { .. }) => {
            println!("flagged: {}: {}", file.display(), e);
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e).with_context(|| format!("check {}", file.display())),
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return None;
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threads() {
        assert_eq!(parse_threads("auto"), None);
        assert_eq!(parse_threads("AUTO"), None);
        assert_eq!(parse_threads("4"), Some(4));
        assert_eq!(parse_threads("0"), None);
        assert_eq!(parse_threads("x"), None);
    }

    #[test]
    fn test_resolve_options_appends_markers() {
        let opts = resolve_options(None, vec!["<!ATTLIST".into(), String::new()]).unwrap();
        assert_eq!(opts.extra_markers, vec!["<!ATTLIST".to_string()]);
    }
}
