//! 本地文件搜索
//!
//! 在配置的根目录下按文件名子串匹配；未带扩展名时按常见文档扩展展开；
//! 结果按修改时间倒序，受条数与时间预算双重限制。

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// 未指明扩展名时尝试的常见文档扩展
const COMMON_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "xlsx", "xls"];

/// 搜索选项：根目录、返回上限、墙钟预算
#[derive(Debug, Clone)]
pub struct FileSearchOptions {
    pub roots: Vec<PathBuf>,
    pub max_results: usize,
    pub budget: Duration,
}

impl Default for FileSearchOptions {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            max_results: 5,
            budget: Duration::from_secs(5),
        }
    }
}

/// 默认搜索范围：~/Documents、~/Downloads、~/Desktop
pub fn default_roots() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return Vec::new();
    };
    ["Documents", "Downloads", "Desktop"]
        .iter()
        .map(|d| home.join(d))
        .collect()
}

/// 一条命中结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHit {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// 按文件名搜索：子串匹配（大小写不敏感），最近修改优先
///
/// 含 `*` / `?` 的查询按 glob 模式整名匹配（如 "*.pdf"、"report_?.docx"）。
pub fn search_files(filename: &str, opts: &FileSearchOptions) -> Vec<FileHit> {
    let start = Instant::now();
    let needle = filename.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let pattern = if needle.contains('*') || needle.contains('?') {
        match glob::Pattern::new(&needle) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!(filename = %filename, "bad glob pattern, falling back to substring: {}", e);
                None
            }
        }
    } else {
        None
    };
    let has_extension = needle.contains('.');

    let mut hits: Vec<FileHit> = Vec::new();
    'roots: for root in &opts.roots {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root)
            .max_depth(3)
            .into_iter()
            .filter_map(Result::ok)
        {
            if start.elapsed() > opts.budget {
                tracing::warn!(filename = %filename, "file search budget exhausted, returning partial results");
                break 'roots;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if let Some(p) = &pattern {
                if !p.matches(&name) {
                    continue;
                }
            } else {
                if !name.contains(&needle) {
                    continue;
                }
                if !has_extension {
                    let ext_ok = COMMON_EXTENSIONS
                        .iter()
                        .any(|e| name.ends_with(&format!(".{}", e)));
                    if !ext_ok {
                        continue;
                    }
                }
            }
            if let Ok(meta) = entry.metadata() {
                let modified = meta
                    .modified()
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                hits.push(FileHit {
                    path: entry.path().display().to_string(),
                    name: entry.file_name().to_string_lossy().to_string(),
                    extension: entry
                        .path()
                        .extension()
                        .map(|e| format!(".{}", e.to_string_lossy()))
                        .unwrap_or_default(),
                    size: meta.len(),
                    modified: DateTime::<Utc>::from(modified),
                });
            }
        }
    }

    hits.sort_by(|a, b| b.modified.cmp(&a.modified));
    hits.truncate(opts.max_results);
    hits
}
