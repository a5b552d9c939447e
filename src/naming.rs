//! 上传文件名清洗与防冲突路径解析。

use chrono::Utc;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 将客户端给出的任意文件名转换为安全的单段文件名。
///
/// 丢弃目录部分（`/` 与 `\` 均视为分隔符），把 `[A-Za-z0-9._-]` 之外的每段连续字符
/// 替换为一个 `_`。结果为空、`.` 或 `..` 时改用 `upload_<unix 时间戳>`，因此结果总是
/// 根目录下的一个直接子项。
pub fn sanitize(raw_name: &str) -> String {
    let base = raw_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut sanitized = String::with_capacity(base.len());
    let mut in_run = false;
    for ch in base.chars() {
        if is_allowed(ch) {
            sanitized.push(ch);
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }

    match sanitized.as_str() {
        "" | "." | ".." => fallback_name(),
        _ => sanitized,
    }
}

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')
}

fn fallback_name() -> String {
    format!("upload_{}", Utc::now().timestamp())
}

/// 返回 `root` 下尚未被占用的路径。
///
/// 名称已存在时在第一个 `.` 处拆分主干与扩展名（`a.tar.gz` -> `a` + `tar.gz`），依次尝试
/// `stem_1.ext`、`stem_2.ext`……直到找到空位。后缀搜索没有上限，目录被预先填满全部后缀时
/// 理论上不会终止。检查与创建之间不是原子操作，调用方需以独占方式创建文件。
pub async fn resolve_unique(root: &Path, sanitized_name: &str) -> io::Result<PathBuf> {
    let path = root.join(sanitized_name);
    if !is_taken(&path).await? {
        return Ok(path);
    }

    let (stem, extension) = match sanitized_name.split_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (sanitized_name, None),
    };
    let mut suffix: u64 = 1;
    loop {
        let candidate = match extension {
            Some(extension) => format!("{stem}_{suffix}.{extension}"),
            None => format!("{stem}_{suffix}"),
        };
        let path = root.join(candidate);
        if !is_taken(&path).await? {
            return Ok(path);
        }
        suffix += 1;
    }
}

// 悬空的符号链接同样视为已占用。
async fn is_taken(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
