//! PUT 上传处理器与请求体落盘。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::naming::{resolve_unique, sanitize};

/// 每次从请求体读取的最大字节数。
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub enum UploadError {
    PayloadTooLarge { declared: u64, limit: u64 },
    /// 目标在解析与创建之间被占用，请求体尚未被读取。
    DestinationExists(PathBuf),
    Io(io::Error),
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        UploadError::Io(err)
    }
}

/// 将请求体写入 `destination`，返回实际写入的字节数。
///
/// 声明长度超过 `max_bytes` 时立即失败，不创建文件也不读取请求体。未声明长度时一直复制到
/// 流结束，不做上限检查。声明长度时最多读取该长度；对端提前断开只会留下截断的文件，不视为
/// 错误。目标以独占方式创建，已存在时返回 [`UploadError::DestinationExists`]。
pub async fn write_body<R>(
    reader: &mut R,
    declared_length: Option<u64>,
    destination: &Path,
    max_bytes: u64,
) -> Result<u64, UploadError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if let Some(declared) = declared_length
        && declared > max_bytes
    {
        return Err(UploadError::PayloadTooLarge {
            declared,
            limit: max_bytes,
        });
    }

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(UploadError::DestinationExists(destination.to_path_buf()));
        }
        Err(err) => return Err(UploadError::Io(err)),
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = declared_length;
    let mut written: u64 = 0;
    loop {
        let want = match remaining {
            Some(0) => break,
            Some(left) => left.min(CHUNK_SIZE as u64) as usize,
            None => CHUNK_SIZE,
        };
        let read = match reader.read(&mut buf[..want]).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                warn!(
                    path = ?destination,
                    written,
                    error = %err,
                    "upload body ended early"
                );
                break;
            }
        };
        file.write_all(&buf[..read]).await?;
        written += read as u64;
        if let Some(left) = remaining.as_mut() {
            *left -= read as u64;
        }
    }
    file.flush().await?;

    if let Some(declared) = declared_length
        && written < declared
    {
        warn!(path = ?destination, declared, written, "upload truncated");
    }
    Ok(written)
}

/// 接收 PUT 上传：路径最后一段作为文件名，清洗并避开已有文件后写入根目录。
pub async fn put_upload(
    Extension(config): Extension<Arc<ServerConfig>>,
    uri: Uri,
    headers: HeaderMap,
    body: AxumBody,
) -> Result<Response, ApiError> {
    let declared_length = parse_content_length(headers.get(header::CONTENT_LENGTH))?;
    if let Some(declared) = declared_length
        && declared > config.max_upload_bytes
    {
        warn!(
            path = uri.path(),
            declared,
            limit = config.max_upload_bytes,
            "upload rejected: too large"
        );
        return Err(ApiError::PayloadTooLarge(config.max_upload_bytes));
    }

    let raw_name = final_segment(uri.path());
    let name = sanitize(raw_name);
    if name.is_empty() {
        return Err(ApiError::BadRequest("Invalid filename".into()));
    }

    let mut reader = StreamReader::new(
        BodyExt::into_data_stream(body).map_err(io::Error::other),
    );
    let (destination, written) = loop {
        let destination = resolve_unique(&config.root_dir, &name).await?;
        match write_body(
            &mut reader,
            declared_length,
            &destination,
            config.max_upload_bytes,
        )
        .await
        {
            Ok(written) => break (destination, written),
            Err(UploadError::DestinationExists(path)) => {
                debug!(path = ?path, "upload target taken concurrently, resolving again");
            }
            Err(err) => return Err(err.into()),
        }
    };

    let saved_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or(name);
    info!(
        requested = raw_name,
        name = saved_name,
        bytes = written,
        "upload saved"
    );
    Ok((
        StatusCode::CREATED,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        format!("Saved to {saved_name}\n"),
    )
        .into_response())
}

fn parse_content_length(value: Option<&HeaderValue>) -> Result<Option<u64>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("invalid Content-Length header".into()))
}

fn final_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}
