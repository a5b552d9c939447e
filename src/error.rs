//! 统一的 API 错误类型与服务器生命周期错误。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::upload::UploadError;

/// 单个请求内的错误，只会转换为 HTTP 响应，不会影响监听器。
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(u64),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::PayloadTooLarge(limit) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Upload too large (> {limit} bytes)"),
            )
                .into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::PayloadTooLarge { limit, .. } => ApiError::PayloadTooLarge(limit),
            UploadError::DestinationExists(path) => {
                ApiError::Internal(format!("destination already exists: {}", path.display()))
            }
            UploadError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<io::Error> for ApiError {
    fn from(error: io::Error) -> Self {
        ApiError::Internal(error.to_string())
    }
}

/// 服务器实例级别的错误，直接返回给 `start` / `run_forever` 的调用者。
#[derive(Debug)]
pub enum ServerError {
    InvalidRoot { path: PathBuf, source: io::Error },
    NotADirectory(PathBuf),
    Bind { addr: String, source: io::Error },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::InvalidRoot { path, source } => {
                write!(f, "invalid root directory {}: {source}", path.display())
            }
            ServerError::NotADirectory(path) => {
                write!(f, "root is not a directory: {}", path.display())
            }
            ServerError::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::InvalidRoot { source, .. } | ServerError::Bind { source, .. } => {
                Some(source)
            }
            ServerError::NotADirectory(_) => None,
        }
    }
}
