//! 嵌入式上传页面。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

use crate::error::ApiError;

const UPLOAD_PAGE_ASSET: &str = "upload.html";

#[derive(RustEmbed)]
#[folder = "assets"]
/// 编译进二进制的页面资源。
pub struct PageAssets;

/// 返回上传页面：浏览器选中的每个文件以 PUT 发送到 `/` + 文件名。
pub async fn upload_page() -> Result<Response, ApiError> {
    load_embedded_asset(UPLOAD_PAGE_ASSET)?
        .ok_or_else(|| ApiError::Internal("upload page missing".into()))
}

/// 加载指定路径的嵌入式资源。
fn load_embedded_asset(path: &str) -> Result<Option<Response>, ApiError> {
    let Some(asset) = PageAssets::get(path) else {
        return Ok(None);
    };
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .map_err(|_| ApiError::Internal("invalid MIME type".into()))?,
    );
    Ok(Some(
        (
            StatusCode::OK,
            headers,
            AxumBody::from(asset.data.into_owned()),
        )
            .into_response(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_page_is_html_with_file_picker() {
        let response = upload_page().await.expect("upload page");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(content_type, "text/html; charset=utf-8");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("type=file"));
        assert!(text.contains("method: 'PUT'"));
    }

    #[test]
    fn unknown_asset_is_none() {
        assert!(matches!(load_embedded_asset("missing.html"), Ok(None)));
    }
}
