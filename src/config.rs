//! 命令行参数、默认配置与服务器配置校验。

use clap::Parser;
use shadow_rs::formatcp;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::build;
use crate::error::ServerError;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_ROOT_DIR: &str = ".";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
/// 单次上传的默认上限（1 GiB）。
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 2;
pub const UPLOAD_PAGE_PATH: &str = "/upload";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "lanshare", version = VERSION_INFO, about = "LAN file server with PUT uploads")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "LANSHARE_ROOT_DIR",
        default_value = DEFAULT_ROOT_DIR,
        help = "Directory to serve and to store uploads in (must exist)"
    )]
    pub root_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "LANSHARE_BIND",
        default_value = DEFAULT_HOST,
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "LANSHARE_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "LANSHARE_MAX_UPLOAD_BYTES",
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        help = "Max upload size in bytes when Content-Length is declared"
    )]
    pub max_upload_bytes: u64,
    #[arg(
        long,
        env = "LANSHARE_SHUTDOWN_GRACE_SECS",
        default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS,
        help = "Seconds in-flight requests get to finish on shutdown"
    )]
    pub shutdown_grace_secs: u64,
    #[arg(long, env = "LANSHARE_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}

impl Args {
    /// 将命令行参数转换为经过校验的服务器配置。
    pub fn into_server_config(self) -> Result<ServerConfig, ServerError> {
        Ok(ServerConfig::new(
            self.root_dir,
            self.host,
            self.port,
            self.max_upload_bytes,
        )?
        .with_shutdown_grace(Duration::from_secs(self.shutdown_grace_secs))
        .with_cors_origins(self.cors_origins))
    }
}

/// 服务器实例的只读配置，构造后不再变化。
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub root_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
    pub shutdown_grace: Duration,
    pub cors_origins: Option<String>,
}

impl ServerConfig {
    /// 根目录必须已存在，并在此处解析为绝对路径。
    pub fn new(
        root_dir: impl AsRef<Path>,
        host: impl Into<String>,
        port: u16,
        max_upload_bytes: u64,
    ) -> Result<Self, ServerError> {
        let requested = root_dir.as_ref();
        let root_dir =
            std::fs::canonicalize(requested).map_err(|source| ServerError::InvalidRoot {
                path: requested.to_path_buf(),
                source,
            })?;
        if !root_dir.is_dir() {
            return Err(ServerError::NotADirectory(root_dir));
        }

        Ok(Self {
            root_dir,
            host: host.into(),
            port,
            max_upload_bytes,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            cors_origins: None,
        })
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_cors_origins(mut self, origins: Option<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}
