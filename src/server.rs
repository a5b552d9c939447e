//! Server lifecycle: non-blocking start/stop and a blocking run-forever mode.

use axum_server::Handle;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::router::build_router;

/// Extra time `stop` waits for the serving task beyond the grace period.
const STOP_JOIN_SLACK: Duration = Duration::from_millis(500);

/// A file server instance. Each accepted connection is handled by its own task.
pub struct FileServer {
    config: Arc<ServerConfig>,
    state: Mutex<Lifecycle>,
}

enum Lifecycle {
    Stopped,
    Running(RunningServer),
}

struct RunningServer {
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

impl FileServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Mutex::new(Lifecycle::Stopped),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener and starts serving in the background.
    ///
    /// Returns the bound address. Calling it while already running is a no-op that
    /// returns the existing address. Bind failures are returned to the caller.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        if let Lifecycle::Running(running) = &*state
            && !running.task.is_finished()
        {
            debug!(addr = %running.local_addr, "server already running");
            return Ok(running.local_addr);
        }

        let listener = bind_listener(&self.config)?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: display_addr(&self.config),
            source,
        })?;

        let handle = Handle::new();
        let app = build_router(self.config.clone());
        let server = axum_server::from_tcp(listener).handle(handle.clone());
        let task = tokio::spawn(async move {
            server
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
        });

        info!(
            "Serving {} at http://{}",
            self.config.root_dir.display(),
            local_addr
        );
        *state = Lifecycle::Running(RunningServer {
            handle,
            task,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stops accepting connections and waits up to the grace period for in-flight
    /// requests. Safe to call repeatedly or before `start`.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Lifecycle::Running(running) = std::mem::replace(&mut *state, Lifecycle::Stopped)
        else {
            debug!("server not running");
            return;
        };

        let grace = self.config.shutdown_grace;
        running.handle.graceful_shutdown(Some(grace));
        let mut task = running.task;
        match time::timeout(grace + STOP_JOIN_SLACK, &mut task).await {
            Ok(Ok(Ok(()))) => info!(addr = %running.local_addr, "server stopped"),
            Ok(Ok(Err(err))) => warn!(error = %err, "server exited with error"),
            Ok(Err(err)) => warn!(error = %err, "server task failed"),
            Err(_) => {
                warn!("server did not stop within grace period, aborting");
                task.abort();
            }
        }
    }

    /// Starts the server and blocks until Ctrl+C or SIGTERM, then stops it.
    pub async fn run_forever(&self) -> Result<(), ServerError> {
        let addr = self.start().await?;
        info!("Listening on http://{addr} (Ctrl+C to quit)");
        shutdown_signal().await;
        self.stop().await;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, Lifecycle::Running(running) if !running.task.is_finished())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            Lifecycle::Running(running) => Some(running.local_addr),
            Lifecycle::Stopped => None,
        }
    }
}

fn bind_listener(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let bind_error = |source| ServerError::Bind {
        addr: display_addr(config),
        source,
    };
    let listener = TcpListener::bind((config.host.as_str(), config.port)).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    Ok(listener)
}

fn display_addr(config: &ServerConfig) -> String {
    format!("{}:{}", config.host, config.port)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn make_server(port: u16) -> (TempDir, FileServer) {
        let temp = tempdir().expect("tempdir");
        let config = ServerConfig::new(temp.path(), "127.0.0.1", port, 1024 * 1024)
            .expect("config")
            .with_shutdown_grace(Duration::from_millis(200));
        (temp, FileServer::new(config))
    }

    #[tokio::test]
    async fn concurrent_uploads_are_independently_retrievable() {
        let (_temp, server) = make_server(0);
        let addr = server.start().await.expect("start");
        let base = format!("http://{addr}");
        let client = reqwest::Client::new();
        let alpha = b"first payload".to_vec();
        let beta = vec![7u8; 200_000];

        let (first, second) = tokio::join!(
            client
                .put(format!("{base}/alpha.txt"))
                .body(alpha.clone())
                .send(),
            client
                .put(format!("{base}/beta.bin"))
                .body(beta.clone())
                .send(),
        );
        let first = first.expect("put alpha");
        let second = second.expect("put beta");
        assert_eq!(first.status(), reqwest::StatusCode::CREATED);
        assert_eq!(second.status(), reqwest::StatusCode::CREATED);
        assert_eq!(first.text().await.expect("text"), "Saved to alpha.txt\n");
        assert_eq!(second.text().await.expect("text"), "Saved to beta.bin\n");

        let fetched = client
            .get(format!("{base}/beta.bin"))
            .send()
            .await
            .expect("get beta")
            .bytes()
            .await
            .expect("bytes");
        assert_eq!(fetched.as_ref(), beta.as_slice());
        let fetched = client
            .get(format!("{base}/alpha.txt"))
            .send()
            .await
            .expect("get alpha")
            .bytes()
            .await
            .expect("bytes");
        assert_eq!(fetched.as_ref(), alpha.as_slice());

        server.stop().await;
    }

    #[tokio::test]
    async fn concurrent_uploads_of_same_name_do_not_overwrite() {
        let (_temp, server) = make_server(0);
        let addr = server.start().await.expect("start");
        let url = format!("http://{addr}/same.txt");
        let client = reqwest::Client::new();

        let (first, second) = tokio::join!(
            client.put(&url).body("one").send(),
            client.put(&url).body("two").send(),
        );
        let mut names = vec![
            first.expect("put").text().await.expect("text"),
            second.expect("put").text().await.expect("text"),
        ];
        names.sort();
        assert_eq!(names, ["Saved to same.txt\n", "Saved to same_1.txt\n"]);

        let root = &server.config().root_dir;
        let mut contents = vec![
            std::fs::read_to_string(root.join("same.txt")).expect("read"),
            std::fs::read_to_string(root.join("same_1.txt")).expect("read"),
        ];
        contents.sort();
        assert_eq!(contents, ["one", "two"]);

        server.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (_temp, server) = make_server(0);
        let first = server.start().await.expect("start");
        let second = server.start().await.expect("start again");
        assert_eq!(first, second);
        assert!(server.is_running().await);
        assert_eq!(server.local_addr().await, Some(first));
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_twice_then_restart() {
        let (_temp, server) = make_server(0);
        server.stop().await;

        server.start().await.expect("start");
        server.stop().await;
        server.stop().await;
        assert!(!server.is_running().await);
        assert_eq!(server.local_addr().await, None);

        let addr = server.start().await.expect("restart");
        let response = reqwest::get(format!("http://{addr}/upload"))
            .await
            .expect("get upload page");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_the_port() {
        let (_temp, server) = make_server(0);
        let addr = server.start().await.expect("start");
        server.stop().await;

        let rebound = TcpListener::bind(addr).expect("port released");
        drop(rebound);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let occupied = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = occupied.local_addr().expect("addr").port();
        let (_temp, server) = make_server(port);

        let result = server.start().await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert!(!server.is_running().await);
    }
}
