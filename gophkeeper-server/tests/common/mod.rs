#![allow(dead_code)]

use std::net::SocketAddr;

use gophkeeper_core::crypto::PasswordHashParams;
use gophkeeper_server::{AppState, Server, ServerConfig, SqliteStorage};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: watch::Sender<bool>,
    pub handle: JoinHandle<anyhow::Result<()>>,
    pub dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            database_dsn: dir.path().join("server.db").to_string_lossy().into_owned(),
            shutdown_timeout_secs: 5,
            ..ServerConfig::default()
        };
        configure(&mut config);

        let storage = SqliteStorage::open(&config.database_dsn).unwrap();
        let mut state = AppState::new(storage, &config);
        state.auth = state
            .auth
            .clone()
            .with_hash_params(PasswordHashParams::insecure_fast());

        let server = Server::bind_with_state(state, config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));

        Self {
            addr,
            shutdown,
            handle,
            dir,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap()
    }
}
