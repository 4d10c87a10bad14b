//! Console host server entry point.
//!
//! Wires the infrastructure adapters into the session bootstrap, accepts one
//! device-channel connection, and services it until the peer goes away.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_settings()            -- server.toml, defaults if absent
//!  └─ ConfigResolver             -- TomlConfigStore + TomlShortcutResolver
//!  └─ SessionBootstrap           -- SessionLock, ProcessSetup, window host
//!  └─ accept one channel
//!       └─ IoServiceLoop         -- blocking thread, read/dispatch/reply
//!            └─ disconnect ⇒ process exits
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use conhost_server::application::bootstrap::SessionBootstrap;
use conhost_server::application::dispatch::ConsoleApiRouter;
use conhost_server::application::resolve_config::ConfigResolver;
use conhost_server::application::service_loop::{IoServiceLoop, LoopExit};
use conhost_server::application::session::SessionLock;
use conhost_server::infrastructure::channel::stream::StreamChannel;
use conhost_server::infrastructure::display::{platform_display_scaling, ProcessSetup};
use conhost_server::infrastructure::render::NullRenderer;
use conhost_server::infrastructure::storage::config::{self, ServerSettings};
use conhost_server::infrastructure::storage::console_store::TomlConfigStore;
use conhost_server::infrastructure::storage::shortcut::TomlShortcutResolver;
use conhost_server::infrastructure::window::HeadlessWindowHost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Settings come first so their log level can seed the filter.
    let (settings, settings_error) = match config::load_settings() {
        Ok(settings) => (settings, None),
        Err(e) => (ServerSettings::default(), Some(e)),
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&settings.server.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(e) = settings_error {
        warn!("using default settings: {e}");
    }
    info!("console host starting");

    let server = &settings.server;
    let settings_dir = config::settings_dir().unwrap_or_else(|_| PathBuf::from("."));
    let store_path = server.console_store_path(&settings_dir);
    info!("configuration store: {}", store_path.display());

    // ── Session establishment ─────────────────────────────────────────────────
    let resolver = ConfigResolver::new(
        Box::new(TomlConfigStore::new(store_path)),
        Box::new(TomlShortcutResolver::new()),
        server.oem_code_page,
        server.system_root(),
    );
    let lock = Arc::new(SessionLock::new());
    let bootstrap = Arc::new(SessionBootstrap::new(
        Arc::clone(&lock),
        resolver,
        Arc::new(ProcessSetup::new(platform_display_scaling())),
        Arc::new(HeadlessWindowHost::new()),
        Arc::new(NullRenderer::new()),
        server.input_init_timeout(),
    ));

    // ── Device channel ────────────────────────────────────────────────────────
    let listener = TcpListener::bind(&server.bind_address)
        .await
        .with_context(|| format!("failed to bind device channel on {}", server.bind_address))?;
    info!("waiting for a client on {}", server.bind_address);

    let (stream, peer) = tokio::select! {
        accepted = listener.accept() => accepted.context("failed to accept device channel")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received before a client connected");
            return Ok(());
        }
    };
    info!("device channel connected from {peer}");

    // The service loop blocks on reads; hand it a blocking std stream.
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;

    let service = IoServiceLoop::new(
        StreamChannel::new(stream),
        ConsoleApiRouter::new(bootstrap),
        lock,
    );
    let service = tokio::task::spawn_blocking(move || service.run());

    let code = tokio::select! {
        exit = service => match exit {
            Ok(LoopExit::Disconnected) => {
                info!("client disconnected, console host exiting");
                0
            }
            Err(e) => {
                error!("service loop panicked: {e}");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            0
        }
    };
    std::process::exit(code)
}
