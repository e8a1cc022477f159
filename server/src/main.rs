//! Main entry point for the device authentication server

use actix_web::main as actix_main;
use chrono::Local;
use common::{AuthError, Config, Result, StorageBackend};
use device_auth::clock::{Clock, SystemClock};
use device_auth::security::TokenIssuer;
use device_auth::storage::{
    AuditRepository, ChallengeRepository, DeviceRepository, HealthCheck, MemoryStore, RedisStore,
};
use device_auth::{AuthServer, AuthService};
use env_logger::fmt::Color;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const BANNER: &str = r#"
╔═══════════════════════════════════════════════════════════════════╗
║                                                                   ║
║   Device Authentication Server v0.1.0                             ║
║   Ed25519 challenge-response / short-lived bearer tokens          ║
║                                                                   ║
╚═══════════════════════════════════════════════════════════════════╝
"#;

fn setup_logger() {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            let mut timestamp_style = buf.style();
            let mut level_style = buf.style();
            let mut target_style = buf.style();
            let mut message_style = buf.style();

            let level_color = match record.level() {
                log::Level::Error => Color::Red,
                log::Level::Warn => Color::Yellow,
                log::Level::Info => Color::Green,
                log::Level::Debug => Color::Cyan,
                log::Level::Trace => Color::White,
            };

            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "{} {} [{}] {}",
                timestamp_style.set_color(Color::Rgb(100, 100, 100)).value(timestamp),
                level_style.set_color(level_color).value(record.level()),
                target_style.set_color(Color::Blue).value(record.target()),
                message_style.set_color(Color::White).value(record.args())
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
}

fn build_server<S>(store: Arc<S>, config: &Config) -> Result<AuthServer>
where
    S: DeviceRepository + ChallengeRepository + AuditRepository + HealthCheck + 'static,
{
    let settings = config.settings();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tokens = TokenIssuer::new(&config.token_secret, settings.token_ttl, clock.clone())?;
    info!("✓ Token issuer ready (lifetime {}s)", settings.token_ttl.as_secs());

    let service = AuthService::with_store(store.clone(), tokens, clock, &settings)?;
    info!("✓ Authentication service initialized");

    Ok(AuthServer::new(service, store, settings, config.bind_address.clone()))
}

#[actix_main]
async fn main() -> Result<()> {
    setup_logger();

    println!("{}", BANNER);

    info!("Starting device authentication server...");

    let config = Config::load().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!("Configuration loaded successfully");

    let server = match config.storage_backend {
        StorageBackend::Redis => {
            info!("Establishing Redis connection...");
            let store = Arc::new(RedisStore::connect(&config.redis_url).await.map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?);

            let timeout = Duration::from_millis(config.storage_timeout_ms);
            match tokio::time::timeout(timeout, store.ping()).await {
                Ok(Ok(())) => info!("✓ Redis connection established successfully"),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(AuthError::Storage(format!(
                        "no response from Redis at {}",
                        config.redis_url
                    )))
                }
            }
            build_server(store, &config)?
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; state is lost on restart");
            build_server(Arc::new(MemoryStore::new()), &config)?
        }
    };

    server.start().await
}
