//! idforge-server - HTTP front end for the id allocation service.
//!
//! Serves `GET/POST /id?group=<name>&op=<verb>`. The empty verb allocates
//! the next identifier of the group; `clear` wipes the group from both
//! tiers. Responses are plain text: the identifier in decimal, `true` or
//! `false` for clear, or the literal `Internal error!` with HTTP 500.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use clap::Parser;
use serde::Deserialize;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use idforge_core::error::IdError;
use idforge_core::manager::IdManager;
use idforge_core::provider::{
    MysqlParams, MysqlStorageProvider, RedisCacheProvider, RedisParams,
};
use idforge_core::registry::ProviderRegistry;

use crate::config::Config;

const CACHE_PROVIDER_NAME: &str = "redis-cache";
const STORAGE_PROVIDER_NAME: &str = "mysql-storage";

/// Monotonic identifier allocation service.
#[derive(Parser)]
#[command(name = "idforge-server", about = "Monotonic id allocation service", version)]
struct Args {
    /// HTTP listen port.
    #[arg(long, default_value = "9092", env = "IDFORGE_PORT")]
    port: u16,

    /// Path to the configuration file.
    #[arg(long, default_value = "idforge.config", env = "IDFORGE_CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("idforge_server={}", level).parse().unwrap())
        .add_directive(format!("idforge_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("idforge-server {} starting", env!("CARGO_PKG_VERSION"));

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("config loading error: {}", e);
            process::exit(1);
        }
    };

    let manager = match build_manager(&config) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("provider setup error: {}", e);
            process::exit(1);
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(serve(args.port, manager));
}

/// Builds both tier providers from the configuration, registers them and
/// wires the allocator. Unreachable backends fail construction here, so
/// the process dies before it starts listening.
fn build_manager(config: &Config) -> Result<IdManager, IdError> {
    let cache = RedisCacheProvider::new(RedisParams {
        name: CACHE_PROVIDER_NAME.to_string(),
        ip: config.redis_ip.clone(),
        port: config.redis_port,
        password: if config.redis_password.is_empty() {
            None
        } else {
            Some(config.redis_password.clone())
        },
        pool_size: config.redis_pool_size,
    })?;
    let storage = MysqlStorageProvider::new(MysqlParams {
        name: STORAGE_PROVIDER_NAME.to_string(),
        ip: config.mysql_ip.clone(),
        port: config.mysql_port,
        db_name: config.mysql_db_name.clone(),
        user: config.mysql_user.clone(),
        password: config.mysql_password.clone(),
        pool_size: config.mysql_pool_size,
    })?;

    let registry = Arc::new(ProviderRegistry::new());
    registry.register_cache(Arc::new(cache))?;
    registry.register_storage(Arc::new(storage))?;

    Ok(IdManager::new(
        registry,
        CACHE_PROVIDER_NAME,
        STORAGE_PROVIDER_NAME,
        config.id_start,
        config.id_step,
    ))
}

async fn serve(port: u16, manager: Arc<IdManager>) {
    let app = Router::new()
        .route("/id", get(handle_id).post(handle_id))
        .with_state(manager);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("starting id http server (port={})", port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}

#[derive(Deserialize)]
struct IdQuery {
    group: Option<String>,
    op: Option<String>,
}

async fn handle_id(
    State(manager): State<Arc<IdManager>>,
    Query(query): Query<IdQuery>,
) -> (StatusCode, String) {
    let group = query.group.unwrap_or_default();
    let op = query.op.unwrap_or_default();
    info!("received a request for id (group={}, op={})", group, op);

    let result =
        tokio::task::spawn_blocking(move || run_op(&manager, &group, &op)).await;

    match result {
        Ok(Ok(body)) => (StatusCode::OK, body),
        Ok(Err(e)) => {
            error!("request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error!".to_string())
        }
        Err(e) => {
            error!("request handler panicked: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error!".to_string())
        }
    }
}

/// Runs one allocator operation and renders its plain-text response body.
fn run_op(manager: &IdManager, group: &str, op: &str) -> Result<String, IdError> {
    if op == "clear" {
        manager.clear(group).map(|cleared| cleared.to_string())
    } else {
        manager.get_id(group).map(|id| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idforge_core::provider::{MemoryCacheProvider, MemoryStorageProvider};

    fn memory_manager() -> IdManager {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register_cache(Arc::new(MemoryCacheProvider::new("mem-cache")))
            .unwrap();
        registry
            .register_storage(Arc::new(MemoryStorageProvider::new("mem-storage")))
            .unwrap();
        IdManager::new(registry, "mem-cache", "mem-storage", 1, 100)
    }

    #[test]
    fn allocation_renders_the_id_in_decimal() {
        let manager = memory_manager();
        assert_eq!(run_op(&manager, "g", "").unwrap(), "1");
        assert_eq!(run_op(&manager, "g", "").unwrap(), "2");
    }

    #[test]
    fn clear_renders_a_boolean_literal() {
        let manager = memory_manager();
        run_op(&manager, "g", "").unwrap();
        assert_eq!(run_op(&manager, "g", "clear").unwrap(), "true");
        assert_eq!(run_op(&manager, "g", "").unwrap(), "1");
    }

    #[test]
    fn a_missing_group_parameter_is_an_error() {
        let manager = memory_manager();
        assert!(run_op(&manager, "", "").is_err());
    }
}
