#![deny(clippy::all)]
#![warn(unused_crate_dependencies)]

mod common;
mod config;
mod net;
mod protocol;
mod rpc;

use std::sync::Arc;

use log::*;
use tokio::sync::watch;

use crate::common::error::HandlerError;
use crate::config::Config;
use crate::net::XmlRpcServer;
use crate::protocol::xmlrpc::{Fault, Value};
use crate::rpc::{MethodRegistry, RegistryBuilder, RegistryError};

fn setup_logger() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", concat!(env!("CARGO_PKG_NAME"), "=debug"));
    }
    env_logger::init();
}

fn print_help() {
    println!("veles v{}", env!("CARGO_PKG_VERSION"));
    println!("An asynchronous XML-RPC server with a bounded worker pool\n");
    println!("USAGE:");
    println!("    veles [OPTIONS] [CONFIG_FILE]\n");
    println!("OPTIONS:");
    println!("    -h, --help       Show this help message\n");
    println!("ARGUMENTS:");
    println!("    [CONFIG_FILE]    Path to configuration file (default: config.toml)\n");
    println!("CONFIGURATION:");
    println!("The configuration file uses a simple key=value format with sections.\n");
    println!("[server] - Listener settings");
    println!("  bind_addr = \"127.0.0.1:8000\"     # Listen address");
    println!("  log_requests = true              # Log one line per exchange");
    println!("  rpc_paths = \"/\", \"/RPC2\"         # Paths accepted for POST\n");
    println!("[rpc] - Marshaling settings");
    println!("  allow_none = false               # Permit nil values in results");
    println!("  encoding = \"utf-8\"               # Wire charset (utf-8, iso-8859-1, us-ascii)");
    println!("  compress_threshold = 1400        # Gzip responses above this size (0 = never)\n");
    println!("[pool] - Worker pool for sync handlers");
    println!("  max_workers = 0                  # 0 = run sync handlers inline\n");
    println!("[limits] - Framing and resource limits");
    println!("  max_header_line_bytes = 65536    # Max bytes in one header line");
    println!("  max_header_count = 100           # Max header lines per request");
    println!("  max_body_bytes = 67108864        # Max declared request body (64MB)");
    println!("  read_chunk_bytes = 10485760      # Single-read ceiling while draining (10MB)\n");
    println!("[debug] - Diagnostics");
    println!("  send_traceback = false           # Attach X-exception/X-traceback to 500s\n");
    println!("The binary serves a small demo method set (ping, echo, add, calc.mul);");
    println!("real deployments embed veles as a library and register their own methods.\n");
    println!("EXAMPLES:");
    println!("    veles                            # Use default config.toml");
    println!("    veles myconfig.toml              # Use custom config file");
    println!("    veles --help                     # Show this help");
}

/// Demo method set exercising both execution tags and dotted names.
fn build_registry() -> Result<MethodRegistry, RegistryError> {
    let mut b = RegistryBuilder::new().allow_dotted_names();

    b.register_async("ping", |_params| async { Ok(Value::Str("pong".into())) })?;

    b.register_async("echo", |params| async move { Ok(Value::Array(params)) })?;

    b.register_sync("add", |params| {
        let (a, b) = two_ints(&params)?;
        Ok(Value::Int(a + b))
    })?;

    b.register_sync("calc.mul", |params| {
        let (a, b) = two_ints(&params)?;
        Ok(Value::Int(a * b))
    })?;

    Ok(b.build())
}

fn two_ints(params: &[Value]) -> Result<(i32, i32), HandlerError> {
    match params {
        [a, b] => match (a.as_i32(), b.as_i32()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(Fault::new(2, "expected two integers").into()),
        },
        _ => Err(Fault::new(2, "expected two arguments").into()),
    }
}

fn main() {
    let mut args = std::env::args().skip(1);

    let config_path = match args.next() {
        Some(arg) if arg == "-h" || arg == "--help" => {
            print_help();
            return;
        }
        Some(arg) => arg,
        None => "config.toml".to_string(),
    };

    setup_logger();
    let cfg = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("failed to read config {}: {}", config_path, e);
        std::process::exit(1);
    });
    let cfg = Arc::new(cfg);
    info!("config loaded from {}", config_path);

    run_server(cfg);
}

fn run_server(cfg: Arc<Config>) {
    let registry = build_registry().unwrap_or_else(|e| {
        eprintln!("failed to build method registry: {}", e);
        std::process::exit(1);
    });

    // Single-threaded cooperative scheduler; blocking handlers go
    // through the worker pool, not through extra scheduler threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    let result = runtime.block_on(async move {
        let bound = XmlRpcServer::new(cfg, registry).bind().await?;
        info!("veles server started; press Ctrl-C to stop.");

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down...");
                let _ = tx.send(true);
            }
        });

        bound.serve(rx).await
    });

    if let Err(e) = result {
        eprintln!("server error: {}", e);
        std::process::exit(1);
    }

    info!("Goodbye.");
}
