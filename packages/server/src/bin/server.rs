//! Hearth chat server binary.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hearth-server
//! cargo run --bin hearth-server -- --host 0.0.0.0 --port 5000 --workers 10
//! ```

use clap::Parser;

use hearth_server::{Reactor, ServerConfig};
use hearth_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hearth-server")]
#[command(about = "Multi-user chat server with a reactor core and worker thread pool", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = hearth_server::config::DEFAULT_PORT)]
    port: u16,

    /// Number of worker threads
    #[arg(short = 'w', long, default_value_t = hearth_server::config::DEFAULT_WORKERS)]
    workers: usize,

    /// Listen backlog
    #[arg(long, default_value_t = hearth_server::config::DEFAULT_BACKLOG)]
    backlog: i32,
}

fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        backlog: args.backlog,
        workers: args.workers,
    };

    let reactor = match Reactor::bind(config) {
        Ok(reactor) => reactor,
        Err(e) => {
            tracing::error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = reactor.run() {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
