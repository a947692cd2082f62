//! Real-time presence and messaging server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tsunagi-server -- --demo
//! cargo run --bin tsunagi-server -- --host 0.0.0.0 --port 3000 --allowed-origin https://app.example
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tsunagi_server::{
    domain::{GroupId, User, UserId},
    infrastructure::store::InMemoryStore,
    realtime::{Manager, RealtimeConfig, config::DEFAULT_ALLOWED_ORIGIN},
    ui::Server,
};
use tsunagi_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "tsunagi-server")]
#[command(about = "Real-time presence and messaging server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// The only Origin accepted at WebSocket upgrade
    #[arg(long, default_value = DEFAULT_ALLOWED_ORIGIN)]
    allowed_origin: String,

    /// Read deadline in seconds; pings are sent at 9/10 of it
    #[arg(long, default_value = "10")]
    pong_wait_secs: u64,

    /// Maximum inbound frame size in bytes
    #[arg(long, default_value = "4096")]
    max_frame_size: usize,

    /// Outbound queue capacity per connection
    #[arg(long, default_value = "256")]
    egress_capacity: usize,

    /// Presence diff interval in seconds
    #[arg(long, default_value = "5")]
    presence_interval_secs: u64,

    /// Seed demo users (alice / bob / carol) and sessions
    #[arg(long)]
    demo: bool,
}

impl Args {
    fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            allowed_origin: self.allowed_origin.clone(),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            max_frame_size: self.max_frame_size,
            egress_capacity: self.egress_capacity,
            presence_interval: Duration::from_secs(self.presence_interval_secs),
        }
    }
}

async fn seed_demo(store: &InMemoryStore) {
    let users = [(1, "alice", true), (2, "bob", true), (3, "carol", false)];
    for (id, name, is_public) in users {
        store.add_user(User::new(UserId::new(id), name, is_public)).await;
        store
            .open_session(format!("{name}-token"), UserId::new(id))
            .await;
        store.add_group_member(GroupId::new(1), UserId::new(id)).await;
    }
    store.follow(UserId::new(3), UserId::new(1)).await;
    tracing::info!("Seeded demo users: alice-token, bob-token, carol-token (group 1)");
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_PKG_NAME"), env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // 1. Store
    let store = Arc::new(InMemoryStore::new());
    if args.demo {
        seed_demo(&store).await;
    }

    // 2. Realtime core
    let manager = Manager::start(store.clone(), args.realtime_config());

    // 3. HTTP boundary
    let server = Server::new(manager, store);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
