mod config;
mod events;
mod server;
mod simulation;
mod state;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};

use config::ServerConfig;
use events::ServerEvent;
use server::GameServer;

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Authoritative tether host")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = tether::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = tether::DEFAULT_TICK_RATE)]
    tick_rate: u16,

    #[arg(short, long, default_value_t = 16)]
    max_clients: usize,

    #[arg(long, default_value_t = 20.0, help = "State broadcasts per second")]
    send_rate: f32,

    #[arg(long, default_value_t = 5.0, help = "Seconds before a destroyed prop returns")]
    respawn_delay: f32,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        send_rate: args.send_rate,
        respawn_delay: args.respawn_delay,
        ..Default::default()
    };

    let mut server = GameServer::new(&bind_addr, config)?;
    info!("Server started on {}", server.local_addr());

    let running = server.running();
    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            match event {
                ServerEvent::ClientConnected { client_id, addr } => {
                    info!("Client {} connected from {}", client_id, addr);
                }
                ServerEvent::PlayerJoined {
                    client_id,
                    name,
                    paddle,
                } => {
                    info!("{} (client {}) controls paddle {}", name, client_id, paddle);
                }
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    warn!("Client {} {}", client_id, reason.as_str());
                }
                ServerEvent::Error { message } => error!("{}", message),
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            running.store(false, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let stats = server.stats();
    info!(
        "Server shutting down at tick {} ({} entities, {} clients, {} respawns pending, {} commands dropped last tick)",
        stats.tick,
        stats.entity_count,
        stats.client_count,
        stats.pending_respawns,
        stats.dropped_commands
    );
    server.shutdown();

    Ok(())
}
