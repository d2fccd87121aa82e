pub mod net;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::info;

use net::{ClientConfig, GameClient, InputState, ReplicaEvent};

#[derive(Parser)]
#[command(name = "tether-client")]
#[command(about = "Headless tether client that steers its paddle up and down")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27015",
        help = "Server address to connect to"
    )]
    server: String,

    #[arg(short, long, default_value = "bot")]
    name: String,

    #[arg(long, default_value_t = 30.0, help = "Inputs sent per second")]
    send_rate: f32,

    #[arg(long, default_value_t = 1.5, help = "Seconds between direction changes")]
    swing: f32,

    #[arg(long, help = "Disconnect after this many seconds")]
    duration: Option<u64>,
}

const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;
    let config = ClientConfig {
        name: args.name,
        send_rate: args.send_rate,
        ..Default::default()
    };

    let mut client = GameClient::connect(server_addr, config)?;
    let started = Instant::now();
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));
    let mut last_frame = Instant::now();
    let mut last_report = Instant::now();

    loop {
        let now = Instant::now();
        let delta = (now - last_frame).as_secs_f32();
        last_frame = now;

        let phase = (started.elapsed().as_secs_f32() / args.swing.max(0.1)) as u64;
        let input = InputState {
            up: phase % 2 == 0,
            down: phase % 2 == 1,
        };

        for event in client.update(delta, &input) {
            if let ReplicaEvent::Destroyed { id, position } = event {
                info!("{} destroyed at ({:.0}, {:.0})", id, position.x, position.y);
            }
        }

        if client.state().is_finished() {
            break;
        }

        if client.is_connected() && last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let world = client.world();
            info!(
                "{} entities at {:?} Hz, paddle {:?}, {} inputs unconfirmed",
                world.registry().len(),
                client.server_tick_rate(),
                world.local_paddle(),
                world.history().len()
            );
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            client.disconnect();
            break;
        }

        std::thread::sleep(FRAME);
    }

    info!("Client stopped ({:?})", client.state());
    let failure = client.last_error().cloned();
    client.shutdown();
    match failure {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
