use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use soulcore::dispatch::Dispatcher;
use soulcore::queue::message_queue;
use soulcore::rooms::World;
use soulcore::session::SessionStorage;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};

mod gateway;

pub(crate) const DEFAULT_WORLD: &str = include_str!("../world/default.json");

fn usage_and_exit() -> ! {
    eprintln!(
        "soulmudd (text-adventure chat server)\n\n\
USAGE:\n  soulmudd [--bind HOST:PORT] [--world PATH]\n\n\
ENV:\n  SOULMUD_BIND        default 127.0.0.1:4200\n  SOULMUD_WORLD_PATH  optional; default: built-in demo world\n"
    );
    std::process::exit(2);
}

#[derive(Debug, Clone)]
struct Config {
    bind: SocketAddr,
    world_path: Option<PathBuf>,
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("SOULMUD_BIND")
        .unwrap_or_else(|_| "127.0.0.1:4200".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());
    let mut world_path = std::env::var("SOULMUD_WORLD_PATH").ok().map(PathBuf::from);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--world" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                world_path = Some(v.into());
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config { bind, world_path }
}

fn load_world(cfg: &Config) -> anyhow::Result<World> {
    match &cfg.world_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read world file {}", path.display()))?;
            World::from_json(&text)
        }
        None => World::from_json(DEFAULT_WORLD),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,soulmudd=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    let world = Arc::new(load_world(&cfg)?);
    let sessions = Arc::new(SessionStorage::new(world.start_room().clone()));
    let (queue, inbox) = message_queue();

    // Explicit wiring: queue and storage are created once here and handed
    // by reference to the dispatcher and the gateway.
    let gateway = Arc::new(gateway::Gateway::new(sessions.clone(), queue));
    let sender = Arc::new(gateway.line_sender());
    let mut dispatcher = Dispatcher::new(sessions, world.clone(), sender).spawn(inbox);

    let listener = TcpListener::bind(cfg.bind).await?;
    info!(bind = %cfg.bind, start_room = %world.start_room(), "soulmudd listening");

    let accept = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let gateway = gateway.clone();
                        tokio::spawn(async move {
                            if let Err(e) = gateway.handle_conn(stream, peer).await {
                                warn!(peer = %peer, err = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(err = %e, "accept failed");
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    accept.abort();
    dispatcher.stop().await;
    Ok(())
}
