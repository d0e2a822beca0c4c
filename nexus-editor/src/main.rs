//! Nexus — headless worldbuilding graph editor.
//!
//! Opens the autosaved world and either hosts or joins a collaboration
//! room, or imports/exports/inspects the world file.

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;
use nexus_collab::{RoomCode, SyncConfig};
use nexus_core::JsonFileStore;
use nexus_editor::{LogPresenter, Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(about = "Collaborative worldbuilding graph editor")]
#[command(version)]
struct Cli {
    /// Autosave file
    #[arg(short, long, value_name = "PATH", default_value = "nexus-world.json")]
    world: PathBuf,

    /// Address the collaboration listener binds to
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:0")]
    bind: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a room and wait for guests
    Host,
    /// Join a room by code
    Join {
        code: String,
        /// Address the host printed when it created the room
        #[arg(long, value_name = "ADDR")]
        host_addr: SocketAddr,
    },
    /// Replace the world with an exported file
    Import { file: PathBuf },
    /// Write the world to a file
    Export { file: PathBuf },
    /// Print a summary of the world
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = SessionConfig {
        world_path: cli.world.clone(),
        sync: SyncConfig {
            bind_addr: cli.bind.clone(),
            ..SyncConfig::default()
        },
        ..SessionConfig::default()
    };

    let code = match &cli.command {
        Command::Join { code, host_addr } => {
            let code: RoomCode = code.parse()?;
            config.directory_entries.push((code.endpoint_name(), *host_addr));
            Some(code)
        }
        _ => None,
    };

    let persistence = Box::new(JsonFileStore::new(&config.world_path));
    let mut session = Session::open(config, persistence, Box::new(LogPresenter));

    match cli.command {
        Command::Host => {
            let code = session.host().await?;
            if let Some(addr) = session.engine().local_addr() {
                println!("Room {code} at {addr}");
            }
            run_until_interrupted(&mut session).await;
        }
        Command::Join { .. } => {
            if let Some(code) = code {
                session.join(code).await?;
                run_until_interrupted(&mut session).await;
            }
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            session.import_json(&json)?;
            info!(
                "Imported {} nodes, {} links from {}",
                session.store().node_count(),
                session.store().link_count(),
                file.display()
            );
        }
        Command::Export { file } => {
            std::fs::write(&file, session.export_json()?)?;
            info!("Exported world to {}", file.display());
        }
        Command::Show => {
            let store = session.store();
            println!(
                "{}: {} nodes, {} links",
                store.world_name(),
                store.node_count(),
                store.link_count()
            );
            for node in store.nodes() {
                println!(
                    "  {} {:<24} {} link(s)",
                    node.kind.icon(),
                    node.name,
                    store.degree(&node.id)
                );
            }
        }
    }
    Ok(())
}

async fn run_until_interrupted(session: &mut Session) {
    info!("Press Ctrl-C to leave the room");
    session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Could not listen for Ctrl-C: {e}");
            }
        })
        .await;
}
