//! `Pairlink` peer command line.
//!
//! Talks to a running relay to inspect or join rooms, and can run a file
//! through the transfer engine over an in-process channel.
//!
//! ```bash
//! # Is anyone in "lobby"?
//! cargo run --bin pairlink -- check lobby
//!
//! # Join "lobby" and print relay events as JSON lines
//! cargo run --bin pairlink -- --relay-url ws://127.0.0.1:3000/ws join lobby
//!
//! # Send a file through the chunked transfer path locally
//! cargo run --bin pairlink -- --chunk-size 4096 demo ./notes.txt
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tokio::sync::mpsc;

use pairlink::channel::loopback::LoopbackChannel;
use pairlink::config::{CliArgs, ClientConfig, Command};
use pairlink::signaling::SignalingClient;
use pairlink::transfer::{TransferEngine, TransferEvent};
use pairlink_proto::signal::{self, ServerEvent};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        let _ = CliArgs::command().print_help();
        std::process::exit(2);
    };

    let result = match command {
        Command::Check { room } => check(&config, &room).await,
        Command::Join { room } => join(&config, &room).await,
        Command::Demo { path } => demo(&config, &path).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn check(config: &ClientConfig, room: &str) -> Result<(), BoxError> {
    let client = SignalingClient::connect(&config.relay_url, config.connect_timeout).await?;
    client.check_room(room).await?;

    loop {
        let event = client.recv().await?;
        if matches!(event, ServerEvent::RoomStatus { .. }) {
            println!("{}", signal::encode_server(&event)?);
            break;
        }
    }

    client.close().await?;
    Ok(())
}

async fn join(config: &ClientConfig, room: &str) -> Result<(), BoxError> {
    let client = SignalingClient::connect(&config.relay_url, config.connect_timeout).await?;
    tracing::info!(participant_id = %client.participant_id(), room, "joining room");
    client.create_or_join(room).await?;

    loop {
        let event = match client.recv().await {
            Ok(event) => event,
            Err(e) => {
                tracing::info!(reason = %e, "relay connection ended");
                return Ok(());
            }
        };
        println!("{}", signal::encode_server(&event)?);
        if matches!(event, ServerEvent::RoomClosed { .. } | ServerEvent::Full { .. }) {
            break;
        }
    }

    client.close().await?;
    Ok(())
}

async fn demo(config: &ClientConfig, path: &Path) -> Result<(), BoxError> {
    let (local, remote) = LoopbackChannel::pair();
    let sender = Arc::new(TransferEngine::new(local, config.transfer)?);
    let receiver = Arc::new(TransferEngine::new(remote, config.transfer)?);

    let (tx, mut rx) = mpsc::channel(64);
    let pump = {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move { receiver.run_receiver(tx).await })
    };

    // The sender parks on backpressure, so events are drained concurrently.
    let send = {
        let sender = Arc::clone(&sender);
        let path = path.to_path_buf();
        tokio::spawn(async move {
            let result = sender.send_path(&path).await;
            if result.is_err() {
                sender.close();
            }
            result
        })
    };

    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Progress { percent, .. } => println!("progress {percent}%"),
            TransferEvent::FileReceived(file) => {
                println!("received {} ({} bytes)", file.name, file.data.len());
                break;
            }
            other => println!("{other:?}"),
        }
    }

    let summary = send.await??;
    println!(
        "sent {} ({} bytes in {} chunks)",
        summary.name, summary.bytes, summary.chunks
    );

    sender.close();
    pump.await??;
    Ok(())
}
