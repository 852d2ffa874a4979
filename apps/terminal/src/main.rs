use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use chrono::Local;
use clap::Parser;
use client_core::{
    ChannelConfig, ChannelEvent, ChannelManager, ChannelState, DisplaySink, StaticSessionProvider,
};
use shared::{
    domain::SessionId,
    protocol::{OutboundMessage, METADATA_IP, METADATA_MAC, PLACEHOLDER_MAC},
};
use tokio::io::AsyncBufReadExt;
use tracing::warn;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Args {
    /// Base url of the chat server, e.g. https://chat.example.org
    #[arg(long)]
    server_url: Option<String>,
    /// Session identifier; falls back to wireline.toml, then SESSION_ID
    #[arg(long)]
    session: Option<String>,
}

struct StdoutSink;

impl DisplaySink for StdoutSink {
    fn append_line(&self, line: &str) {
        // The terminal scrolls to the latest line on its own.
        println!("[{}] {line}", Local::now().format("%H:%M:%S"));
    }
}

fn status_label(event: &ChannelEvent) -> Option<&'static str> {
    match event {
        ChannelEvent::StateChanged(ChannelState::Connecting) => Some("Connecting"),
        ChannelEvent::StateChanged(ChannelState::Connected) => Some("Connected"),
        ChannelEvent::StateChanged(ChannelState::Disconnected) => Some("Disconnected"),
        ChannelEvent::TransportError(_) => Some("Error"),
        ChannelEvent::StateChanged(ChannelState::Idle) | ChannelEvent::LineReceived(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = load_settings();

    let server_url = args
        .server_url
        .unwrap_or_else(|| settings.server_url.clone());
    let session = match args.session.or_else(|| settings.session_id.clone()) {
        Some(raw) if !raw.is_empty() => SessionId::new(raw),
        _ => bail!(
            "no session identifier: pass --session, set session_id in wireline.toml or export SESSION_ID"
        ),
    };

    let mut channel_config = ChannelConfig::new(server_url)
        .with_wire_variant(settings.wire_variant)
        .with_reconnect_delay(Duration::from_secs(settings.reconnect_delay_seconds));
    channel_config.endpoint_path = settings.endpoint_path.clone();

    let manager = ChannelManager::new(
        channel_config,
        Arc::new(StaticSessionProvider::new(session.clone())),
        Arc::new(StdoutSink),
    );

    let mut events = manager.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ChannelEvent::TransportError(reason) = &event {
                warn!(reason = %reason, "channel transport error");
            }
            if let Some(label) = status_label(&event) {
                println!("-- {label}");
            }
        }
    });

    manager.connect().await?;

    let mut input = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let message = OutboundMessage::new(text, session.clone())
            .with_metadata(METADATA_IP, settings.client_ip.clone())
            .with_metadata(METADATA_MAC, PLACEHOLDER_MAC);
        if let Err(err) = manager.send(&message).await {
            warn!(error = %err, "message dropped");
        }
    }

    manager.close().await;
    Ok(())
}
