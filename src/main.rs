//! CLI for PopQueue
//!
//! Subcommands:
//! - `broker`: run the development broker
//! - `produce`: publish a cycle-start event every interval
//! - `consume`: print messages from a topic until Ctrl-C

use std::sync::{Arc, Mutex};

use clap::Parser;
use popqueue::broker::Broker;
use popqueue::config::{Settings, load_config};
use popqueue::transport::websocket::start_websocket_server;
use popqueue::utils::logging;
use popqueue::{Context, Message, PubSubQueue, Queue};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "popqueue")]
enum Command {
    /// Start the development broker
    Broker,
    /// Run the periodic producer loop
    Produce {
        /// Topic to publish to (defaults to the configured producer topic)
        #[arg(long)]
        topic: Option<String>,
    },
    /// Subscribe to a topic and print every message
    Consume {
        #[arg(long)]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info", false);
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&config.log.level, config.log.json);

    let result = match cmd {
        Command::Broker => run_broker(&config).await,
        Command::Produce { topic } => run_producer(&config, topic).await,
        Command::Consume { topic } => run_consumer(&config, &topic).await,
    };
    if let Err(e) = result {
        error!("Command failed: {}", e);
    }
}

async fn run_broker(config: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let broker = Arc::new(Mutex::new(Broker::new()));

    tokio::select! {
        result = start_websocket_server(&addr, broker) => {
            result?;
            error!("Broker exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_producer(
    config: &Settings,
    topic: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let topic = topic.unwrap_or_else(|| config.producer.topic.clone());
    let ctx = Context::background();
    let queue = PubSubQueue::from_settings(&ctx, config).await?;
    info!(
        broker = %config.broker.url(),
        topic = %topic,
        interval = ?config.producer.interval(),
        "Starting producer"
    );

    let mut ticker = tokio::time::interval(config.producer.interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }

        info!("Producer cycle starting");
        let message = Message::new("Scraper cycle started")
            .with_metadata("source", "scraper")
            .with_metadata("type", "cycle_start");
        if let Err(e) = queue.send(&ctx, &topic, message).await {
            error!(error = %e, "Failed to send message to queue");
        }
        info!("Producer cycle completed");
    }

    queue.close().await?;
    Ok(())
}

async fn run_consumer(config: &Settings, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, cancel) = Context::with_cancel();
    let queue = PubSubQueue::from_settings(&ctx, config).await?;
    let mut stream = queue.subscribe(&ctx, topic).await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Cancelling subscription.");
        }
        cancel.cancel();
    });

    while let Some(message) = stream.recv().await {
        println!(
            "[{}] {} {:?} {}",
            message
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            message.id,
            message.metadata,
            String::from_utf8_lossy(&message.body)
        );
        queue.ack(&ctx, topic, &message.id).await?;
    }

    queue.close().await?;
    Ok(())
}
