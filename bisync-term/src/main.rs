//! Debug terminal for a bisync link.
//!
//! Bridges stdin to the link: every line is split on whitespace and each
//! word is queued as one payload, the long-standing debug-terminal
//! convention. Received payloads and protocol errors are printed as they
//! arrive.
//!
//! Usage:
//!   bisync-term <device> [baud]
//!   bisync-term --config <link.json>

use anyhow::{bail, Context, Result};
use bisync::{Bisync, LinkOptions, SerialConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

fn parse_args() -> Result<SerialConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag, path] if flag == "--config" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config file {path}"))
        }
        [device] => Ok(SerialConfig {
            path: device.clone(),
            ..SerialConfig::default()
        }),
        [device, baud] => Ok(SerialConfig {
            path: device.clone(),
            baud_rate: baud
                .parse()
                .with_context(|| format!("invalid baud rate {baud}"))?,
            ..SerialConfig::default()
        }),
        _ => bail!("usage: bisync-term <device> [baud] | bisync-term --config <link.json>"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging; RUST_LOG=trace shows every byte on the line.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = parse_args()?;
    info!(path = %config.path, baud = config.baud_rate, "opening link");

    let mut link =
        Bisync::open(&config, LinkOptions::default()).context("opening serial port")?;

    link.on_read(|payload| {
        println!("<< {}", String::from_utf8_lossy(&payload));
    })
    .await?;
    link.on_error(|e| {
        error!(code = e.code(), "{e}");
    })
    .await?;

    info!("link ready, type messages, Ctrl+C to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    // One payload per word.
                    let words: Vec<&str> = line.split_whitespace().collect();
                    if words.is_empty() {
                        continue;
                    }
                    link.write_many(words).await?;
                }
                None => {
                    info!("stdin closed, shutting down");
                    break;
                }
            },
        }
    }

    link.close();
    Ok(())
}
