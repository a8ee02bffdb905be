//! Entry point for `sliding-window`.
//!
//! Builds a [`LinkConfig`] from CLI flags, starts the link, and feeds it
//! commands from a script file or stdin while printing deliveries as they
//! complete.  All protocol work lives in the library.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use sliding_window::command::parse_line;
use sliding_window::config::{DEFAULT_RECEIVER_WINDOW, DEFAULT_SENDER_WINDOW};
use sliding_window::{Delivery, Input, Link, LinkConfig};

/// Sliding-window message delivery over a simulated lossy link.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Number of senders.
    #[arg(short = 's', long, default_value_t = 1)]
    senders: u16,
    /// Number of receivers.
    #[arg(short = 'r', long, default_value_t = 1)]
    receivers: u16,
    /// Probability that a frame copy is dropped.
    #[arg(short = 'd', long = "drop", default_value_t = 0.0)]
    drop_prob: f64,
    /// Probability that a surviving frame copy is corrupted.
    #[arg(short = 'c', long = "corrupt", default_value_t = 0.0)]
    corrupt_prob: f64,
    /// Bits flipped in a corrupted copy.
    #[arg(short = 'b', long = "bits", default_value_t = 1)]
    corruption_bits: u32,
    /// Sender window size.
    #[arg(short = 'w', long = "sws", default_value_t = DEFAULT_SENDER_WINDOW)]
    sws: u8,
    /// Receiver window size.
    #[arg(long, default_value_t = DEFAULT_RECEIVER_WINDOW)]
    rws: u8,
    /// Read commands from FILE instead of stdin.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,
    /// Seed for the link simulator.
    #[arg(long)]
    seed: Option<u64>,
    /// How long the link must stay quiet after input ends before exiting.
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,
}

impl Cli {
    fn link_config(&self) -> LinkConfig {
        LinkConfig {
            senders: self.senders,
            receivers: self.receivers,
            drop_prob: self.drop_prob,
            corrupt_prob: self.corrupt_prob,
            corruption_bits: self.corruption_bits,
            sender_window: self.sws,
            receiver_window: self.rws,
            seed: self.seed,
            ..LinkConfig::default()
        }
    }
}

fn print_delivery(delivery: &Delivery) {
    println!("{delivery}");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let mut link = Link::spawn(cli.link_config()).context("invalid link configuration")?;

    let source: Box<dyn AsyncRead + Unpin + Send> = match &cli.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(source).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading commands")? else { break };
                match parse_line(&line) {
                    Ok(Some(Input::Send(cmd))) => {
                        if let Err(e) = link.submit(cmd) {
                            eprintln!("error: {e}");
                        }
                    }
                    Ok(Some(Input::Exit)) => break,
                    Ok(None) => {}
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Some(delivery) = link.recv() => print_delivery(&delivery),
        }
    }

    log::info!("[link] input closed, draining");
    let linger = Duration::from_millis(cli.linger_ms);
    while let Ok(Some(delivery)) = tokio::time::timeout(linger, link.recv()).await {
        print_delivery(&delivery);
    }
    Ok(())
}
