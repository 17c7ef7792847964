//! ARQ Sender - reliable file sender
//!
//! Fragments each input file into fixed-size frames and streams them to one
//! receiver over a selective-repeat ARQ session.

use anyhow::Context;
use arq::protocol::fragment::NAME_SIZE;
use arq::{ArqSender, FragmentCodec};
use arq_cli::stats::{display_compact_sender, display_sender_stats};
use arq_cli::{init_tracing, Config, SenderConfig};
use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "arq-send")]
#[command(about = "Reliable file sender over UDP", long_about = None)]
struct Args {
    /// Receiver address (host:port)
    #[arg(short, long)]
    peer: Option<SocketAddr>,

    /// Local bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Configuration file (TOML, [sender] section)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Window size in segments
    #[arg(short, long)]
    window: Option<u64>,

    /// Seconds to wait for outstanding acknowledgments
    #[arg(long)]
    drain_timeout: Option<u64>,

    /// Statistics interval in seconds
    #[arg(long)]
    stats: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Files to send
    inputs: Vec<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<SenderConfig> {
    let mut config = match (&args.config, args.peer) {
        (Some(path), _) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .sender
            .context("configuration file has no [sender] section")?,
        (None, Some(peer)) => SenderConfig::new(peer),
        (None, None) => anyhow::bail!("A peer address is required (--peer or --config)"),
    };

    if let Some(peer) = args.peer {
        config.peer = peer;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if let Some(secs) = args.drain_timeout {
        config.drain_timeout_secs = secs;
    }
    if let Some(secs) = args.stats {
        config.stats_interval_secs = secs;
    }
    if !args.inputs.is_empty() {
        config.inputs = args.inputs.clone();
    }
    Ok(config)
}

fn resource_name(path: &Path) -> anyhow::Result<String> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    if name.len() > NAME_SIZE {
        anyhow::bail!(
            "Resource name {:?} is longer than {} bytes",
            name,
            NAME_SIZE
        );
    }
    Ok(name.to_string())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(&args)?;
    if config.inputs.is_empty() {
        anyhow::bail!("At least one input file is required");
    }

    let codec = FragmentCodec::default();
    let mut resources = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        let name = resource_name(path)?;
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let frames = codec.split(&name, &data)?;
        tracing::info!(%name, bytes = data.len(), frames = frames.len(), "Resource fragmented");
        resources.push(frames);
    }

    let sender = ArqSender::bind(config.bind, config.peer, config.arq_config()?)?;
    tracing::info!(local = %sender.local_addr()?, peer = %config.peer, "Sending");

    let start = Instant::now();
    for frame in resources.into_iter().flatten() {
        sender.enqueue(frame)?;
    }

    let deadline = start + config.drain_timeout();
    let interval = config.stats_interval().max(Duration::from_millis(100));
    let drained = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if sender.wait_drained(interval.min(remaining))? {
            break true;
        }
        if remaining.is_zero() {
            break false;
        }
        display_compact_sender(&sender.stats(), start.elapsed());
    };
    eprintln!();

    display_sender_stats(&sender.stats(), start.elapsed());
    if !drained {
        anyhow::bail!(
            "Timed out after {}s waiting for acknowledgments",
            config.drain_timeout_secs
        );
    }

    tracing::info!("All resources acknowledged");
    Ok(())
}
