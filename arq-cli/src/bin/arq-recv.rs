//! ARQ Receiver - reliable file receiver
//!
//! Accepts one sender, reassembles the resources it streams and writes each
//! one into the output directory under its resource name.

use anyhow::Context;
use arq::{ArqReceiver, ResourceAssembler};
use arq_cli::stats::{display_compact_receiver, display_receiver_stats};
use arq_cli::{init_tracing, Config, ReceiverConfig};
use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "arq-recv")]
#[command(about = "Reliable file receiver over UDP", long_about = None)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Configuration file (TOML, [receiver] section)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Exit after this many resources
    #[arg(short = 'n', long)]
    expect: Option<usize>,

    /// Window size in segments
    #[arg(short, long)]
    window: Option<u64>,

    /// Statistics interval in seconds
    #[arg(long)]
    stats: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<ReceiverConfig> {
    let mut config = match (&args.config, args.listen) {
        (Some(path), _) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .receiver
            .context("configuration file has no [receiver] section")?,
        (None, Some(listen)) => ReceiverConfig::new(listen),
        (None, None) => anyhow::bail!("A listen address is required (--listen or --config)"),
    };

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if args.expect.is_some() {
        config.expect = args.expect;
    }
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if let Some(secs) = args.stats {
        config.stats_interval_secs = secs;
    }
    Ok(config)
}

/// Output path for a resource, refusing names that would escape the directory
fn output_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let file_name = Path::new(name).file_name()?;
    (file_name == name).then(|| dir.join(file_name))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(&args)?;
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;

    let receiver = ArqReceiver::bind(config.listen, config.arq_config()?)?;
    tracing::info!(local = %receiver.local_addr()?, "Listening");

    let mut assembler = ResourceAssembler::default();
    let mut completed = 0usize;
    let interval = config.stats_interval().max(Duration::from_millis(100));
    let start = Instant::now();

    while config.expect.map_or(true, |expect| completed < expect) {
        let Some(frames) = receiver.receive_timeout(1, interval)? else {
            if receiver.peer_addr().is_some() {
                display_compact_receiver(&receiver.stats(), start.elapsed());
            }
            continue;
        };

        for frame in frames {
            let resource = match assembler.push(&frame) {
                Ok(Some(resource)) => resource,
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(%error, "Discarding malformed frame");
                    continue;
                }
            };

            let Some(path) = output_path(&config.output_dir, &resource.name) else {
                tracing::warn!(name = %resource.name, "Refusing unsafe resource name");
                continue;
            };
            fs::write(&path, &resource.data)
                .with_context(|| format!("writing {}", path.display()))?;
            completed += 1;
            tracing::info!(
                name = %resource.name,
                bytes = resource.data.len(),
                path = %path.display(),
                "Resource received"
            );
        }
    }
    eprintln!();

    display_receiver_stats(&receiver.stats(), start.elapsed());
    Ok(())
}
