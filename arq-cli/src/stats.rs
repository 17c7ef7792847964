//! Statistics display and formatting

use arq::{ReceiverStats, SenderStats};
use std::io::Write;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;
    const GBPS: u64 = MBPS * 1000;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format a retransmission timeout
pub fn format_timeout(timeout: Duration) -> String {
    let micros = timeout.as_micros();
    if micros >= 1_000_000 {
        format!("{:.2}s", timeout.as_secs_f64())
    } else if micros >= 1_000 {
        format!("{:.2}ms", micros as f64 / 1_000.0)
    } else {
        format!("{}µs", micros)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn throughput_bps(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 * 8.0 / secs) as u64
    } else {
        0
    }
}

/// Display sender statistics
pub fn display_sender_stats(stats: &SenderStats, elapsed: Duration) {
    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ SENDER STATISTICS                                           │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Elapsed:         {}", format_duration(elapsed));
    println!("│ Payloads:        {} enqueued", stats.payloads_enqueued);
    println!(
        "│ Segments:        {} sent / {} retransmitted",
        stats.segments_sent, stats.retransmissions
    );
    println!(
        "│ Acks:            {} accepted / {} stale / {} duplicate",
        stats.acks_received, stats.stale_acks, stats.duplicate_acks
    );
    println!("│ Faults:          {}", stats.faults);
    println!(
        "│ Bytes:           {} ({})",
        format_bytes(stats.bytes_sent),
        format_bandwidth(throughput_bps(stats.bytes_sent, elapsed))
    );
    println!("│ Timeout:         {}", format_timeout(stats.timeout));
    println!(
        "│ Window:          base {} / {} in flight",
        stats.window_base, stats.in_flight
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display receiver statistics
pub fn display_receiver_stats(stats: &ReceiverStats, elapsed: Duration) {
    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ RECEIVER STATISTICS                                         │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Elapsed:         {}", format_duration(elapsed));
    println!(
        "│ Segments:        {} received / {} duplicate",
        stats.segments_received, stats.duplicates
    );
    println!(
        "│ Delivery:        {} in order / {} consumed",
        stats.delivered, stats.consumed
    );
    println!("│ Acks sent:       {}", stats.acks_sent);
    println!("│ Faults:          {}", stats.faults);
    println!(
        "│ Bytes:           {} ({})",
        format_bytes(stats.bytes_received),
        format_bandwidth(throughput_bps(stats.bytes_received, elapsed))
    );
    println!(
        "│ Window:          base {} / {} buffered",
        stats.window_base, stats.buffered
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display compact sender stats on one line (for continuous updates)
pub fn display_compact_sender(stats: &SenderStats, elapsed: Duration) {
    eprint!(
        "\r[{:8}] Acked: {}/{} | Sent: {} | Rate: {} | Resent: {} | RTO: {}         ",
        format_duration(elapsed),
        stats.window_base,
        stats.payloads_enqueued,
        format_bytes(stats.bytes_sent),
        format_bandwidth(throughput_bps(stats.bytes_sent, elapsed)),
        stats.retransmissions,
        format_timeout(stats.timeout)
    );
    let _ = std::io::stderr().flush();
}

/// Display compact receiver stats on one line (for continuous updates)
pub fn display_compact_receiver(stats: &ReceiverStats, elapsed: Duration) {
    eprint!(
        "\r[{:8}] Delivered: {} | Received: {} | Rate: {} | Dups: {}         ",
        format_duration(elapsed),
        stats.delivered,
        format_bytes(stats.bytes_received),
        format_bandwidth(throughput_bps(stats.bytes_received, elapsed)),
        stats.duplicates
    );
    let _ = std::io::stderr().flush();
}
