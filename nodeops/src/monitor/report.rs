//! Human-readable rendering of monitor output

use std::fmt::{self, Display, Write};

use colored::Colorize;

use crate::deploy::orchestrator::ServiceStatus;
use crate::monitor::health::{
    DebugReport, MempoolState, NetworkState, PeerSummary, Section, StatusReport, SyncPhase,
    SyncState,
};
use crate::utils::human_bytes;

const UNKNOWN: &str = "unknown";

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.running {
            "running".green()
        } else {
            "stopped".red()
        };
        writeln!(f, "{}", "Service".bold())?;
        writeln!(f, "  Container:  {} ({})", self.container_name, state)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        if let Some(stats) = &self.resource_usage {
            writeln!(f, "  CPU:        {}", or_unknown(&stats.cpu_percent))?;
            writeln!(
                f,
                "  Memory:     {} ({})",
                or_unknown(&stats.mem_usage),
                or_unknown(&stats.mem_percent)
            )?;
            writeln!(f, "  Net I/O:    {}", or_unknown(&stats.net_io))?;
            writeln!(f, "  Block I/O:  {}", or_unknown(&stats.block_io))?;
        }
        Ok(())
    }
}

impl Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Blockchain".bold())?;
        writeln!(f, "  Chain:      {}", self.chain)?;
        writeln!(
            f,
            "  Blocks:     {} / {} headers",
            self.current_height, self.header_height
        )?;
        writeln!(f, "  Progress:   {:.2}% {}", self.percent, progress_bar(self.percent))?;
        let status = match self.phase {
            SyncPhase::StartingUp => "starting up".yellow(),
            SyncPhase::Synchronizing if self.remaining == 0 => "synchronizing".yellow(),
            SyncPhase::Synchronizing => {
                format!("synchronizing, {} blocks remaining", self.remaining).yellow()
            }
            SyncPhase::FullySynchronized => "fully synchronized".green(),
        };
        writeln!(f, "  Status:     {}", status)?;
        if self.size_on_disk > 0 {
            writeln!(f, "  On disk:    {}", human_bytes(self.size_on_disk))?;
        }
        Ok(())
    }
}

impl Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Network".bold())?;
        write!(f, "  Peers:      {}", self.connections)?;
        if let (Some(inbound), Some(outbound)) = (self.connections_in, self.connections_out) {
            write!(f, " ({} in / {} out)", inbound, outbound)?;
        }
        writeln!(f)?;
        writeln!(f, "  Version:    {}", self.subversion)?;
        let listening = if self.port_listening {
            "listening locally".green()
        } else {
            "not listening".red()
        };
        writeln!(f, "  P2P port:   {} ({})", self.p2p_port, listening)
    }
}

impl Display for MempoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Mempool".bold())?;
        writeln!(f, "  Transactions: {}", self.transactions)?;
        writeln!(f, "  Size:         {}", human_bytes(self.bytes))?;
        if self.max_bytes > 0 {
            writeln!(
                f,
                "  Memory:       {} of {}",
                human_bytes(self.usage),
                human_bytes(self.max_bytes)
            )?;
        }
        match self.min_fee {
            Some(fee) => writeln!(f, "  Min fee:      {:.8} BTC/kvB", fee),
            None => writeln!(f, "  Min fee:      {}", UNKNOWN),
        }
    }
}

impl<T: Display> Display for Section<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Ok(value) => write!(f, "{}", value),
            Section::Failed(error) => writeln!(f, "  {} {}", "unavailable:".red(), error),
        }
    }
}

impl Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            "Node status".bold().underline(),
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f)?;
        writeln!(f, "{}", self.service)?;
        writeln!(f, "{}", self.sync)?;
        writeln!(f, "{}", self.network)?;
        writeln!(f, "{}", self.mempool)?;

        let host = &self.resources.host;
        writeln!(f, "{}", "Host".bold())?;
        writeln!(f, "  Hostname:   {}", host.hostname)?;
        writeln!(f, "  CPU:        {:.1}% of {} cores", host.cpu_usage, host.cpu_count)?;
        writeln!(
            f,
            "  Memory:     {} / {} ({:.1}%)",
            human_bytes(host.memory_used),
            human_bytes(host.memory_total),
            host.memory_percent
        )?;
        writeln!(
            f,
            "  Disk:       {} / {} ({:.1}%)",
            human_bytes(host.disk_used),
            human_bytes(host.disk_total),
            host.disk_percent
        )?;
        writeln!(f, "  Uptime:     {}", format_uptime(host.uptime_secs))
    }
}

impl Display for PeerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} ({} inbound, {} outbound)",
            "Peers:".bold(),
            self.total,
            self.inbound,
            self.outbound
        )?;
        for peer in &self.peers {
            let direction = match peer.inbound {
                Some(true) => "in ",
                Some(false) => "out",
                None => "?  ",
            };
            let ping = peer
                .pingtime
                .map(|p| format!("{:.0} ms", p * 1000.0))
                .unwrap_or_else(|| UNKNOWN.to_string());
            writeln!(
                f,
                "  [{}] {:<45} {:<28} {}",
                direction,
                peer.addr.as_deref().unwrap_or(UNKNOWN),
                peer.subver.as_deref().unwrap_or(UNKNOWN),
                ping
            )?;
        }
        Ok(())
    }
}

impl Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.service)?;
        writeln!(f, "{}", "Host".bold())?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Arch/OS:    {} / {}", self.host.arch, self.host.os)?;
        writeln!(
            f,
            "  Board:      {}",
            self.host.board_model.as_deref().unwrap_or(UNKNOWN)
        )?;
        writeln!(f, "  OS:         {} (kernel {})", self.os.name, self.os.kernel)?;
        writeln!(
            f,
            "  Memory:     {} / {}",
            human_bytes(self.metrics.memory_used),
            human_bytes(self.metrics.memory_total)
        )?;
        writeln!(f)?;
        writeln!(f, "{}", "Configuration".bold())?;
        match &self.config {
            Section::Ok(entries) => {
                for (key, value) in entries {
                    writeln!(f, "  {} = {}", key, value)?;
                }
            }
            Section::Failed(error) => writeln!(f, "  {} {}", "unavailable:".red(), error)?,
        }
        writeln!(f)?;
        writeln!(f, "{}", "Recent logs".bold())?;
        match &self.recent_logs {
            Section::Ok(logs) => write!(f, "{}", logs),
            Section::Failed(error) => writeln!(f, "  {} {}", "unavailable:".red(), error),
        }
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        UNKNOWN
    } else {
        value
    }
}

fn progress_bar(percent: f64) -> String {
    const WIDTH: usize = 30;
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * WIDTH as f64).round() as usize;
    let mut bar = String::with_capacity(WIDTH + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(WIDTH - filled));
    bar.push(']');
    bar
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let mut out = String::new();
    if days > 0 {
        let _ = write!(out, "{}d ", days);
    }
    let _ = write!(out, "{}h {}m", hours, minutes);
    out
}
