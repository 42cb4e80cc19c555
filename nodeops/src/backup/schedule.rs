//! Daily backup registration in the user's crontab

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::OpsError;

/// Trailing comment identifying the managed entry
pub const CRON_MARKER: &str = "# nodeops-backup";

/// Cron line running a non-interactive backup
pub fn cron_line(schedule: &str, exe: &Path, base_dir: &Path) -> String {
    format!(
        "{} {} --base-dir {} --non-interactive backup auto {}",
        schedule,
        shell_quote(&exe.to_string_lossy()),
        shell_quote(&base_dir.to_string_lossy()),
        CRON_MARKER
    )
}

/// Replace any previous managed entry with `line`, keeping everything else
pub fn merge_crontab(existing: &str, line: &str) -> String {
    let mut lines: Vec<&str> = existing
        .lines()
        .filter(|l| !l.contains(CRON_MARKER))
        .collect();
    lines.push(line);
    let mut merged = lines.join("\n");
    merged.push('\n');
    merged
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Install `line` into the current user's crontab
pub async fn install(line: &str) -> Result<(), OpsError> {
    let current = Command::new("crontab")
        .arg("-l")
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| OpsError::ConfigError(format!("crontab is not available: {}", e)))?;

    // `crontab -l` fails when the user has no crontab yet
    let existing = if current.status.success() {
        String::from_utf8_lossy(&current.stdout).into_owned()
    } else {
        debug!("No existing crontab");
        String::new()
    };

    let merged = merge_crontab(&existing, line);

    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| OpsError::ConfigError(format!("crontab is not available: {}", e)))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(merged.as_bytes()).await?;
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(OpsError::ConfigError(format!(
            "crontab rejected the entry ({})",
            status
        )));
    }

    info!("Scheduled backup: {}", line);
    Ok(())
}
