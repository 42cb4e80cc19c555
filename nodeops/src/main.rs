//! nodeops - Entry Point
//!
//! Deploys, monitors, updates and backs up a containerized full node from
//! a single base directory.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing::{debug, info};

use nodeops::app::context::Context;
use nodeops::app::options::{Cli, GlobalOptions};
use nodeops::app::run::{absolute_base_dir, run, RunOptions};
use nodeops::deploy::engine::DockerEngine;
use nodeops::errors::OpsError;
use nodeops::filesys::file::File;
use nodeops::hardware::profile::{detect_profile, DeploymentProfile, HostInfo};
use nodeops::logs::{init_logging, LogOptions};
use nodeops::prompt::{AlwaysNo, AlwaysYes, Confirm, Interactive};
use nodeops::rpc::client::HttpRpcClient;
use nodeops::storage::layout::StorageLayout;
use nodeops::storage::node_conf::NodeConfig;
use nodeops::storage::settings::Settings;
use nodeops::update::feed::GithubReleaseFeed;
use nodeops::utils::{shutdown_signal, version_info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let json = cli.global.json;

    let code = match execute(cli).await {
        Ok(()) => 0,
        Err(e) => {
            report_error(&e, json);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<(), OpsError> {
    let global = cli.global;
    let base_dir = absolute_base_dir(&global.base_dir)?;

    // Retrieve the settings file
    let settings_file = match &global.settings {
        Some(path) => File::new(path),
        None => StorageLayout::new(&base_dir).settings_file(),
    };
    let settings = Settings::load_or_default(&settings_file).await?;
    let layout = StorageLayout::new(&base_dir).with_settings(&settings);

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.adjust(global.verbose, global.quiet),
        log_dir: base_dir.is_dir().then(|| layout.log_dir.clone()),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let version = version_info();
    debug!(
        "nodeops {} ({}, built {})",
        version.version, version.git_hash, version.build_time
    );

    let host = HostInfo::probe(&settings.hardware.marker_path);
    let profile = detect_profile(&host, &settings.hardware);
    info!("Deployment profile: {} ({} / {})", profile, host.arch, host.os);

    let ctx = build_context(layout, settings, profile, &global).await?;
    let options = RunOptions { json: global.json };
    run(&ctx, cli.command, &options, shutdown_signal()).await
}

async fn build_context(
    layout: StorageLayout,
    settings: Settings,
    profile: DeploymentProfile,
    global: &GlobalOptions,
) -> Result<Context, OpsError> {
    // Credentials come from the node configuration when it is readable
    let node_config = match NodeConfig::load(&layout.node_config_file()).await {
        Ok(config) => Some(config),
        Err(e) => {
            debug!("Node configuration unavailable for RPC: {}", e);
            None
        }
    };
    let rpc = HttpRpcClient::new(&settings.rpc, node_config.as_ref())?;
    let feed = GithubReleaseFeed::new(&settings.update.release_feed_url)?;

    Ok(Context {
        layout,
        profile,
        engine: Arc::new(DockerEngine::new()),
        rpc: Arc::new(rpc),
        feed: Arc::new(feed),
        confirm: confirm_policy(global),
        settings,
    })
}

fn confirm_policy(global: &GlobalOptions) -> Arc<dyn Confirm> {
    if global.yes {
        Arc::new(AlwaysYes)
    } else if global.non_interactive {
        Arc::new(AlwaysNo)
    } else {
        Arc::new(Interactive)
    }
}

fn report_error(error: &OpsError, json: bool) {
    if json {
        let body = serde_json::json!({
            "error": error.to_string(),
            "kind": format!("{:?}", error.kind()),
            "exit_code": error.exit_code(),
            "remediation": error.remediation(),
        });
        println!("{}", body);
        return;
    }

    eprintln!("{} {}", "error:".red().bold(), error);
    if let Some(hint) = error.remediation() {
        eprintln!("{} {}", "hint:".yellow().bold(), hint);
    }
}
