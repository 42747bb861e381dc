// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod sequence;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info};

use piezo_app::{init_logging, ConfigFile};
use piezo_backend::{register_builtin_backends_on, BackendOptions, RegistrationContext};
use piezo_core::DynResult;

use config::CliConfig;
use sequence::{run_sequence, SequenceConfig, SequenceReport};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - piezo controller bring-up");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Controller serial number (e.g. 71000123)
    #[arg(value_name = "SERIAL")]
    serial: Option<String>,
    /// Output voltage to set once the channel is enabled
    #[arg(value_name = "VOLTAGE", allow_negative_numbers = true)]
    voltage: Option<f64>,
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Controller backend to use (e.g. sim)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// Channel to drive (1-based)
    #[arg(short = 'c', long = "channel")]
    channel: Option<u16>,
    /// Status polling period in milliseconds
    #[arg(long = "poll-ms")]
    poll_ms: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    /// Print the final report as JSON on stdout
    #[arg(long = "json")]
    json: bool,
}

/// Resolved configuration after merging config file and CLI arguments.
struct ResolvedConfig {
    backend: String,
    sequence: SequenceConfig,
}

fn resolve_config(
    cli: &Cli,
    cfg: &CliConfig,
    registry: &RegistrationContext,
) -> DynResult<ResolvedConfig> {
    let backend = cli
        .backend
        .clone()
        .unwrap_or_else(|| cfg.device.backend.clone());
    if !registry.is_backend_registered(&backend) {
        return Err(format!(
            "Unknown controller backend: {} (available: {})",
            backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }

    let serial = cli
        .serial
        .clone()
        .or_else(|| cfg.device.serial.clone())
        .ok_or("Serial number not specified. Pass <SERIAL> or set [device].serial in config.")?;

    let channel = cli.channel.unwrap_or(cfg.device.channel);
    let poll_ms = cli.poll_ms.unwrap_or(cfg.timing.poll_ms);
    if poll_ms == 0 {
        return Err("--poll-ms must be > 0".into());
    }

    Ok(ResolvedConfig {
        backend,
        sequence: SequenceConfig {
            channel,
            voltage: cli.voltage,
            family: cfg.family(),
            options: cfg.channel_options(),
            settings_timeout: Duration::from_millis(cfg.timing.settings_timeout_ms),
            poll_period: Duration::from_millis(poll_ms),
            first_sample_timeout: Duration::from_millis(cfg.timing.first_sample_timeout_ms),
            proceed_without_settings: cfg.behavior.proceed_without_settings,
            ..SequenceConfig::new(serial)
        },
    })
}

fn log_report(report: &SequenceReport) {
    info!("Device id: {}", report.device_id);
    if let Some(ref name) = report.device_name {
        info!("Model: {}", name);
    }
    info!("Maximum output voltage: {} V", report.max_output);
    if let Some(requested) = report.requested_output {
        info!(
            "Requested {} V, device reports {} V",
            requested,
            report.confirmed_output.unwrap_or_default()
        );
    }
    if !report.settings_confirmed {
        info!("Ran on device default settings");
    }
    debug!(
        "Channel made {} state transitions, polled every {:?} ms",
        report.state_transitions, report.poll_period_ms
    );
    info!("Final state: session {}", report.session_state);
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);

    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", CliConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = CliConfig::load(cli.config.as_deref())?;

    init_logging(
        cli.log_level
            .as_deref()
            .or(cfg.general.log_level.as_deref()),
    );

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let resolved = resolve_config(&cli, &cfg, &registry)?;
    info!(
        "Starting piezo-cli (backend: {}, serial: {}, channel: {})",
        resolved.backend, resolved.sequence.serial, resolved.sequence.channel
    );

    let hal = registry.build_hal(
        &resolved.backend,
        BackendOptions {
            sim: cfg.sim.clone(),
        },
    )?;

    match run_sequence(hal, &resolved.sequence).await {
        Ok(report) => {
            log_report(&report);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        Err(e) => {
            error!("Sequence aborted: {}", e);
            std::process::exit(1);
        }
    }
}
