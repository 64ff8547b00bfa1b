//! `rigbridge` – gateway between the actuator rig and its front end.
//!
//! This binary:
//!
//! 1. Loads `~/.rigbridge/config.toml` (or `--config`), applies `RIGBRIDGE_*`
//!    environment overrides, then command-line flags.
//! 2. Opens the rig's serial port and starts the gateway tasks.
//! 3. Intercepts **Ctrl-C** to stop the gateway; a running gait sends the
//!    rig home before the process exits.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use rigbridge_hal::open_serial;
use rigbridge_runtime::{Gateway, GatewayConfig, init_tracing};
use rigbridge_types::GatewayError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rigbridge", version, about = "Serial ⇄ UDP gateway for the actuator rig")]
struct Args {
    /// Config file (default: ~/.rigbridge/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, e.g. /dev/ttyUSB0.
    #[arg(long)]
    serial_port: Option<String>,

    #[arg(long)]
    baud_rate: Option<u32>,

    /// Host of the front end receiving telemetry.
    #[arg(long)]
    frontend_host: Option<String>,

    /// Drop frames with non-zero padding bits instead of warning.
    #[arg(long)]
    strict_padding: bool,
}

impl Args {
    fn apply(&self, cfg: &mut config::Config) {
        if let Some(port) = &self.serial_port {
            cfg.serial_port = port.clone();
        }
        if let Some(baud) = self.baud_rate {
            cfg.baud_rate = baud;
        }
        if let Some(host) = &self.frontend_host {
            cfg.frontend_host = host.clone();
        }
        if self.strict_padding {
            cfg.strict_padding = true;
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // The runtime is built after this, so the OTLP exporter must not need it.
    let _tracing = init_tracing("rigbridge");

    print_banner();

    let path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::from(2);
        }
    };
    args.apply(&mut cfg);
    let gateway_config = match cfg.gateway_config() {
        Ok(gateway_config) => gateway_config,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::from(2);
        }
    };

    println!("  Serial     {} @ {} baud", cfg.serial_port.bold(), cfg.baud_rate);
    println!("  Commands   {}", gateway_config.listen_addr.to_string().bold());
    println!("  Front end  {}", gateway_config.frontend_addr.to_string().bold());
    println!();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&cfg, gateway_config)) {
        Ok(()) => {
            println!("{}", "  ✓ Gateway stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Gateway error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(cfg: &config::Config, gateway_config: GatewayConfig) -> Result<(), GatewayError> {
    let link = open_serial(&cfg.serial_config())?;
    let gateway = Gateway::start(gateway_config, link).await?;

    let shutdown = gateway.shutdown_token();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – sending the rig home and shutting down …".yellow().bold());
        shutdown.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    info!("serving, press Ctrl-C to stop");
    gateway.run().await
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "rigbridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pneumatic actuator rig gateway");
    println!();
}
