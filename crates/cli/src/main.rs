//! qrgen CLI - Command-line client for the qrgen daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use qrgen_sdk::{GenerateRequest, HealthStatus, QrgenClient, SdkError};
use std::path::PathBuf;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9530";

#[derive(Parser)]
#[command(name = "qrgen")]
#[command(about = "Render QR codes in isolated containers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "QRGEN_RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a QR code to a PNG file
    Generate {
        /// URL or text to encode
        target: String,

        /// Foreground color (e.g., black, #112233)
        #[arg(long)]
        fill_color: Option<String>,

        /// Background color
        #[arg(long)]
        back_color: Option<String>,

        /// Pixels per module (1-50)
        #[arg(long)]
        box_size: Option<i64>,

        /// Quiet-zone width in modules (0-20)
        #[arg(long)]
        border: Option<i64>,

        /// Error correction level: L, M, Q or H
        #[arg(short = 'e', long)]
        error_correction: Option<String>,

        /// Output file
        #[arg(short, long, default_value = "qrcode.png")]
        output: PathBuf,
    },

    /// Show daemon and container runtime health
    Health {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Runtime")]
    runtime: String,
    #[tabled(rename = "Slots free")]
    slots: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Uptime (s)")]
    uptime: u64,
}

impl From<&HealthStatus> for HealthRow {
    fn from(h: &HealthStatus) -> Self {
        Self {
            status: h.status.clone(),
            runtime: if h.runtime_reachable {
                "reachable".to_string()
            } else {
                "unreachable".to_string()
            },
            slots: format!("{}/{}", h.available_slots, h.max_slots),
            version: h.version.clone(),
            uptime: h.uptime_seconds,
        }
    }
}

fn describe(err: &SdkError) -> String {
    if let Some(field) = err.field() {
        return format!("{} (field: {})", err, field);
    }
    if err.is_throttled() {
        return format!("{} (daemon busy, retry later)", err);
    }
    err.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = QrgenClient::connect(&cli.rpc_url)
        .await
        .context("Failed to connect to daemon")?;

    match cli.command {
        Commands::Generate {
            target,
            fill_color,
            back_color,
            box_size,
            border,
            error_correction,
            output,
        } => {
            let request = GenerateRequest {
                target,
                fill_color,
                back_color,
                box_size,
                border,
                error_correction,
            };

            let image = match client.generate(request).await {
                Ok(image) => image,
                Err(e) => {
                    eprintln!("{} {}", "✗ Generation failed:".red().bold(), describe(&e));
                    std::process::exit(1);
                }
            };

            std::fs::write(&output, &image.bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("{}", "✓ QR code generated".green().bold());
            println!("  {} {}", "Job:".bold(), image.job_id);
            println!("  {} {}", "File:".bold(), output.display());
            println!("  {} {} bytes", "Size:".bold(), image.bytes.len());
            println!("  {} {} ms", "Took:".bold(), image.duration_ms);
        }

        Commands::Health { json } => {
            let health = client.health().await.context("Health check failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("{}", Table::new(vec![HealthRow::from(&health)]));
                if let Some(detail) = &health.runtime_detail {
                    println!("  {} {}", "Runtime:".bold(), detail.yellow());
                }
            }

            if !health.is_ok() {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
