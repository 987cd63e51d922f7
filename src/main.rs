//! Command-line front end for NIIMBOT label printers
//!
//! - `niimctl ports` lists serial ports
//! - `niimctl detect -c printer.json` identifies the loaded label roll
//! - `niimctl info -c printer.json` shows battery, versions and status
//! - `niimctl print -c printer.json -i label.png` prints an image

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use niimbot_link::{
    detect_label, resolve_target, serial, InfoKey, Link, PrinterClient, PrinterConfig,
    PrinterModel,
};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "niimctl")]
#[command(author, version, about = "NIIMBOT label printer tool", long_about = None)]
struct Cli {
    /// Enable verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Read the RFID tag of the loaded roll and match it to a label profile
    Detect {
        /// Printer configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show printer information
    Info {
        /// Printer configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print an image
    Print {
        /// Printer configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Image to print
        #[arg(short, long)]
        image: PathBuf,

        /// Rotate the image 90 degrees clockwise first
        #[arg(long)]
        rotate: bool,

        /// Override the configured density
        #[arg(short, long)]
        density: Option<u8>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Ports => {
            for port in serial::list_ports()? {
                println!("{}", port);
            }
        }
        Commands::Detect { config } => {
            let config = PrinterConfig::from_json_file(&config)?;
            let result = detect_label(Some(&config));
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Info { config } => {
            let config = PrinterConfig::from_json_file(&config)?;
            let mut printer = open_printer(&config)?;
            let outcome = show_info(&mut printer);
            printer.disconnect()?;
            outcome?;
        }
        Commands::Print {
            config,
            image,
            rotate,
            density,
        } => {
            let config = PrinterConfig::from_json_file(&config)?;
            let model = PrinterModel::find(&config.model)
                .ok_or_else(|| anyhow!("Unknown printer model '{}'", config.model))?;
            let mut label = image::open(&image)
                .with_context(|| format!("Failed to open {}", image.display()))?
                .to_luma8();
            if rotate {
                label = image::imageops::rotate90(&label);
            }

            let mut printer = open_printer(&config)?;
            let outcome = printer.print_image(&label, model, density.unwrap_or(config.density));
            printer.disconnect()?;
            if !outcome? {
                bail!("Printer did not acknowledge every print step");
            }
            println!("Printed {}x{} image", label.width(), label.height());
        }
    }

    Ok(())
}

fn open_printer(config: &PrinterConfig) -> Result<PrinterClient<Link>> {
    let target = resolve_target(config)?;
    let mut printer = PrinterClient::new(Link::open(&target)?);
    if !printer.connect()? {
        printer.disconnect()?;
        bail!("Printer did not answer the connection handshake");
    }
    Ok(printer)
}

fn show_info(printer: &mut PrinterClient<Link>) -> Result<()> {
    if let Some(status) = printer.heartbeat()? {
        println!("Status: {}", serde_json::to_string(&status)?);
    }
    for (label, key) in [
        ("Device type", InfoKey::DeviceType),
        ("Battery", InfoKey::Battery),
        ("Software version", InfoKey::SoftVersion),
        ("Hardware version", InfoKey::HardVersion),
        ("Serial", InfoKey::DeviceSerial),
    ] {
        match printer.get_info(key)? {
            Some(value) => println!("{}: {}", label, serde_json::to_string(&value)?),
            None => println!("{}: no response", label),
        }
    }
    Ok(())
}
