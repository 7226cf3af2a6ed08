// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "barcode-bridge")]
#[command(about = "Decode barcodes from image files and frame streams")]
#[command(version = barcode_bridge::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode barcodes in image files
    Decode {
        /// Image files or directories
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// JSON parameter file applied before decoding
        #[arg(short, long)]
        parameters: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default parameter template
    Parameters {
        /// Write the template to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Feed images through continuous frame decoding
    Stream {
        /// Image files or directories, used as frames in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Frames appended per second
        #[arg(long, default_value = "15")]
        fps: u32,

        /// Number of passes over the images
        #[arg(short, long, default_value = "1")]
        repeat: u32,

        /// Maximum number of pending frames
        #[arg(short, long, default_value = "3")]
        queue: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=barcode_bridge=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            files,
            parameters,
            json,
        } => cli::decode_files(&files, parameters, json),
        Commands::Parameters { output } => cli::print_parameters(output),
        Commands::Stream {
            files,
            fps,
            repeat,
            queue,
        } => cli::stream_files(&files, fps, repeat, queue),
    }
}
