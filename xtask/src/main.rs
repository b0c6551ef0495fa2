// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

mod busdecoder;

#[derive(Parser)]
#[command(name = "xtask", about = "Build and generation tasks")]
struct Xtask {
    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a bus decoder from a TOML address map
    Busdecoder {
        /// Address map description
        #[arg(short, long, value_name = "FILE")]
        map: PathBuf,

        /// Decoder options; command-line flags override it
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// CPU interface (apb3, apb4, taxi-apb, axi4-lite, axi4-lite-strict)
        #[arg(long)]
        cpuif: Option<String>,

        /// Hierarchy levels to decode; 0 decodes down to registers
        #[arg(long)]
        max_decode_depth: Option<u32>,

        /// Emit one select line per array element
        #[arg(long)]
        unroll: bool,

        /// Demote ambiguous parameters to inert instead of failing
        #[arg(long)]
        allow_ambiguous: bool,

        /// Directory for the generated SystemVerilog; prints a summary only
        /// when absent
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Xtask::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new().with_level(level).init();

    let result = match &cli.xtask {
        Commands::Busdecoder {
            map,
            config,
            cpuif,
            max_decode_depth,
            unroll,
            allow_ambiguous,
            output,
        } => busdecoder::generate(&busdecoder::Options {
            map,
            config: config.as_deref(),
            cpuif: cpuif.as_deref(),
            max_decode_depth: *max_decode_depth,
            unroll: *unroll,
            allow_ambiguous: *allow_ambiguous,
            output: output.as_deref(),
        }),
    };
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
