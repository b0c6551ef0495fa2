// Licensed under the Apache-2.0 license

//! Command to synthesize a bus decoder from a TOML address map.

use anyhow::Result;
use registers_busdecoder::cpuif::CpuifAdapter;
use registers_busdecoder::params::ParameterRole;
use registers_busdecoder::{synthesize_from_file, DecoderConfig, Synthesis};
use std::path::Path;

pub struct Options<'a> {
    pub map: &'a Path,
    pub config: Option<&'a Path>,
    pub cpuif: Option<&'a str>,
    pub max_decode_depth: Option<u32>,
    pub unroll: bool,
    pub allow_ambiguous: bool,
    pub output: Option<&'a Path>,
}

pub fn generate(options: &Options) -> Result<()> {
    let mut config = match options.config {
        Some(path) => DecoderConfig::from_file(path)?,
        None => DecoderConfig::new(),
    };
    if let Some(cpuif) = options.cpuif {
        config = config.cpuif(cpuif);
    }
    if let Some(depth) = options.max_decode_depth {
        config = config.max_decode_depth(depth);
    }
    if options.unroll {
        config = config.unroll_arrays(true);
    }
    if options.allow_ambiguous {
        config = config.allow_ambiguous_parameters(true);
    }

    println!("Synthesizing decoder for: {}", options.map.display());
    let synthesis = synthesize_from_file(options.map, &config)?;
    print_summary(&synthesis);

    if let Some(dir) = options.output {
        for path in synthesis.write_outputs(dir)? {
            println!("Output written to: {}", path.display());
        }
    }
    Ok(())
}

fn print_summary(s: &Synthesis) {
    println!(
        "Module {} ({}), data width {}, address width {}",
        s.module_name,
        s.adapter.name(),
        s.data_width,
        s.addr_width
    );

    println!("\nDecode table:");
    for entry in s.decode.entries() {
        let (lo, hi) = entry.condition.aperture();
        println!("  0x{:08x}..0x{:08x}  {}", lo, hi, entry.path);
    }

    if !s.parameters.parameters.is_empty() {
        println!("\nParameters:");
    }
    for p in &s.parameters.parameters {
        let role = match &p.role {
            ParameterRole::AddressModifying { arrays, bound } => format!(
                "address-modifying [{}, {}], enables {}",
                bound.min,
                bound.max,
                arrays
                    .iter()
                    .map(|a| a.path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ParameterRole::Inert => "inert".to_string(),
            ParameterRole::Ambiguous { .. } => "ambiguous".to_string(),
        };
        println!("  {} = {}: {}", p.name, p.value, role);
    }

    for d in &s.diagnostics {
        println!("{:?}: {d}", d.severity);
    }
}
