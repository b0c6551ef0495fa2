// Licensed under the Apache-2.0 license

//! Synthesis pipeline.
//!
//! ```text
//! AddressMap ──validate──▶ widths + diagnostics
//!            ──classify──▶ parameter roles
//!            ──decode────▶ decode table
//!            ──registry──▶ adapter
//!                          └──▶ Synthesis ──▶ emitter
//! ```
//!
//! The first structural error stops the pipeline.

use crate::config::DecoderConfig;
use crate::cpuif::{Adapter, AdapterRegistry, Fabric};
use crate::decode::DecodeTable;
use crate::error::{Diagnostic, StructuralError};
use crate::output::GeneratedDecoder;
use crate::params::{classify, Classification, ParameterRole, RuntimeParams};
use crate::types::AddressMap;
use crate::util::sv_ident;
use crate::validate::validate;
use anyhow::Context;
use log::info;
use std::path::{Path, PathBuf};

/// Everything the emitter needs to produce a decoder.
#[derive(Debug)]
pub struct Synthesis {
    pub map: AddressMap,
    pub data_width: u64,
    pub addr_width: u64,
    pub decode: DecodeTable,
    pub parameters: Classification,
    pub adapter: Adapter,
    pub diagnostics: Vec<Diagnostic>,
    pub module_name: String,
    pub package_name: String,
}

impl Synthesis {
    /// Runtime parameter values, all at their elaborated maximum.
    pub fn runtime_params(&self) -> RuntimeParams {
        RuntimeParams::new(&self.parameters)
    }

    /// A transaction engine over this decoder.
    pub fn fabric(&self, runtime: RuntimeParams) -> Fabric<'_> {
        Fabric::new(&self.adapter, &self.decode, self.data_width, runtime)
    }

    pub fn generated(&self) -> GeneratedDecoder {
        GeneratedDecoder::from(self)
    }

    pub fn render_package(&self) -> String {
        self.generated().generate_package()
    }

    pub fn render_module(&self) -> String {
        self.generated().generate_module()
    }

    /// Write `<module>.sv` and `<package>.sv` into `dir`.
    pub fn write_outputs(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let generated = self.generated();
        let files = [
            (format!("{}.sv", self.package_name), generated.generate_package()),
            (format!("{}.sv", self.module_name), generated.generate_module()),
        ];
        let mut written = vec![];
        for (name, text) in files {
            let path = dir.join(name);
            std::fs::write(&path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Synthesize a decoder for `map` using the built-in adapters.
pub fn synthesize(map: AddressMap, config: &DecoderConfig) -> Result<Synthesis, StructuralError> {
    synthesize_with_registry(map, config, &AdapterRegistry::new())
}

/// Synthesize a decoder, resolving the CPU interface through `registry`.
pub fn synthesize_with_registry(
    map: AddressMap,
    config: &DecoderConfig,
    registry: &AdapterRegistry,
) -> Result<Synthesis, StructuralError> {
    let validated = validate(&map, config)?;
    let mut diagnostics = validated.diagnostics;
    let adapter = registry.create(&config.cpuif)?;

    let mut parameters = classify(&map)?;
    diagnostics.extend(
        parameters
            .parameters
            .iter()
            .filter(|p| matches!(p.role, ParameterRole::Inert))
            .map(|p| Diagnostic::info(&p.name, "sizes no array; rendered as a constant")),
    );
    if config.allow_ambiguous_parameters {
        diagnostics.extend(parameters.demote_ambiguous());
    } else {
        parameters.require_unambiguous()?;
    }

    let decode = DecodeTable::synthesize(
        &map,
        config.max_decode_depth,
        config.unroll_arrays,
        &parameters,
    );
    decode.check_disjoint()?;
    decode.check_identifiers()?;

    let module_name = config
        .module_name
        .clone()
        .unwrap_or_else(|| sv_ident(map.name()));
    let package_name = config
        .package_name
        .clone()
        .unwrap_or_else(|| format!("{module_name}_pkg"));

    info!(
        "Synthesized {} ({}): {} decode unit(s), data width {}, address width {}",
        module_name,
        config.cpuif,
        decode.len(),
        validated.data_width,
        validated.addr_width
    );

    Ok(Synthesis {
        map,
        data_width: validated.data_width,
        addr_width: validated.addr_width,
        decode,
        parameters,
        adapter,
        diagnostics,
        module_name,
        package_name,
    })
}

/// Load a TOML map description and synthesize a decoder for it.
pub fn synthesize_from_file(path: &Path, config: &DecoderConfig) -> anyhow::Result<Synthesis> {
    let map = AddressMap::from_file(path)?;
    let synthesis = synthesize(map, config)
        .with_context(|| format!("Failed to synthesize {}", path.display()))?;
    Ok(synthesis)
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
