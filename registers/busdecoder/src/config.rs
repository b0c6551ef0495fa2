// Licensed under the Apache-2.0 license

//! Decoder generation options.
//!
//! [`DecoderConfig`] can be built in code or loaded from TOML:
//!
//! ```
//! use registers_busdecoder::config::DecoderConfig;
//!
//! let config = DecoderConfig::new()
//!     .cpuif("axi4-lite")
//!     .max_decode_depth(0)
//!     .unroll_arrays(true);
//! assert_eq!(config.cpuif, "axi4-lite");
//!
//! let config: DecoderConfig = toml::from_str("data_width = 64").unwrap();
//! assert_eq!(config.data_width, Some(64));
//! assert_eq!(config.max_decode_depth, 1);
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Bus data width in bits. Inferred from the map when unset.
    pub data_width: Option<u64>,

    /// CPU interface address width. Defaults to the minimum that covers the map.
    pub cpuif_address_width: Option<u64>,

    /// Hierarchy levels to decode: 0 decodes down to registers, 1 selects
    /// only top-level children, N descends N levels.
    pub max_decode_depth: u32,

    /// Give each array element its own select line instead of an indexed one.
    pub unroll_arrays: bool,

    /// Name of the CPU interface adapter.
    pub cpuif: String,

    /// Treat ambiguously matched parameters as inert instead of failing.
    pub allow_ambiguous_parameters: bool,

    /// Generated module name. Defaults to the map name.
    pub module_name: Option<String>,

    /// Generated package name. Defaults to `<module>_pkg`.
    pub package_name: Option<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            data_width: None,
            cpuif_address_width: None,
            max_decode_depth: 1,
            unroll_arrays: false,
            cpuif: "apb4".to_string(),
            allow_ambiguous_parameters: false,
            module_name: None,
            package_name: None,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn data_width(mut self, width: u64) -> Self {
        self.data_width = Some(width);
        self
    }

    pub fn cpuif_address_width(mut self, width: u64) -> Self {
        self.cpuif_address_width = Some(width);
        self
    }

    pub fn max_decode_depth(mut self, depth: u32) -> Self {
        self.max_decode_depth = depth;
        self
    }

    pub fn unroll_arrays(mut self, unroll: bool) -> Self {
        self.unroll_arrays = unroll;
        self
    }

    pub fn cpuif(mut self, name: &str) -> Self {
        self.cpuif = name.to_string();
        self
    }

    pub fn allow_ambiguous_parameters(mut self, allow: bool) -> Self {
        self.allow_ambiguous_parameters = allow;
        self
    }

    pub fn module_name(mut self, name: &str) -> Self {
        self.module_name = Some(name.to_string());
        self
    }

    pub fn package_name(mut self, name: &str) -> Self {
        self.package_name = Some(name.to_string());
        self
    }
}
