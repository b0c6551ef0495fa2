// Licensed under the Apache-2.0 license

//! Bus address decoder synthesizer.
//!
//! Takes an elaborated register address map and produces a decoder that
//! routes each CPU transaction to exactly one child, together with the
//! SystemVerilog rendering of that decoder.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use registers_busdecoder::{synthesize_from_file, DecoderConfig};
//!
//! let config = DecoderConfig::new().cpuif("axi4-lite").max_decode_depth(2);
//! let synthesis = synthesize_from_file(Path::new("soc.toml"), &config).unwrap();
//! println!("{}", synthesis.render_module());
//! synthesis.write_outputs(Path::new("out")).unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: The address-map model and its TOML description
//! - [`expr`]: Parameter expressions attached to the map
//! - [`validate`]: Structural checks and bus width derivation
//! - [`params`]: Parameter re-evaluation and classification
//! - [`decode`]: Decode-condition synthesis
//! - [`cpuif`]: CPU interface adapters and the transaction fabric
//! - [`output`]: SystemVerilog rendering
//! - [`config`]: Synthesis options ([`DecoderConfig`])

pub mod config;
pub mod cpuif;
pub mod decode;
pub mod error;
pub mod expr;
pub mod output;
pub mod params;
pub mod types;
pub mod util;
pub mod validate;

mod synth;
mod value;

pub use config::DecoderConfig;
pub use error::{Diagnostic, Severity, StructuralError};
pub use synth::{synthesize, synthesize_from_file, synthesize_with_registry, Synthesis};
pub use types::{AddressMap, AddressMapBuilder};
pub use value::Value;
