// Licensed under the Apache-2.0 license

//! Structural errors and non-fatal diagnostics.

use thiserror::Error;

/// A violated structural precondition. Synthesis stops at the first one.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StructuralError {
    #[error("{path}: {kind} {value:#x} is not a multiple of the {alignment}-byte bus word")]
    MisalignedAddress {
        path: String,
        kind: &'static str,
        value: u64,
        alignment: u64,
    },
    #[error(
        "{path}: register width {reg_width} exceeds access width {access_width}, \
         which must then equal the data width {data_width}"
    )]
    UnsupportedAccessWidth {
        path: String,
        reg_width: u64,
        access_width: u64,
        data_width: u64,
    },
    #[error("{path}: field `{field}` spans multiple sub-words and requires buffered {access}")]
    MissingBuffering {
        path: String,
        field: String,
        access: &'static str,
    },
    #[error("{path}: property `{property}` references `{target}` across the decoder boundary")]
    CrossBoundaryReference {
        path: String,
        property: String,
        target: String,
    },
    #[error("{path}: property `{property}` is not supported")]
    UnsupportedProperty { path: String, property: String },
    #[error(
        "parameter `{parameter}` ambiguously sizes `{path}`; candidates: {}",
        .candidates.join(", ")
    )]
    AmbiguousParameterClassification {
        parameter: String,
        path: String,
        candidates: Vec<String>,
    },
    #[error("{path}: overlaps or precedes `{previous}`")]
    OverlappingSiblings { path: String, previous: String },
    #[error("data width {width} must be a power of two of at least 8 bits")]
    InvalidDataWidth { width: u64 },
    #[error("address width {requested} is smaller than the required {minimum} bits")]
    AddressWidthTooSmall { requested: u64, minimum: u64 },
    #[error("unknown CPU interface `{name}`")]
    UnknownCpuif { name: String },
    #[error("parameter `{name}` value {value} exceeds its maximum {max}")]
    ParameterOutOfBounds { name: String, value: u64, max: u64 },
    #[error("{path}: select signal `{ident}` is already used by `{previous}`")]
    DuplicateIdentifier {
        ident: String,
        path: String,
        previous: String,
    },
    #[error("{path}: address range exceeds the 64-bit address space")]
    AddressOverflow { path: String },
        #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String },
    #[error("{path}: {message}")]
    Expression { path: String, message: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Info,
    Warning,
}

/// A non-fatal finding recorded during synthesis.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(path: &str, message: impl Into<String>) -> Self {
        let d = Self {
            severity: Severity::Warning,
            path: path.to_string(),
            message: message.into(),
        };
        log::warn!("{}", d);
        d
    }

    pub fn info(path: &str, message: impl Into<String>) -> Self {
        let d = Self {
            severity: Severity::Info,
            path: path.to_string(),
            message: message.into(),
        };
        log::info!("{}", d);
        d
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}
