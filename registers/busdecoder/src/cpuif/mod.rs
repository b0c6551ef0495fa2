// Licensed under the Apache-2.0 license

//! CPU interface adapters.
//!
//! The decoder works on one protocol-agnostic request/response contract
//! ([`InternalTransaction`] and [`InternalResponse`], carried on the
//! `cpuif_*` signals of [`CpuifBus`]). An adapter translates a concrete bus
//! handshake into that contract and back:
//!
//! ```text
//!   master wires ──decode──▶ Ingress ──▶ Fabric ──▶ selected child
//!   master wires ◀─encode─── Egress  ◀── Fabric ◀── child response
//! ```
//!
//! A response is handed back only when the master can take it: in the APB
//! access phase, or once `BREADY`/`RREADY` is seen for AXI. Until then the
//! transaction stays outstanding and nothing new is accepted.
//!
//! Built-in adapters are APB3, APB4, the taxi APB interface and AXI4-Lite.
//! Other protocols plug in through [`Adapter::Custom`] and the
//! [`AdapterRegistry`].

mod apb;
mod axi4lite;
pub mod fabric;
mod registry;

pub use apb::{Apb, ApbVersion};
pub use axi4lite::AxiLite;
pub use fabric::{Downstream, Fabric, Target};
pub use registry::{AdapterFactory, AdapterRegistry};

use std::collections::BTreeMap;

/// Signal values on the master side of an adapter, by signal name.
/// Signals that were never driven read as zero.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Wires(BTreeMap<String, u64>);

impl Wires {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name) != 0
    }

    pub fn set(&mut self, name: &str, value: u64) -> &mut Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn with(mut self, name: &str, value: u64) -> Self {
        self.set(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Family {
    /// One request/ack handshake shared by reads and writes (APB).
    SimpleHandshake,
    /// Independent address, data and response channels (AXI).
    SplitChannel,
}

/// How an error is signalled back to the master.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorEncoding {
    /// A single error flag.
    Flag,
    /// A two-bit response code, `0b10` (SLVERR) on error.
    Response2Bit,
}

impl ErrorEncoding {
    pub const SLVERR: u64 = 0b10;

    pub fn encode(&self, error: bool) -> u64 {
        match (self, error) {
            (_, false) => 0,
            (ErrorEncoding::Flag, true) => 1,
            (ErrorEncoding::Response2Bit, true) => Self::SLVERR,
        }
    }

    pub fn decode(&self, value: u64) -> bool {
        match self {
            ErrorEncoding::Flag => value != 0,
            ErrorEncoding::Response2Bit => value & Self::SLVERR != 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InternalTransaction {
    pub request_active: bool,
    pub is_write: bool,
    pub address: u64,
    pub write_data: u64,
    pub byte_enables: u64,
}

impl InternalTransaction {
    pub fn read(address: u64) -> Self {
        Self {
            request_active: true,
            is_write: false,
            address,
            ..Default::default()
        }
    }

    pub fn write(address: u64, write_data: u64, byte_enables: u64) -> Self {
        Self {
            request_active: true,
            is_write: true,
            address,
            write_data,
            byte_enables,
        }
    }

    pub fn access(&self) -> Access {
        if self.is_write {
            Access::Write
        } else {
            Access::Read
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InternalResponse {
    pub ack: bool,
    pub error: bool,
    pub read_data: u64,
}

impl InternalResponse {
    pub fn ok(read_data: u64) -> Self {
        Self {
            ack: true,
            error: false,
            read_data,
        }
    }

    pub fn error() -> Self {
        Self {
            ack: true,
            error: true,
            read_data: 0,
        }
    }
}

/// How the master treats a response that is ready to go back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Handoff {
    /// Not presented in this step.
    Hold,
    /// Presented and held stable, but not taken yet.
    Offer,
    /// Presented and taken; the transaction retires.
    Take,
}

/// What an adapter recognised on the master wires.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Ingress {
    Idle,
    Request(InternalTransaction),
    /// A protocol rule was broken; the request is answered with an error
    /// without reaching any child.
    Violation(Access),
}

/// A finished transaction on its way back to the master.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Completion {
    pub access: Access,
    pub response: InternalResponse,
}

/// What the fabric drives back towards the master in one step.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Egress {
    /// Request channel accepted this step.
    pub accepted: Option<Access>,
    pub completion: Option<Completion>,
}

/// The internal request/response signals shared by every adapter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CpuifBus {
    pub cpuif_req: bool,
    pub cpuif_wr_en: bool,
    pub cpuif_rd_en: bool,
    pub cpuif_wr_addr: u64,
    pub cpuif_rd_addr: u64,
    pub cpuif_wr_data: u64,
    pub cpuif_wr_byte_en: u64,
    pub cpuif_wr_ack: bool,
    pub cpuif_wr_err: bool,
    pub cpuif_rd_ack: bool,
    pub cpuif_rd_err: bool,
    pub cpuif_rd_data: u64,
}

impl CpuifBus {
    pub fn request(txn: &InternalTransaction) -> Self {
        let mut bus = Self {
            cpuif_req: txn.request_active,
            ..Default::default()
        };
        if txn.is_write {
            bus.cpuif_wr_en = true;
            bus.cpuif_wr_addr = txn.address;
            bus.cpuif_wr_data = txn.write_data;
            bus.cpuif_wr_byte_en = txn.byte_enables;
        } else {
            bus.cpuif_rd_en = true;
            bus.cpuif_rd_addr = txn.address;
        }
        bus
    }

    pub fn respond(&mut self, access: Access, response: &InternalResponse) {
        match access {
            Access::Write => {
                self.cpuif_wr_ack = response.ack;
                self.cpuif_wr_err = response.error;
            }
            Access::Read => {
                self.cpuif_rd_ack = response.ack;
                self.cpuif_rd_err = response.error;
                self.cpuif_rd_data = response.read_data;
            }
        }
    }

    pub fn completion(&self) -> Option<Completion> {
        if self.cpuif_wr_ack {
            Some(Completion {
                access: Access::Write,
                response: InternalResponse {
                    ack: true,
                    error: self.cpuif_wr_err,
                    read_data: 0,
                },
            })
        } else if self.cpuif_rd_ack {
            Some(Completion {
                access: Access::Read,
                response: InternalResponse {
                    ack: true,
                    error: self.cpuif_rd_err,
                    read_data: self.cpuif_rd_data,
                },
            })
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortDirection {
    /// Driven by the master.
    Input,
    /// Driven by the decoder.
    Output,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortWidth {
    Bit,
    Address,
    Data,
    Strobe,
    Bits(u64),
}

impl PortWidth {
    pub fn bits(&self, addr_width: u64, data_width: u64) -> u64 {
        match self {
            PortWidth::Bit => 1,
            PortWidth::Address => addr_width,
            PortWidth::Data => data_width,
            PortWidth::Strobe => data_width / 8,
            PortWidth::Bits(n) => *n,
        }
    }
}

/// A master-side signal of an adapter, as listed for the emitter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
    pub width: PortWidth,
}

impl Port {
    pub fn input(name: &str, width: PortWidth) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Input,
            width,
        }
    }

    pub fn output(name: &str, width: PortWidth) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Output,
            width,
        }
    }
}

/// A wire-level bus protocol.
pub trait CpuifAdapter {
    fn name(&self) -> &str;

    fn family(&self) -> Family;

    fn error_encoding(&self) -> ErrorEncoding {
        match self.family() {
            Family::SimpleHandshake => ErrorEncoding::Flag,
            Family::SplitChannel => ErrorEncoding::Response2Bit,
        }
    }

    fn ports(&self) -> Vec<Port>;

    /// Recognise a request on the master wires.
    fn decode(&self, wires: &Wires) -> Ingress;

    /// Drive the master-facing outputs.
    fn encode(&self, egress: &Egress) -> Wires;

    /// Whether a finished `access` can be returned in this step.
    fn handoff(&self, _wires: &Wires, _access: Access) -> Handoff {
        Handoff::Take
    }

    /// Whether children see addresses relative to their own base.
    fn forwards_local_address(&self) -> bool {
        true
    }
}

/// The closed set of adapters the generator knows about.
pub enum Adapter {
    Apb3,
    Apb4,
    TaxiApb,
    AxiLite { strict: bool },
    Custom(Box<dyn CpuifAdapter>),
}

impl Adapter {
    fn with_inner<R>(&self, f: impl FnOnce(&dyn CpuifAdapter) -> R) -> R {
        match self {
            Adapter::Apb3 => f(&Apb::new(ApbVersion::Apb3)),
            Adapter::Apb4 => f(&Apb::new(ApbVersion::Apb4)),
            Adapter::TaxiApb => f(&Apb::new(ApbVersion::Taxi)),
            Adapter::AxiLite { strict } => f(&AxiLite::new(*strict)),
            Adapter::Custom(inner) => f(inner.as_ref()),
        }
    }
}

impl CpuifAdapter for Adapter {
    fn name(&self) -> &str {
        match self {
            Adapter::Apb3 => "apb3",
            Adapter::Apb4 => "apb4",
            Adapter::TaxiApb => "taxi-apb",
            Adapter::AxiLite { strict: false } => "axi4-lite",
            Adapter::AxiLite { strict: true } => "axi4-lite-strict",
            Adapter::Custom(inner) => inner.name(),
        }
    }

    fn family(&self) -> Family {
        self.with_inner(|a| a.family())
    }

    fn error_encoding(&self) -> ErrorEncoding {
        self.with_inner(|a| a.error_encoding())
    }

    fn ports(&self) -> Vec<Port> {
        self.with_inner(|a| a.ports())
    }

    fn decode(&self, wires: &Wires) -> Ingress {
        self.with_inner(|a| a.decode(wires))
    }

    fn encode(&self, egress: &Egress) -> Wires {
        self.with_inner(|a| a.encode(egress))
    }

    fn handoff(&self, wires: &Wires, access: Access) -> Handoff {
        self.with_inner(|a| a.handoff(wires, access))
    }

    fn forwards_local_address(&self) -> bool {
        self.with_inner(|a| a.forwards_local_address())
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Adapter({})", self.name())
    }
}
