// Licensed under the Apache-2.0 license

//! AMBA AXI4-Lite slave adapter.
//!
//! Reads start on `ARVALID`. Writes start only once both `AWVALID` and
//! `WVALID` are high; a read arriving together with a write is taken first.
//! Errors are reported as SLVERR on `BRESP`/`RRESP`. A response stays valid
//! until the master raises `BREADY`/`RREADY`.
//!
//! In the default mode a lone `AWVALID` or `WVALID` simply waits for its
//! other half. The strict variant treats it as a protocol violation and
//! answers with an error response.

use super::{
    Access, CpuifAdapter, Egress, Family, Handoff, Ingress, InternalTransaction, Port, PortWidth,
    Wires,
};

#[derive(Clone, Debug)]
pub struct AxiLite {
    strict: bool,
}

impl AxiLite {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }
}

impl CpuifAdapter for AxiLite {
    fn name(&self) -> &str {
        if self.strict {
            "axi4-lite-strict"
        } else {
            "axi4-lite"
        }
    }

    fn family(&self) -> Family {
        Family::SplitChannel
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::input("AWVALID", PortWidth::Bit),
            Port::output("AWREADY", PortWidth::Bit),
            Port::input("AWADDR", PortWidth::Address),
            Port::input("AWPROT", PortWidth::Bits(3)),
            Port::input("WVALID", PortWidth::Bit),
            Port::output("WREADY", PortWidth::Bit),
            Port::input("WDATA", PortWidth::Data),
            Port::input("WSTRB", PortWidth::Strobe),
            Port::output("BVALID", PortWidth::Bit),
            Port::input("BREADY", PortWidth::Bit),
            Port::output("BRESP", PortWidth::Bits(2)),
            Port::input("ARVALID", PortWidth::Bit),
            Port::output("ARREADY", PortWidth::Bit),
            Port::input("ARADDR", PortWidth::Address),
            Port::input("ARPROT", PortWidth::Bits(3)),
            Port::output("RVALID", PortWidth::Bit),
            Port::input("RREADY", PortWidth::Bit),
            Port::output("RDATA", PortWidth::Data),
            Port::output("RRESP", PortWidth::Bits(2)),
        ]
    }

    fn decode(&self, wires: &Wires) -> Ingress {
        if wires.flag("ARVALID") {
            return Ingress::Request(InternalTransaction::read(wires.get("ARADDR")));
        }
        match (wires.flag("AWVALID"), wires.flag("WVALID")) {
            (true, true) => Ingress::Request(InternalTransaction::write(
                wires.get("AWADDR"),
                wires.get("WDATA"),
                wires.get("WSTRB"),
            )),
            (false, false) => Ingress::Idle,
            _ if self.strict => Ingress::Violation(Access::Write),
            _ => Ingress::Idle,
        }
    }

    fn encode(&self, egress: &Egress) -> Wires {
        let mut wires = Wires::new();
        let write_accepted = (egress.accepted == Some(Access::Write)) as u64;
        wires
            .set("AWREADY", write_accepted)
            .set("WREADY", write_accepted)
            .set("ARREADY", (egress.accepted == Some(Access::Read)) as u64);
        wires
            .set("BVALID", 0)
            .set("BRESP", 0)
            .set("RVALID", 0)
            .set("RRESP", 0)
            .set("RDATA", 0);
        if let Some(done) = &egress.completion {
            let resp = self.error_encoding().encode(done.response.error);
            match done.access {
                Access::Write => {
                    wires.set("BVALID", 1).set("BRESP", resp);
                }
                Access::Read => {
                    wires
                        .set("RVALID", 1)
                        .set("RRESP", resp)
                        .set("RDATA", done.response.read_data);
                }
            }
        }
        wires
    }

    fn handoff(&self, wires: &Wires, access: Access) -> Handoff {
        let ready = match access {
            Access::Write => "BREADY",
            Access::Read => "RREADY",
        };
        if wires.flag(ready) {
            Handoff::Take
        } else {
            Handoff::Offer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpuif::{Completion, InternalResponse};

    fn write_wires() -> Wires {
        Wires::new()
            .with("AWVALID", 1)
            .with("AWADDR", 0x10)
            .with("WVALID", 1)
            .with("WDATA", 0xabcd)
            .with("WSTRB", 0xf)
    }

    #[test]
    fn test_write_needs_both_halves() {
        let axi = AxiLite::new(false);
        assert_eq!(
            axi.decode(&write_wires()),
            Ingress::Request(InternalTransaction::write(0x10, 0xabcd, 0xf))
        );
        assert_eq!(axi.decode(&write_wires().with("WVALID", 0)), Ingress::Idle);
        assert_eq!(axi.decode(&write_wires().with("AWVALID", 0)), Ingress::Idle);
    }

    #[test]
    fn test_strict_lone_half_is_violation() {
        let axi = AxiLite::new(true);
        assert_eq!(
            axi.decode(&write_wires().with("WVALID", 0)),
            Ingress::Violation(Access::Write)
        );
        assert_eq!(axi.decode(&Wires::new()), Ingress::Idle);
    }

    #[test]
    fn test_read_wins_over_write() {
        let axi = AxiLite::new(false);
        let wires = write_wires().with("ARVALID", 1).with("ARADDR", 0x4);
        assert_eq!(
            axi.decode(&wires),
            Ingress::Request(InternalTransaction::read(0x4))
        );
    }

    #[test]
    fn test_response_waits_for_ready() {
        let axi = AxiLite::new(false);
        assert_eq!(axi.handoff(&Wires::new(), Access::Write), Handoff::Offer);
        assert_eq!(
            axi.handoff(&Wires::new().with("RREADY", 1), Access::Write),
            Handoff::Offer
        );
        assert_eq!(
            axi.handoff(&Wires::new().with("BREADY", 1), Access::Write),
            Handoff::Take
        );
        assert_eq!(
            axi.handoff(&Wires::new().with("RREADY", 1), Access::Read),
            Handoff::Take
        );
    }

    #[test]
    fn test_slverr_on_error() {
        let axi = AxiLite::new(false);
        let wires = axi.encode(&Egress {
            accepted: Some(Access::Write),
            completion: Some(Completion {
                access: Access::Write,
                response: InternalResponse::error(),
            }),
        });
        assert_eq!(wires.get("AWREADY"), 1);
        assert_eq!(wires.get("WREADY"), 1);
        assert_eq!(wires.get("ARREADY"), 0);
        assert_eq!(wires.get("BVALID"), 1);
        assert_eq!(wires.get("BRESP"), 0b10);
        assert_eq!(wires.get("RVALID"), 0);

        let wires = axi.encode(&Egress {
            accepted: None,
            completion: Some(Completion {
                access: Access::Read,
                response: InternalResponse::ok(0x55),
            }),
        });
        assert_eq!(wires.get("RRESP"), 0);
        assert_eq!(wires.get("RDATA"), 0x55);
    }
}
