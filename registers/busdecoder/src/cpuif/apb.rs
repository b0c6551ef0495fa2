// Licensed under the Apache-2.0 license

//! AMBA APB3 and APB4 slave adapters, and the taxi APB interface.
//!
//! A request is recognised in the setup phase (`PSEL && !PENABLE`) and is
//! answered in the access phase (`PSEL && PENABLE`): `PREADY` on ack,
//! `PSLVERR` on error and `PRDATA` for reads. Outside the access phase the
//! outputs stay low. APB3 has no `PSTRB`, so every byte lane is written.
//!
//! The taxi interface carries the APB4 signals under lowercase names and
//! forwards the full `paddr` to children.

use super::{
    Access, CpuifAdapter, Egress, Family, Handoff, Ingress, InternalTransaction, Port, PortWidth,
    Wires,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApbVersion {
    Apb3,
    Apb4,
    Taxi,
}

#[derive(Clone, Debug)]
pub struct Apb {
    version: ApbVersion,
}

impl Apb {
    pub fn new(version: ApbVersion) -> Self {
        Self { version }
    }

    fn signal(&self, name: &str) -> String {
        match self.version {
            ApbVersion::Taxi => name.to_lowercase(),
            _ => name.to_string(),
        }
    }

    fn has_strobe(&self) -> bool {
        self.version != ApbVersion::Apb3
    }

    fn in_access_phase(&self, wires: &Wires) -> bool {
        wires.flag(&self.signal("PSEL")) && wires.flag(&self.signal("PENABLE"))
    }
}

impl CpuifAdapter for Apb {
    fn name(&self) -> &str {
        match self.version {
            ApbVersion::Apb3 => "apb3",
            ApbVersion::Apb4 => "apb4",
            ApbVersion::Taxi => "taxi-apb",
        }
    }

    fn family(&self) -> Family {
        Family::SimpleHandshake
    }

    fn ports(&self) -> Vec<Port> {
        let mut ports = vec![
            Port::input(&self.signal("PSEL"), PortWidth::Bit),
            Port::input(&self.signal("PENABLE"), PortWidth::Bit),
            Port::input(&self.signal("PWRITE"), PortWidth::Bit),
            Port::input(&self.signal("PADDR"), PortWidth::Address),
        ];
        if self.has_strobe() {
            ports.push(Port::input(&self.signal("PPROT"), PortWidth::Bits(3)));
        }
        ports.push(Port::input(&self.signal("PWDATA"), PortWidth::Data));
        if self.has_strobe() {
            ports.push(Port::input(&self.signal("PSTRB"), PortWidth::Strobe));
        }
        ports.extend([
            Port::output(&self.signal("PRDATA"), PortWidth::Data),
            Port::output(&self.signal("PREADY"), PortWidth::Bit),
            Port::output(&self.signal("PSLVERR"), PortWidth::Bit),
        ]);
        ports
    }

    fn decode(&self, wires: &Wires) -> Ingress {
        if !wires.flag(&self.signal("PSEL")) || wires.flag(&self.signal("PENABLE")) {
            return Ingress::Idle;
        }
        let address = wires.get(&self.signal("PADDR"));
        if !wires.flag(&self.signal("PWRITE")) {
            return Ingress::Request(InternalTransaction::read(address));
        }
        let byte_enables = if self.has_strobe() {
            wires.get(&self.signal("PSTRB"))
        } else {
            u64::MAX
        };
        Ingress::Request(InternalTransaction::write(
            address,
            wires.get(&self.signal("PWDATA")),
            byte_enables,
        ))
    }

    fn encode(&self, egress: &Egress) -> Wires {
        let ready = self.signal("PREADY");
        let slverr = self.signal("PSLVERR");
        let rdata = self.signal("PRDATA");
        let mut wires = Wires::new();
        wires.set(&ready, 0).set(&slverr, 0).set(&rdata, 0);
        if let Some(done) = &egress.completion {
            wires.set(&ready, done.response.ack as u64);
            wires.set(&slverr, self.error_encoding().encode(done.response.error));
            if done.access == Access::Read {
                wires.set(&rdata, done.response.read_data);
            }
        }
        wires
    }

    fn handoff(&self, wires: &Wires, _access: Access) -> Handoff {
        if self.in_access_phase(wires) {
            Handoff::Take
        } else {
            Handoff::Hold
        }
    }

    fn forwards_local_address(&self) -> bool {
        self.version != ApbVersion::Taxi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpuif::{Completion, InternalResponse};

    #[test]
    fn test_setup_phase_starts_request() {
        let apb = Apb::new(ApbVersion::Apb4);
        let wires = Wires::new()
            .with("PSEL", 1)
            .with("PWRITE", 1)
            .with("PADDR", 0x8)
            .with("PWDATA", 0x1234)
            .with("PSTRB", 0x3);
        assert_eq!(
            apb.decode(&wires),
            Ingress::Request(InternalTransaction::write(0x8, 0x1234, 0x3))
        );
        assert_eq!(apb.handoff(&wires, Access::Write), Handoff::Hold);
        // access phase is not a new request, but is where the answer goes
        let access = wires.with("PENABLE", 1);
        assert_eq!(apb.decode(&access), Ingress::Idle);
        assert_eq!(apb.handoff(&access, Access::Write), Handoff::Take);
        assert_eq!(apb.decode(&Wires::new()), Ingress::Idle);
        assert_eq!(apb.handoff(&Wires::new(), Access::Read), Handoff::Hold);
    }

    #[test]
    fn test_apb3_writes_all_lanes() {
        let apb = Apb::new(ApbVersion::Apb3);
        let wires = Wires::new().with("PSEL", 1).with("PWRITE", 1).with("PSTRB", 0x1);
        match apb.decode(&wires) {
            Ingress::Request(txn) => assert_eq!(txn.byte_enables, u64::MAX),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!apb.ports().iter().any(|p| p.name == "PSTRB"));
        assert!(Apb::new(ApbVersion::Apb4)
            .ports()
            .iter()
            .any(|p| p.name == "PSTRB"));
    }

    #[test]
    fn test_error_response() {
        let apb = Apb::new(ApbVersion::Apb4);
        let wires = apb.encode(&Egress {
            accepted: Some(Access::Read),
            completion: Some(Completion {
                access: Access::Read,
                response: InternalResponse::error(),
            }),
        });
        assert_eq!(wires.get("PREADY"), 1);
        assert_eq!(wires.get("PSLVERR"), 1);
        assert_eq!(wires.get("PRDATA"), 0);
        assert_eq!(apb.encode(&Egress::default()).get("PREADY"), 0);
    }

    #[test]
    fn test_taxi_lowercase_signals() {
        let taxi = Apb::new(ApbVersion::Taxi);
        assert_eq!(taxi.name(), "taxi-apb");
        assert!(!taxi.forwards_local_address());
        assert!(Apb::new(ApbVersion::Apb4).forwards_local_address());
        let names: Vec<_> = taxi.ports().into_iter().map(|p| p.name).collect();
        assert!(names.contains(&"pstrb".to_string()));
        assert!(names.contains(&"pprot".to_string()));
        assert!(!names.iter().any(|n| n.starts_with('P')));

        let wires = Wires::new()
            .with("psel", 1)
            .with("paddr", 0x40)
            .with("pwrite", 1)
            .with("pwdata", 5)
            .with("pstrb", 0x1);
        assert_eq!(
            taxi.decode(&wires),
            Ingress::Request(InternalTransaction::write(0x40, 5, 0x1))
        );
        // uppercase names mean nothing to it
        assert_eq!(taxi.decode(&Wires::new().with("PSEL", 1)), Ingress::Idle);
        assert_eq!(
            taxi.handoff(&wires.with("penable", 1), Access::Write),
            Handoff::Take
        );

        let out = taxi.encode(&Egress {
            accepted: None,
            completion: Some(Completion {
                access: Access::Read,
                response: InternalResponse::ok(0x3),
            }),
        });
        assert_eq!(out.get("pready"), 1);
        assert_eq!(out.get("prdata"), 0x3);
    }
}
