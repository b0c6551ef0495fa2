// Licensed under the Apache-2.0 license

//! Transaction engine tying an adapter to a decode table.
//!
//! The fabric accepts at most one transaction at a time. While it is
//! outstanding the master wires are not decoded again, so the request fields
//! stay fixed until the selected child answers. Exactly one child sees the
//! request, addressed relative to its own base unless the adapter forwards
//! the full address. Requests that match no child, and protocol violations,
//! are answered with an error without reaching any child.
//!
//! A response is returned according to the adapter's [`Handoff`]: held back,
//! offered and kept, or taken. Only a taken response retires the
//! transaction.

use super::{
    Access, CpuifAdapter, CpuifBus, Egress, Handoff, Ingress, InternalResponse,
    InternalTransaction, Wires,
};
use crate::decode::{DecodeTable, Selection};
use crate::params::RuntimeParams;
use crate::types::NodeIdx;
use log::{debug, warn};
use std::collections::VecDeque;

/// The child a request was routed to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Target {
    pub entry: usize,
    pub node: NodeIdx,
    pub path: String,
    pub indices: Vec<u64>,
    /// Absolute address of the selected element.
    pub base: u64,
}

/// The children behind the decoder.
pub trait Downstream {
    /// Answer `txn` for `target`, or `None` while the child is still busy.
    fn respond(&mut self, target: &Target, txn: &InternalTransaction) -> Option<InternalResponse>;
}

struct Outstanding {
    /// As accepted from the master.
    txn: InternalTransaction,
    /// As seen by the child.
    forwarded: InternalTransaction,
    /// `None` when the decoder answers by itself.
    target: Option<Target>,
    response: Option<InternalResponse>,
}

pub struct Fabric<'a> {
    adapter: &'a dyn CpuifAdapter,
    table: &'a DecodeTable,
    runtime: RuntimeParams,
    lane_mask: u64,
    // in-order, capacity one
    pending: VecDeque<Outstanding>,
}

impl<'a> Fabric<'a> {
    pub fn new(
        adapter: &'a dyn CpuifAdapter,
        table: &'a DecodeTable,
        data_width: u64,
        runtime: RuntimeParams,
    ) -> Self {
        let lanes = data_width / 8;
        Self {
            adapter,
            table,
            runtime,
            lane_mask: if lanes >= 64 { u64::MAX } else { (1 << lanes) - 1 },
            pending: VecDeque::with_capacity(1),
        }
    }

    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Select line per decode unit. At most one is high.
    pub fn select_lines(&self) -> Vec<bool> {
        let selected = self
            .pending
            .front()
            .and_then(|p| p.target.as_ref())
            .map(|t| t.entry);
        (0..self.table.len()).map(|i| Some(i) == selected).collect()
    }

    /// Internal request signals of the outstanding transaction.
    pub fn bus(&self) -> CpuifBus {
        self.pending
            .front()
            .map(|p| CpuifBus::request(&p.txn))
            .unwrap_or_default()
    }

    /// Advance by one step: take in the master wires and return what the
    /// decoder drives back.
    pub fn step(&mut self, wires: &Wires, downstream: &mut dyn Downstream) -> Wires {
        let mut egress = Egress::default();
        if self.pending.is_empty() {
            egress.accepted = self.accept(wires);
        }

        let Some(p) = self.pending.front_mut() else {
            return self.adapter.encode(&egress);
        };
        if p.response.is_none() {
            if let Some(target) = &p.target {
                p.response = downstream
                    .respond(target, &p.forwarded)
                    .filter(|r| r.ack);
            }
        }
        let Some(response) = &p.response else {
            return self.adapter.encode(&egress);
        };

        let access = p.txn.access();
        let handoff = self.adapter.handoff(wires, access);
        if handoff != Handoff::Hold {
            let mut bus = CpuifBus::request(&p.txn);
            bus.respond(access, response);
            egress.completion = bus.completion();
        }
        if handoff == Handoff::Take {
            self.pending.pop_front();
        }
        self.adapter.encode(&egress)
    }

    /// Decode a new request from `wires` and queue it.
    fn accept(&mut self, wires: &Wires) -> Option<Access> {
        let mut txn = match self.adapter.decode(wires) {
            Ingress::Idle => return None,
            Ingress::Violation(access) => {
                warn!(
                    "{}: protocol violation on {:?} request",
                    self.adapter.name(),
                    access
                );
                let txn = match access {
                    Access::Read => InternalTransaction::read(0),
                    Access::Write => InternalTransaction::write(0, 0, 0),
                };
                self.answer_with_error(txn);
                return Some(access);
            }
            Ingress::Request(txn) => txn,
        };
        let access = txn.access();
        if access == Access::Write {
            txn.byte_enables &= self.lane_mask;
        }
        let selects = self.table.select(&CpuifBus::request(&txn), &self.runtime);
        let selection = match access {
            Access::Read => selects.rd,
            Access::Write => selects.wr,
        };
        match selection.unwrap_or(Selection::Default) {
            Selection::Default => {
                debug!("no unit decodes {:#x}", txn.address);
                self.answer_with_error(txn);
            }
            Selection::Unit { entry, indices } => {
                let unit = &self.table.entries()[entry];
                let mut forwarded = txn.clone();
                if self.adapter.forwards_local_address() {
                    forwarded.address = unit.condition.local_address(txn.address, &indices);
                }
                debug!(
                    "{:?} {:#x} -> {} @ {:#x}",
                    access, txn.address, unit.path, forwarded.address
                );
                let target = Target {
                    entry,
                    node: unit.node,
                    path: unit.path.clone(),
                    base: unit.condition.element_base(&indices),
                    indices,
                };
                self.pending.push_back(Outstanding {
                    txn,
                    forwarded,
                    target: Some(target),
                    response: None,
                });
            }
        }
        Some(access)
    }

    fn answer_with_error(&mut self, txn: InternalTransaction) {
        self.pending.push_back(Outstanding {
            forwarded: txn.clone(),
            txn,
            target: None,
            response: Some(InternalResponse::error()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpuif::Adapter;
    use crate::params::Classification;
    use crate::types::{AddressMapBuilder, Dimension};
    use std::collections::HashMap;

    /// Answers after `latency` extra polls.
    #[derive(Default)]
    struct Regs {
        latency: usize,
        polls: usize,
        values: HashMap<usize, u64>,
        seen: Vec<(Target, u64)>,
    }

    impl Downstream for Regs {
        fn respond(
            &mut self,
            target: &Target,
            txn: &InternalTransaction,
        ) -> Option<InternalResponse> {
            if self.polls < self.latency {
                self.polls += 1;
                return None;
            }
            self.polls = 0;
            self.seen.push((target.clone(), txn.address));
            if txn.is_write {
                self.values.insert(target.entry, txn.write_data);
                Some(InternalResponse::ok(0))
            } else {
                Some(InternalResponse::ok(
                    self.values.get(&target.entry).copied().unwrap_or(0),
                ))
            }
        }
    }

    fn table() -> DecodeTable {
        let mut b = AddressMapBuilder::new("top");
        let root = b.root();
        for i in 0..4 {
            b.add_register(root, &format!("r{i}"), i * 4, 4);
        }
        DecodeTable::synthesize(&b.build(), 1, false, &Classification::default())
    }

    fn apb_setup(addr: u64) -> Wires {
        Wires::new().with("PSEL", 1).with("PADDR", addr)
    }

    fn apb_access(addr: u64) -> Wires {
        apb_setup(addr).with("PENABLE", 1)
    }

    #[test]
    fn test_apb_completes_in_access_phase() {
        let table = table();
        let adapter = Adapter::Apb4;
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        let mut regs = Regs::default();
        regs.values.insert(2, 0x77);

        // the child answers at once, but nothing is driven during setup
        let out = fabric.step(&apb_setup(0x8), &mut regs);
        assert_eq!(out.get("PREADY"), 0);
        assert_eq!(out.get("PRDATA"), 0);
        assert!(fabric.is_busy());
        assert_eq!(regs.seen.len(), 1);

        let out = fabric.step(&apb_access(0x8), &mut regs);
        assert_eq!(out.get("PREADY"), 1);
        assert_eq!(out.get("PSLVERR"), 0);
        assert_eq!(out.get("PRDATA"), 0x77);
        assert!(!fabric.is_busy());
        assert_eq!(regs.seen.len(), 1);
    }

    #[test]
    fn test_wait_states_hold_request() {
        let table = table();
        let adapter = Adapter::Apb4;
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        let mut regs = Regs {
            latency: 2,
            ..Default::default()
        };
        regs.values.insert(1, 0x55);

        let out = fabric.step(&apb_setup(0x4), &mut regs);
        assert_eq!(out.get("PREADY"), 0);
        assert!(fabric.is_busy());
        assert_eq!(fabric.select_lines(), vec![false, true, false, false]);
        assert_eq!(fabric.bus().cpuif_rd_addr, 0x4);

        // a new setup phase while busy is not decoded
        let out = fabric.step(&apb_setup(0x8), &mut regs);
        assert_eq!(out.get("PREADY"), 0);
        let out = fabric.step(&apb_access(0x4), &mut regs);
        assert_eq!(out.get("PREADY"), 1);
        assert_eq!(out.get("PRDATA"), 0x55);
        assert!(!fabric.is_busy());
        assert_eq!(regs.seen.len(), 1);
        assert_eq!(regs.seen[0].0.path, "r1");
    }

    #[test]
    fn test_unmatched_address_errors_without_forwarding() {
        let table = table();
        let adapter = Adapter::Apb4;
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        let mut regs = Regs::default();

        let out = fabric.step(&apb_setup(0x10), &mut regs);
        assert_eq!(out.get("PREADY"), 0);
        assert_eq!(out.get("PSLVERR"), 0);
        assert!(fabric.is_busy());
        assert_eq!(fabric.select_lines(), vec![false; 4]);

        let out = fabric.step(&apb_access(0x10), &mut regs);
        assert_eq!(out.get("PREADY"), 1);
        assert_eq!(out.get("PSLVERR"), 1);
        assert!(regs.seen.is_empty());
        assert!(!fabric.is_busy());
    }

    #[test]
    fn test_axi_response_held_until_ready() {
        let table = table();
        let adapter = Adapter::AxiLite { strict: false };
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        let mut regs = Regs::default();
        let write = Wires::new()
            .with("AWVALID", 1)
            .with("AWADDR", 0xc)
            .with("WVALID", 1)
            .with("WDATA", 0x99)
            .with("WSTRB", 0xf);

        let out = fabric.step(&write, &mut regs);
        assert_eq!(out.get("AWREADY"), 1);
        assert_eq!(out.get("BVALID"), 1);

        // BREADY low: the response stays up and nothing new is accepted
        let read = Wires::new().with("ARVALID", 1).with("ARADDR", 0xc);
        for _ in 0..3 {
            let out = fabric.step(&read, &mut regs);
            assert_eq!(out.get("BVALID"), 1);
            assert_eq!(out.get("BRESP"), 0);
            assert_eq!(out.get("ARREADY"), 0);
            assert_eq!(out.get("RVALID"), 0);
        }
        assert_eq!(regs.seen.len(), 1);

        let out = fabric.step(&read.clone().with("BREADY", 1), &mut regs);
        assert_eq!(out.get("BVALID"), 1);
        assert!(!fabric.is_busy());

        let out = fabric.step(&read.clone().with("RREADY", 1), &mut regs);
        assert_eq!(out.get("ARREADY"), 1);
        assert_eq!(out.get("RVALID"), 1);
        assert_eq!(out.get("RDATA"), 0x99);
        assert_eq!(out.get("BVALID"), 0);
    }

    #[test]
    fn test_children_see_local_addresses() {
        let mut b = AddressMapBuilder::new("top");
        let root = b.root();
        b.add_register(root, "ctrl", 0x0, 4);
        let blk = b.add_submap(root, "blk", 0x100, 0x20);
        b.make_array(blk, vec![Dimension::literal(2)], None);
        b.add_register(blk, "status", 0x0, 4);
        b.add_register(blk, "data", 0x8, 4);
        let table = DecodeTable::synthesize(&b.build(), 1, false, &Classification::default());
        let mut regs = Regs::default();

        let adapter = Adapter::Apb4;
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        fabric.step(&apb_setup(0x128), &mut regs);
        fabric.step(&apb_access(0x128), &mut regs);
        let (target, address) = &regs.seen[0];
        assert_eq!(target.path, "blk[i0]");
        assert_eq!(target.indices, vec![1]);
        assert_eq!(target.base, 0x120);
        assert_eq!(*address, 0x8);

        let adapter = Adapter::TaxiApb;
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        let taxi = Wires::new().with("psel", 1).with("paddr", 0x128);
        fabric.step(&taxi, &mut regs);
        assert_eq!(regs.seen[1].1, 0x128);
    }

    #[test]
    fn test_apb3_write_masks_lanes() {
        struct Capture(Vec<u64>);
        impl Downstream for Capture {
            fn respond(
                &mut self,
                _target: &Target,
                txn: &InternalTransaction,
            ) -> Option<InternalResponse> {
                self.0.push(txn.byte_enables);
                Some(InternalResponse::ok(0))
            }
        }
        let table = table();
        let adapter = Adapter::Apb3;
        let mut fabric = Fabric::new(&adapter, &table, 32, RuntimeParams::default());
        let mut capture = Capture(vec![]);
        let wires = Wires::new().with("PSEL", 1).with("PWRITE", 1).with("PADDR", 0xc);
        fabric.step(&wires, &mut capture);
        assert_eq!(capture.0, vec![0xf]);
    }
}
