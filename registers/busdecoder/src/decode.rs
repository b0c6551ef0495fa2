// Licensed under the Apache-2.0 license

//! Address decode synthesis.
//!
//! The map is walked to a bounded depth. Every node reached at that depth, or
//! with nothing below it, becomes a selectable unit with one
//! [`DecodeCondition`]. Arrays contribute index levels: the element index for
//! a level is `(addr - base) / stride`, checked against the element count.
//! When an array dimension is driven by an address-modifying parameter the
//! count is taken from the runtime value of that parameter, while the
//! aperture keeps spanning the elaborated maximum.
//!
//! Lookup is first-match-wins in declaration order. An address that matches
//! nothing selects the default branch, which answers with an error.

use crate::cpuif::CpuifBus;
use crate::error::StructuralError;
use crate::params::{Classification, RuntimeParams};
use crate::types::{AddressMap, NodeIdx};
use crate::util::{clog2, sv_ident};
use log::debug;
use std::collections::HashMap;

/// Select-struct member raised when no unit matches.
pub const ERROR_MEMBER: &str = "cpuif_err";

/// One array index computed while matching an address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexLevel {
    pub node: NodeIdx,
    pub dimension_index: usize,
    pub stride: u64,
    /// Elaborated element count, also the maximum.
    pub count: u64,
    /// Parameter gating the element count at runtime.
    pub enable: Option<String>,
}

impl IndexLevel {
    fn effective_count(&self, runtime: &RuntimeParams) -> u64 {
        self.enable
            .as_deref()
            .and_then(|p| runtime.get(p))
            .map_or(self.count, |v| v.min(self.count))
    }
}

/// An unrolled array element that only exists while `index < param`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Gate {
    pub param: String,
    pub index: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeCondition {
    /// Absolute address of the unit with every index at zero.
    pub base: u64,
    /// Bytes of one element of the unit.
    pub size: u64,
    /// Outermost first.
    pub levels: Vec<IndexLevel>,
    pub gates: Vec<Gate>,
}

impl DecodeCondition {
    /// Element indices selected by `addr`, if it falls in this unit.
    pub fn matches(&self, addr: u64, runtime: &RuntimeParams) -> Option<Vec<u64>> {
        let enabled = self
            .gates
            .iter()
            .all(|g| runtime.get(&g.param).map_or(true, |v| g.index < v));
        if !enabled {
            return None;
        }
        let mut rel = addr.checked_sub(self.base)?;
        let mut indices = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            let i = if level.stride == 0 { 0 } else { rel / level.stride };
            if i >= level.effective_count(runtime) {
                return None;
            }
            rel -= i * level.stride;
            indices.push(i);
        }
        (rel < self.size).then_some(indices)
    }

    /// Width of the address decoded inside one element.
    pub fn addr_width(&self) -> u64 {
        clog2(self.size).max(1)
    }

    /// Absolute address of the element at `indices`.
    pub fn element_base(&self, indices: &[u64]) -> u64 {
        self.levels
            .iter()
            .zip(indices)
            .fold(self.base, |base, (l, i)| base.wrapping_add(i.wrapping_mul(l.stride)))
    }

    /// `addr` relative to the element at `indices`, truncated to
    /// [`Self::addr_width`] bits.
    pub fn local_address(&self, addr: u64, indices: &[u64]) -> u64 {
        let width = self.addr_width();
        let rel = addr.wrapping_sub(self.element_base(indices));
        if width >= 64 {
            rel
        } else {
            rel & ((1 << width) - 1)
        }
    }

    /// `[lo, hi)` covered by the unit at its maximum element counts.
    pub fn aperture(&self) -> (u64, u64) {
        if self.levels.iter().any(|l| l.count == 0) {
            return (self.base, self.base);
        }
        let span = self
            .levels
            .iter()
            .fold(self.size, |span, l| {
                span.saturating_add((l.count - 1).saturating_mul(l.stride))
            });
        (self.base, self.base.saturating_add(span))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeEntry {
    pub node: NodeIdx,
    /// Path below the root; indexed levels appear as `[i0]`, `[i1]`, ...
    pub path: String,
    pub condition: DecodeCondition,
}

impl DecodeEntry {
    /// Identifier for the select signal of this unit.
    pub fn ident(&self) -> String {
        let mut stripped = String::new();
        let mut in_index = false;
        for c in self.path.chars() {
            match c {
                '[' => in_index = true,
                ']' => in_index = false,
                c if !in_index => stripped.push(c),
                _ => {}
            }
        }
        sv_ident(&stripped)
    }
}

/// Result of decoding one address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selection {
    Unit { entry: usize, indices: Vec<u64> },
    /// Nothing matched; the request is answered with an error.
    Default,
}

impl Selection {
    pub fn entry(&self) -> Option<usize> {
        match self {
            Selection::Unit { entry, .. } => Some(*entry),
            Selection::Default => None,
        }
    }
}

/// Read and write selections, decoded independently.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selects {
    pub rd: Option<Selection>,
    pub wr: Option<Selection>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DecodeTable {
    entries: Vec<DecodeEntry>,
}

#[derive(Clone, Default)]
struct Context {
    path: String,
    shift: u64,
    levels: Vec<IndexLevel>,
    gates: Vec<Gate>,
}

struct Walker<'a> {
    map: &'a AddressMap,
    params: &'a Classification,
    max_depth: u32,
    unroll: bool,
    entries: Vec<DecodeEntry>,
}

impl Walker<'_> {
    fn visit(&mut self, idx: NodeIdx, depth: u32, ctx: &Context) {
        let map = self.map;
        let node = map.node(idx);
        let prefix = if ctx.path.is_empty() {
            node.name.clone()
        } else {
            format!("{}.{}", ctx.path, node.name)
        };

        for element in self.elements(idx, ctx, prefix) {
            let is_unit =
                (self.max_depth != 0 && depth == self.max_depth) || node.children.is_empty();
            if is_unit {
                let base = node.offset.saturating_add(element.shift);
                debug!("decode unit {} at {:#x}", element.path, base);
                self.entries.push(DecodeEntry {
                    node: idx,
                    path: element.path,
                    condition: DecodeCondition {
                        base,
                        size: node.size,
                        levels: element.levels,
                        gates: element.gates,
                    },
                });
            } else {
                for child in &node.children {
                    self.visit(*child, depth + 1, &element);
                }
            }
        }
    }

    /// Contexts for the node itself: one per element when unrolling, else one
    /// with an index level per dimension.
    fn elements(&self, idx: NodeIdx, ctx: &Context, prefix: String) -> Vec<Context> {
        let node = self.map.node(idx);
        if !node.is_array() {
            let mut element = ctx.clone();
            element.path = prefix;
            return vec![element];
        }
        // validated maps always fit; saturate otherwise
        let strides = node
            .dim_strides()
            .unwrap_or_else(|| vec![u64::MAX; node.dimensions.len()]);
        if !self.unroll {
            let mut element = ctx.clone();
            element.path = prefix;
            for (i, dim) in node.dimensions.iter().enumerate() {
                element.path.push_str(&format!("[i{}]", element.levels.len()));
                element.levels.push(IndexLevel {
                    node: idx,
                    dimension_index: i,
                    stride: strides[i],
                    count: dim.elaborated,
                    enable: self.params.enable_for(idx, i).map(String::from),
                });
            }
            return vec![element];
        }

        let mut elements = vec![Context {
            path: prefix,
            ..ctx.clone()
        }];
        for (i, dim) in node.dimensions.iter().enumerate() {
            let enable = self.params.enable_for(idx, i);
            let mut next = vec![];
            for element in &elements {
                for k in 0..dim.elaborated {
                    let mut e = element.clone();
                    e.path.push_str(&format!("_{k}"));
                    e.shift = e.shift.saturating_add(k.saturating_mul(strides[i]));
                    if let Some(param) = enable {
                        e.gates.push(Gate {
                            param: param.to_string(),
                            index: k,
                        });
                    }
                    next.push(e);
                }
            }
            elements = next;
        }
        elements
    }
}

impl DecodeTable {
    /// Build the decode table for `map`.
    ///
    /// `max_decode_depth` of 0 decodes down to registers; N stops N levels
    /// below the root.
    pub fn synthesize(
        map: &AddressMap,
        max_decode_depth: u32,
        unroll_arrays: bool,
        params: &Classification,
    ) -> DecodeTable {
        let mut walker = Walker {
            map,
            params,
            max_depth: max_decode_depth,
            unroll: unroll_arrays,
            entries: vec![],
        };
        let root = Context::default();
        for child in &map.node(map.root()).children {
            walker.visit(*child, 1, &root);
        }
        debug!("{}: {} decode unit(s)", map.name(), walker.entries.len());
        DecodeTable {
            entries: walker.entries,
        }
    }

    pub fn entries(&self) -> &[DecodeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First unit whose condition matches `addr`, else the default branch.
    pub fn lookup(&self, addr: u64, runtime: &RuntimeParams) -> Selection {
        self.entries
            .iter()
            .enumerate()
            .find_map(|(entry, e)| {
                e.condition
                    .matches(addr, runtime)
                    .map(|indices| Selection::Unit { entry, indices })
            })
            .unwrap_or(Selection::Default)
    }

    /// Decode the read and write addresses of an active request.
    pub fn select(&self, bus: &CpuifBus, runtime: &RuntimeParams) -> Selects {
        Selects {
            rd: (bus.cpuif_req && bus.cpuif_rd_en).then(|| self.lookup(bus.cpuif_rd_addr, runtime)),
            wr: (bus.cpuif_req && bus.cpuif_wr_en).then(|| self.lookup(bus.cpuif_wr_addr, runtime)),
        }
    }

    /// `[lo, hi)` of every unit, in table order.
    pub fn apertures(&self) -> Vec<(u64, u64)> {
        self.entries.iter().map(|e| e.condition.aperture()).collect()
    }

    /// Fail if two units flatten to the same select identifier, or one
    /// collides with the error member of the select struct.
    pub fn check_identifiers(&self) -> Result<(), StructuralError> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        seen.insert(ERROR_MEMBER.to_string(), ERROR_MEMBER);
        for entry in &self.entries {
            if let Some(previous) = seen.insert(entry.ident(), &entry.path) {
                return Err(StructuralError::DuplicateIdentifier {
                    ident: entry.ident(),
                    path: entry.path.clone(),
                    previous: previous.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fail if any two unit apertures overlap.
    pub fn check_disjoint(&self) -> Result<(), StructuralError> {
        let mut spans: Vec<(u64, u64, usize)> = self
            .apertures()
            .into_iter()
            .enumerate()
            .filter(|(_, (lo, hi))| lo < hi)
            .map(|(i, (lo, hi))| (lo, hi, i))
            .collect();
        spans.sort();
        for pair in spans.windows(2) {
            let (_, prev_hi, prev) = pair[0];
            let (lo, _, cur) = pair[1];
            if lo < prev_hi {
                return Err(StructuralError::OverlappingSiblings {
                    path: self.entries[cur].path.clone(),
                    previous: self.entries[prev].path.clone(),
                });
            }
        }
        Ok(())
    }
}
