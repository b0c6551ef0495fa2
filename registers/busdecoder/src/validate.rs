// Licensed under the Apache-2.0 license

//! Structural checks run before any decode logic is synthesized.
//!
//! Every rule is a hard precondition: the first violation aborts with a
//! [`StructuralError`] naming the offending node. Non-fatal findings are
//! returned as [`Diagnostic`]s.

use crate::config::DecoderConfig;
use crate::error::{Diagnostic, StructuralError};
use crate::types::{AddressMap, Node, NodeIdx, NodeKind};
use crate::util::{clog2, is_pow2};
use log::debug;

const DEFAULT_DATA_WIDTH: u64 = 32;

/// Widths derived while validating a map.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedMap {
    pub data_width: u64,
    pub addr_width: u64,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn validate(map: &AddressMap, config: &DecoderConfig) -> Result<ValidatedMap, StructuralError> {
    if let Some(idx) = map.find_overflow() {
        return Err(StructuralError::AddressOverflow {
            path: map.path(idx),
        });
    }
    let mut diagnostics = vec![];
    let data_width = resolve_data_width(map, config, &mut diagnostics)?;
    let word = data_width / 8;

    for idx in map.preorder() {
        let node = map.node(idx);
        check_properties(map, idx, &mut diagnostics)?;
        if idx != map.root() {
            check_alignment(map, idx, word)?;
        }
        if node.is_register() {
            check_register(map, idx, data_width)?;
        }
        check_siblings(map, idx)?;
        check_references(map, idx)?;
    }

    let minimum = clog2(map.size()).max(clog2(word) + 1);
    let addr_width = match config.cpuif_address_width.or(map.cpuif_address_width) {
        Some(requested) if requested < minimum => {
            return Err(StructuralError::AddressWidthTooSmall { requested, minimum });
        }
        Some(requested) => requested,
        None => minimum,
    };
    debug!(
        "Validated {}: data width {}, address width {}",
        map.name(),
        data_width,
        addr_width
    );

    Ok(ValidatedMap {
        data_width,
        addr_width,
        diagnostics,
    })
}

fn resolve_data_width(
    map: &AddressMap,
    config: &DecoderConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<u64, StructuralError> {
    let explicit = config.data_width.or(map.data_width);
    let width = match explicit {
        Some(w) => w,
        None => {
            let widest = map
                .preorder()
                .into_iter()
                .map(|i| map.node(i))
                .filter(|n| n.is_register())
                .map(|n| n.access_width)
                .max();
            match widest {
                Some(w) => w,
                None => {
                    diagnostics.push(Diagnostic::warning(
                        map.name(),
                        format!("could not infer the data width; assuming {DEFAULT_DATA_WIDTH}"),
                    ));
                    DEFAULT_DATA_WIDTH
                }
            }
        }
    };
    if width < 8 || !is_pow2(width) {
        return Err(StructuralError::InvalidDataWidth { width });
    }
    Ok(width)
}

fn check_properties(
    map: &AddressMap,
    idx: NodeIdx,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), StructuralError> {
    let node = map.node(idx);
    if node.kind == NodeKind::SubMap
        && node
            .properties
            .get("sharedextbus")
            .is_some_and(|v| !v.is_zero())
    {
        return Err(StructuralError::UnsupportedProperty {
            path: map.path(idx),
            property: "sharedextbus".to_string(),
        });
    }
    if node.cpuif_reset && idx != map.root() {
        diagnostics.push(Diagnostic::warning(
            &map.path(idx),
            "CPU interface reset below the top map is ignored",
        ));
    }
    Ok(())
}

fn check_alignment(map: &AddressMap, idx: NodeIdx, word: u64) -> Result<(), StructuralError> {
    let node = map.node(idx);
    let rel = node.offset - map.node(map.root()).offset;
    if rel % word != 0 {
        return Err(StructuralError::MisalignedAddress {
            path: map.path(idx),
            kind: "offset",
            value: rel,
            alignment: word,
        });
    }
    if !node.is_array() {
        return Ok(());
    }
    let stride = node.stride.unwrap_or(node.size);
    if stride % word != 0 {
        return Err(StructuralError::MisalignedAddress {
            path: map.path(idx),
            kind: "stride",
            value: stride,
            alignment: word,
        });
    }
    if stride < node.size {
        return Err(StructuralError::OverlappingSiblings {
            path: format!("{}[1]", map.path(idx)),
            previous: format!("{}[0]", map.path(idx)),
        });
    }
    Ok(())
}

fn check_register(map: &AddressMap, idx: NodeIdx, data_width: u64) -> Result<(), StructuralError> {
    let node = map.node(idx);
    let reg_width = node.width();
    let access_width = node.access_width;
    if access_width > data_width || (reg_width > access_width && access_width != data_width) {
        return Err(StructuralError::UnsupportedAccessWidth {
            path: map.path(idx),
            reg_width,
            access_width,
            data_width,
        });
    }
    if reg_width <= access_width || access_width == 0 {
        return Ok(());
    }
    for field in node.fields.iter().filter(|f| spans_subwords(f.lsb, f.width, access_width)) {
        let missing = if field.readable && !node.buffer_reads {
            Some("reads")
        } else if field.writable && !node.buffer_writes {
            Some("writes")
        } else {
            None
        };
        if let Some(access) = missing {
            return Err(StructuralError::MissingBuffering {
                path: map.path(idx),
                field: field.name.clone(),
                access,
            });
        }
    }
    Ok(())
}

fn spans_subwords(lsb: u64, width: u64, access_width: u64) -> bool {
    width > 0 && lsb / access_width != lsb.saturating_add(width - 1) / access_width
}

fn check_siblings(map: &AddressMap, idx: NodeIdx) -> Result<(), StructuralError> {
    let mut prev: Option<(NodeIdx, u64)> = None;
    for child in &map.node(idx).children {
        let node = map.node(*child);
        if let Some((prev_idx, prev_end)) = prev {
            if node.offset < prev_end {
                return Err(StructuralError::OverlappingSiblings {
                    path: map.path(*child),
                    previous: map.path(prev_idx),
                });
            }
        }
        prev = Some((*child, node.end().unwrap_or(u64::MAX)));
    }
    Ok(())
}

/// Nearest external node at or above `idx`.
fn external_boundary(map: &AddressMap, idx: NodeIdx) -> Option<NodeIdx> {
    std::iter::once(idx)
        .chain(map.ancestors(idx))
        .find(|i| map.node(*i).external)
}

fn check_references(map: &AddressMap, idx: NodeIdx) -> Result<(), StructuralError> {
    let node: &Node = map.node(idx);
    for r in &node.references {
        let crosses = match map.find(&r.target) {
            None => true,
            Some(target) => {
                let boundary = external_boundary(map, target);
                boundary.is_some() && boundary != external_boundary(map, idx)
            }
        };
        if crosses {
            return Err(StructuralError::CrossBoundaryReference {
                path: map.path(idx),
                property: r.property.clone(),
                target: r.target.clone(),
            });
        }
    }
    Ok(())
}
