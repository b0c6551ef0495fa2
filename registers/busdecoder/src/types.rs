// Licensed under the Apache-2.0 license

//! Elaborated address-map model.
//!
//! The map is an immutable tree of addressable nodes stored in an arena and
//! referenced by index. It is produced once, either programmatically through
//! [`AddressMapBuilder`] or from a TOML [`MapDescription`], and is read-only
//! afterwards.
//!
//! ```text
//! AddressMap
//! ├── nodes: Vec<Node>          # arena, root at index 0
//! │   ├── Register              # leaf, optionally an array
//! │   └── SubMap                # container, optionally an array
//! ├── parameters                # root parameter declarations
//! └── data_width / cpuif_address_width
//! ```
//!
//! All offsets are absolute byte addresses. For arrays, the offset and the
//! offsets of every descendant describe element zero.

use crate::expr::Expr;
use crate::value::Value;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Index into the node arena.
pub type NodeIdx = usize;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Register,
    #[serde(alias = "addrmap", alias = "regfile")]
    SubMap,
}

/// One array dimension: the elaborated element count and, when the count was
/// computed from parameters, the expression it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Dimension {
    pub elaborated: u64,
    pub expr: Option<Expr>,
}

impl Dimension {
    /// A literal dimension written directly in the source.
    pub fn literal(n: u64) -> Self {
        Self {
            elaborated: n,
            expr: Some(Expr::literal(n)),
        }
    }

    /// A dimension driven by the named parameter.
    pub fn param(n: u64, name: &str) -> Self {
        Self {
            elaborated: n,
            expr: Some(Expr::param(name)),
        }
    }

    pub fn from_expr(n: u64, expr: Expr) -> Self {
        Self {
            elaborated: n,
            expr: Some(expr),
        }
    }

    /// A dimension whose source expression was not retained.
    pub fn elaborated(n: u64) -> Self {
        Self {
            elaborated: n,
            expr: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Field {
    pub name: String,
    pub lsb: u64,
    pub width: u64,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

/// A property whose value refers to another node by full path.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct PropertyRef {
    pub property: String,
    pub target: String,
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeIdx>,
    /// Absolute byte address of element zero.
    pub offset: u64,
    /// Bytes occupied by one element.
    pub size: u64,
    /// Bus access width in bits. Registers only.
    pub access_width: u64,
    /// Stride of the fastest-changing dimension. Defaults to `size`.
    pub stride: Option<u64>,
    pub dimensions: Vec<Dimension>,
    pub children: Vec<NodeIdx>,
    /// Instance parameter overrides that depended on a parameter.
    pub parameter_bindings: BTreeMap<String, Expr>,
    /// Parameter-valued property expressions (reset values and the like).
    pub property_exprs: BTreeMap<String, Expr>,
    pub fields: Vec<Field>,
    pub buffer_reads: bool,
    pub buffer_writes: bool,
    pub external: bool,
    pub cpuif_reset: bool,
    pub properties: BTreeMap<String, Value>,
    pub references: Vec<PropertyRef>,
}

impl Node {
    pub fn is_array(&self) -> bool {
        !self.dimensions.is_empty()
    }

    pub fn is_register(&self) -> bool {
        self.kind == NodeKind::Register
    }

    /// Register width in bits.
    pub fn width(&self) -> u64 {
        self.size.saturating_mul(8)
    }

    /// Total element count, or `None` if it does not fit in 64 bits.
    pub fn n_elements(&self) -> Option<u64> {
        self.dimensions
            .iter()
            .try_fold(1u64, |n, d| n.checked_mul(d.elaborated))
    }

    /// Byte stride of each dimension, slowest-changing first.
    pub fn dim_strides(&self) -> Option<Vec<u64>> {
        let mut strides = vec![0; self.dimensions.len()];
        let mut stride = self.stride.unwrap_or(self.size);
        for i in (0..self.dimensions.len()).rev() {
            strides[i] = stride;
            if i > 0 {
                stride = stride.checked_mul(self.dimensions[i].elaborated)?;
            }
        }
        Some(strides)
    }

    /// Bytes spanned by all elements, from element zero to the end of the
    /// last. `None` when the span does not fit in 64 bits.
    pub fn aperture_size(&self) -> Option<u64> {
        if !self.is_array() {
            return Some(self.size);
        }
        if self.n_elements()? == 0 {
            return Some(0);
        }
        let strides = self.dim_strides()?;
        self.dimensions
            .iter()
            .zip(strides)
            .try_fold(self.size, |span, (d, s)| {
                (d.elaborated - 1).checked_mul(s)?.checked_add(span)
            })
    }

    /// First byte past the last element, if addressable.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.aperture_size()?)
    }
}

/// A parameter declared on the root map.
#[derive(Clone, Debug, PartialEq)]
pub struct RootParameter {
    pub name: String,
    pub value: Value,
}

/// An elaborated, immutable address map.
#[derive(Clone, Debug)]
pub struct AddressMap {
    nodes: Vec<Node>,
    pub data_width: Option<u64>,
    pub cpuif_address_width: Option<u64>,
    pub parameters: Vec<RootParameter>,
}

impl AddressMap {
    pub fn root(&self) -> NodeIdx {
        0
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.nodes[0].name
    }

    /// Bytes spanned by the whole map.
    pub fn size(&self) -> u64 {
        self.nodes[0].size
    }

    /// First node, in preorder, whose address range runs past the end of the
    /// 64-bit address space.
    pub fn find_overflow(&self) -> Option<NodeIdx> {
        self.preorder()
            .into_iter()
            .find(|i| self.nodes[*i].end().is_none())
    }

    /// Full dotted path of a node, including the root name.
    pub fn path(&self, idx: NodeIdx) -> String {
        let mut parts = vec![self.nodes[idx].name.as_str()];
        let mut cur = self.nodes[idx].parent;
        while let Some(p) = cur {
            parts.push(&self.nodes[p].name);
            cur = self.nodes[p].parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Dotted path relative to the root.
    pub fn rel_path(&self, idx: NodeIdx) -> String {
        let full = self.path(idx);
        match full.split_once('.') {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        }
    }

    /// Look up a node by its full dotted path.
    pub fn find(&self, path: &str) -> Option<NodeIdx> {
        let mut parts = path.split('.');
        if parts.next()? != self.name() {
            return None;
        }
        let mut cur = self.root();
        for part in parts {
            cur = *self.nodes[cur]
                .children
                .iter()
                .find(|c| self.nodes[**c].name == part)?;
        }
        Some(cur)
    }

    /// All nodes in pre-order (declaration order).
    pub fn preorder(&self) -> Vec<NodeIdx> {
        let mut order = vec![];
        let mut stack = vec![self.root()];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev());
        }
        order
    }

    /// Strict ancestors of a node, nearest first.
    pub fn ancestors(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut result = vec![];
        let mut cur = self.nodes[idx].parent;
        while let Some(p) = cur {
            result.push(p);
            cur = self.nodes[p].parent;
        }
        result
    }

    /// True if `a` is `b` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, a: NodeIdx, b: NodeIdx) -> bool {
        a == b || self.ancestors(b).contains(&a)
    }

    pub fn parameter(&self, name: &str) -> Option<&RootParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Load an address map from a TOML description file.
    pub fn from_file(path: &Path) -> Result<AddressMap, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<AddressMap, anyhow::Error> {
        let desc: MapDescription = toml::from_str(text)?;
        Self::from_description(&desc)
    }

    pub fn from_description(desc: &MapDescription) -> Result<AddressMap, anyhow::Error> {
        let mut builder = AddressMapBuilder::new(&desc.name);
        if let Some(w) = desc.data_width {
            builder.data_width(w);
        }
        if let Some(w) = desc.cpuif_address_width {
            builder.cpuif_address_width(w);
        }
        for p in &desc.parameters {
            builder.parameter(&p.name, p.value.clone());
        }
        let root = builder.root();
        for child in &desc.children {
            add_described(&mut builder, root, child)?;
        }
        let map = builder.build();
        if let Some(idx) = map.find_overflow() {
            bail!("{}: address range exceeds the 64-bit address space", map.path(idx));
        }
        Ok(map)
    }
}

fn add_described(
    builder: &mut AddressMapBuilder,
    parent: NodeIdx,
    desc: &NodeDesc,
) -> Result<(), anyhow::Error> {
    let idx = match desc.kind {
        NodeKind::Register => {
            if !desc.children.is_empty() {
                bail!("Register {} cannot have children", desc.name);
            }
            let size = desc
                .size
                .or(desc.access_width.map(|w| w / 8))
                .unwrap_or(4);
            builder.add_register(parent, &desc.name, desc.offset, size)
        }
        NodeKind::SubMap => {
            builder.add_submap(parent, &desc.name, desc.offset, desc.size.unwrap_or(0))
        }
    };
    {
        let node = builder.node_mut(idx);
        if let Some(w) = desc.access_width {
            node.access_width = w;
        }
        node.parameter_bindings = desc.parameters.clone();
        node.property_exprs = desc.property_exprs.clone();
        node.fields = desc.fields.clone();
        node.buffer_reads = desc.buffer_reads;
        node.buffer_writes = desc.buffer_writes;
        node.external = desc.external;
        node.cpuif_reset = desc.cpuif_reset;
        node.properties = desc.properties.clone();
        node.references = desc.references.clone();
    }
    if !desc.dimensions.is_empty() {
        let dims = desc.dimensions.iter().map(DimDesc::to_dimension).collect();
        builder.make_array(idx, dims, desc.stride);
    }
    for child in &desc.children {
        add_described(builder, idx, child)?;
    }
    Ok(())
}

//=============================================================================
// Builder
//=============================================================================

/// Incrementally constructs an [`AddressMap`].
///
/// Offsets passed to the builder are relative to the parent node; they are
/// stored as absolute addresses.
pub struct AddressMapBuilder {
    nodes: Vec<Node>,
    data_width: Option<u64>,
    cpuif_address_width: Option<u64>,
    parameters: Vec<RootParameter>,
}

impl AddressMapBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            nodes: vec![Node {
                name: name.to_string(),
                kind: NodeKind::SubMap,
                ..Default::default()
            }],
            data_width: None,
            cpuif_address_width: None,
            parameters: vec![],
        }
    }

    pub fn root(&self) -> NodeIdx {
        0
    }

    fn add_node(&mut self, parent: NodeIdx, mut node: Node, rel_offset: u64) -> NodeIdx {
        node.parent = Some(parent);
        node.offset = self.nodes[parent].offset.saturating_add(rel_offset);
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Add a register of `size` bytes. Its access width defaults to its width.
    pub fn add_register(
        &mut self,
        parent: NodeIdx,
        name: &str,
        rel_offset: u64,
        size: u64,
    ) -> NodeIdx {
        let node = Node {
            name: name.to_string(),
            kind: NodeKind::Register,
            size,
            access_width: size.saturating_mul(8),
            ..Default::default()
        };
        self.add_node(parent, node, rel_offset)
    }

    /// Add a sub-map. A `size` of zero is computed from the children on build.
    pub fn add_submap(
        &mut self,
        parent: NodeIdx,
        name: &str,
        rel_offset: u64,
        size: u64,
    ) -> NodeIdx {
        let node = Node {
            name: name.to_string(),
            kind: NodeKind::SubMap,
            size,
            ..Default::default()
        };
        self.add_node(parent, node, rel_offset)
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx]
    }

    /// Turn a node into an array. `stride` defaults to the element size.
    pub fn make_array(
        &mut self,
        idx: NodeIdx,
        dims: Vec<Dimension>,
        stride: Option<u64>,
    ) -> &mut Self {
        let node = &mut self.nodes[idx];
        node.dimensions = dims;
        node.stride = stride;
        self
    }

    /// Record that instantiating `idx` bound its parameter `name` to `expr`.
    pub fn bind(&mut self, idx: NodeIdx, name: &str, expr: Expr) -> &mut Self {
        self.nodes[idx]
            .parameter_bindings
            .insert(name.to_string(), expr);
        self
    }

    pub fn parameter(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.parameters.push(RootParameter {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn data_width(&mut self, width: u64) -> &mut Self {
        self.data_width = Some(width);
        self
    }

    pub fn cpuif_address_width(&mut self, width: u64) -> &mut Self {
        self.cpuif_address_width = Some(width);
        self
    }

    pub fn build(mut self) -> AddressMap {
        // children always follow their parent in the arena
        for idx in (0..self.nodes.len()).rev() {
            if self.nodes[idx].kind != NodeKind::SubMap || self.nodes[idx].size != 0 {
                continue;
            }
            let base = self.nodes[idx].offset;
            let end = self.nodes[idx]
                .children
                .iter()
                .map(|c| self.nodes[*c].end().unwrap_or(u64::MAX))
                .max()
                .unwrap_or(base);
            self.nodes[idx].size = end.saturating_sub(base);
        }
        AddressMap {
            nodes: self.nodes,
            data_width: self.data_width,
            cpuif_address_width: self.cpuif_address_width,
            parameters: self.parameters,
        }
    }
}

//=============================================================================
// TOML description
//=============================================================================

/// Serialized form of an elaborated map, as handed over by the front end.
///
/// ```toml
/// name = "top"
/// data_width = 32
///
/// [[parameters]]
/// name = "N_PORTS"
/// value = 8
///
/// [[children]]
/// name = "ports"
/// offset = 0x0
/// size = 4
/// dimensions = [{ value = 8, expr = "N_PORTS" }]
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct MapDescription {
    pub name: String,
    #[serde(default)]
    pub data_width: Option<u64>,
    #[serde(default)]
    pub cpuif_address_width: Option<u64>,
    #[serde(default)]
    pub parameters: Vec<ParameterDesc>,
    #[serde(default)]
    pub children: Vec<NodeDesc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ParameterDesc {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    /// Relative to the parent.
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub access_width: Option<u64>,
    #[serde(default)]
    pub stride: Option<u64>,
    #[serde(default)]
    pub dimensions: Vec<DimDesc>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Expr>,
    #[serde(default)]
    pub property_exprs: BTreeMap<String, Expr>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub buffer_reads: bool,
    #[serde(default)]
    pub buffer_writes: bool,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub cpuif_reset: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub references: Vec<PropertyRef>,
    #[serde(default)]
    pub children: Vec<NodeDesc>,
}

/// A dimension is either a bare count or a count with its source expression.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum DimDesc {
    Count(u64),
    WithExpr {
        value: u64,
        #[serde(default)]
        expr: Option<Expr>,
    },
}

impl DimDesc {
    fn to_dimension(&self) -> Dimension {
        match self {
            DimDesc::Count(n) => Dimension::literal(*n),
            DimDesc::WithExpr { value, expr } => Dimension {
                elaborated: *value,
                expr: expr.clone(),
            },
        }
    }
}
