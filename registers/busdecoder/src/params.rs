// Licensed under the Apache-2.0 license

//! Parameter classification.
//!
//! An elaborated map only carries final values, so it no longer says which
//! root parameter produced which array size. This module recovers that by
//! re-evaluating every parameter-valued expression in the tree with a
//! [`ResolutionObserver`] installed on the evaluator. Each time a lookup falls
//! through to a root parameter, the observer records the parameter together
//! with the node whose expression asked for it.
//!
//! Parameters whose recorded uses line up with an array dimension become
//! address-modifying: the decoder gates that array with the runtime value of
//! the parameter, bounded by `[0, elaborated]`. Everything else is inert.

use crate::error::{Diagnostic, StructuralError};
use crate::expr::Expr;
use crate::types::{AddressMap, NodeIdx};
use crate::value::Value;
use anyhow::bail;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Notified whenever a lookup resolves to a root parameter.
pub trait ResolutionObserver {
    fn resolved(&mut self, param: &str, assignee: NodeIdx);
}

/// Root parameter name to the nodes whose expressions resolved it.
pub type Provenance = BTreeMap<String, BTreeSet<NodeIdx>>;

/// Evaluates parameter expressions against the scope chain of a map.
///
/// A name is looked up in the bindings of the scope node and its ancestors,
/// then in the root parameter declarations. Resolved bindings are memoized.
pub struct ParamEvaluator<'a> {
    map: &'a AddressMap,
    cache: HashMap<(NodeIdx, String), Value>,
    observer: Option<Box<dyn ResolutionObserver + 'a>>,
}

impl<'a> ParamEvaluator<'a> {
    pub fn new(map: &'a AddressMap) -> Self {
        Self {
            map,
            cache: HashMap::new(),
            observer: None,
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Install `observer` until the returned guard is dropped. The previously
    /// installed observer, if any, is restored on drop.
    pub fn observe<'e>(
        &'e mut self,
        observer: Box<dyn ResolutionObserver + 'a>,
    ) -> ObserverGuard<'e, 'a> {
        let previous = self.observer.replace(observer);
        ObserverGuard {
            evaluator: self,
            previous,
        }
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Resolve `name` as seen from inside `scope`.
    pub fn resolve(&mut self, name: &str, scope: NodeIdx) -> Result<Value, anyhow::Error> {
        self.lookup(name, Some(scope), scope)
    }

    pub fn eval(
        &mut self,
        expr: &Expr,
        scope: Option<NodeIdx>,
        assignee: NodeIdx,
    ) -> Result<Value, anyhow::Error> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Param(name) => self.lookup(name, scope, assignee),
            Expr::Unary(op, operand) => {
                let v = self.eval(operand, scope, assignee)?;
                op.apply(&v)
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs, scope, assignee)?;
                let r = self.eval(rhs, scope, assignee)?;
                op.apply(&l, &r)
            }
        }
    }

    fn lookup(
        &mut self,
        name: &str,
        scope: Option<NodeIdx>,
        assignee: NodeIdx,
    ) -> Result<Value, anyhow::Error> {
        let map = self.map;
        let mut cur = scope;
        while let Some(idx) = cur {
            let node = map.node(idx);
            if let Some(expr) = node.parameter_bindings.get(name) {
                let key = (idx, name.to_string());
                if let Some(v) = self.cache.get(&key) {
                    return Ok(v.clone());
                }
                // bindings are written in the instantiating scope
                let v = self.eval(expr, node.parent, idx)?;
                self.cache.insert(key, v.clone());
                return Ok(v);
            }
            cur = node.parent;
        }
        match map.parameter(name) {
            Some(p) => {
                if let Some(observer) = self.observer.as_mut() {
                    observer.resolved(name, assignee);
                }
                Ok(p.value.clone())
            }
            None => bail!("Unknown parameter {}", name),
        }
    }

    /// Re-evaluate every parameter-valued expression in the map, top-down.
    pub fn reevaluate_all(&mut self) -> Result<(), StructuralError> {
        let map = self.map;
        for idx in map.preorder() {
            let node = map.node(idx);
            let failed = |message: String| StructuralError::Expression {
                path: map.path(idx),
                message,
            };
            for name in node.parameter_bindings.keys() {
                self.lookup(name, Some(idx), idx)
                    .map_err(|e| failed(e.to_string()))?;
            }
            for (i, dim) in node.dimensions.iter().enumerate() {
                let Some(expr) = &dim.expr else {
                    continue;
                };
                // array dimensions are written in the enclosing scope
                let v = self
                    .eval(expr, node.parent, idx)
                    .map_err(|e| failed(e.to_string()))?;
                if v.as_integer() != Some(dim.elaborated) {
                    return Err(failed(format!(
                        "dimension {} `{}` evaluates to {} but was elaborated as {}",
                        i, expr, v, dim.elaborated
                    )));
                }
            }
            for (prop, expr) in &node.property_exprs {
                if let Err(e) = self.eval(expr, Some(idx), idx) {
                    debug!("{}: could not evaluate {}: {}", map.path(idx), prop, e);
                }
            }
        }
        Ok(())
    }
}

/// Keeps an observer installed on a [`ParamEvaluator`].
pub struct ObserverGuard<'e, 'a> {
    evaluator: &'e mut ParamEvaluator<'a>,
    previous: Option<Box<dyn ResolutionObserver + 'a>>,
}

impl<'a> Deref for ObserverGuard<'_, 'a> {
    type Target = ParamEvaluator<'a>;
    fn deref(&self) -> &Self::Target {
        self.evaluator
    }
}

impl DerefMut for ObserverGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.evaluator
    }
}

impl Drop for ObserverGuard<'_, '_> {
    fn drop(&mut self) {
        self.evaluator.observer = self.previous.take();
    }
}

struct Recorder(Rc<RefCell<Provenance>>);

impl ResolutionObserver for Recorder {
    fn resolved(&mut self, param: &str, assignee: NodeIdx) {
        self.0
            .borrow_mut()
            .entry(param.to_string())
            .or_default()
            .insert(assignee);
    }
}

/// Record which nodes resolve each root parameter.
pub fn capture_provenance(map: &AddressMap) -> Result<Provenance, StructuralError> {
    let mut evaluator = ParamEvaluator::new(map);
    let provenance = Rc::new(RefCell::new(Provenance::new()));
    {
        let mut guard = evaluator.observe(Box::new(Recorder(Rc::clone(&provenance))));
        guard.clear_cache();
        guard.reevaluate_all()?;
    }
    Ok(provenance.take())
}

//=============================================================================
// Classification
//=============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Evidence {
    /// The parameter was traced to the array through re-evaluation.
    Provenance,
    /// No expression was kept for the dimension; matched by value alone.
    ValueMatch,
}

/// An array dimension gated by a parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArrayEnable {
    pub node: NodeIdx,
    pub path: String,
    pub dimension_index: usize,
    pub max_elements: u64,
    pub evidence: Evidence,
}

/// An array dimension that more than one parameter could be driving.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContestedArray {
    pub node: NodeIdx,
    pub path: String,
    pub dimension_index: usize,
    pub candidates: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RuntimeBound {
    pub min: u64,
    pub max: u64,
}

impl RuntimeBound {
    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParameterRole {
    AddressModifying {
        arrays: Vec<ArrayEnable>,
        bound: RuntimeBound,
    },
    Inert,
    Ambiguous {
        arrays: Vec<ArrayEnable>,
        contested: Vec<ContestedArray>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub role: ParameterRole,
}

impl Parameter {
    pub fn is_address_modifying(&self) -> bool {
        matches!(self.role, ParameterRole::AddressModifying { .. })
    }
}

/// Role of every root parameter, in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    pub parameters: Vec<Parameter>,
}

impl Classification {
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn address_modifying(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_address_modifying())
    }

    pub fn ambiguous(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| matches!(p.role, ParameterRole::Ambiguous { .. }))
    }

    /// True when no parameter influences the address map.
    pub fn is_static(&self) -> bool {
        self.address_modifying().next().is_none()
    }

    /// Name of the parameter gating dimension `dim` of `node`.
    pub fn enable_for(&self, node: NodeIdx, dim: usize) -> Option<&str> {
        self.address_modifying()
            .find(|p| match &p.role {
                ParameterRole::AddressModifying { arrays, .. } => arrays
                    .iter()
                    .any(|a| a.node == node && a.dimension_index == dim),
                _ => false,
            })
            .map(|p| p.name.as_str())
    }

    /// Fail on the first ambiguous parameter.
    pub fn require_unambiguous(&self) -> Result<(), StructuralError> {
        for p in self.ambiguous() {
            if let ParameterRole::Ambiguous { contested, .. } = &p.role {
                if let Some(c) = contested.first() {
                    return Err(StructuralError::AmbiguousParameterClassification {
                        parameter: p.name.clone(),
                        path: c.path.clone(),
                        candidates: c.candidates.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Demote ambiguous parameters to inert, reporting each one.
    pub fn demote_ambiguous(&mut self) -> Vec<Diagnostic> {
        let mut diagnostics = vec![];
        for p in self.parameters.iter_mut() {
            if let ParameterRole::Ambiguous { contested, .. } = &p.role {
                let paths: Vec<_> = contested.iter().map(|c| c.path.as_str()).collect();
                diagnostics.push(Diagnostic::warning(
                    &p.name,
                    format!(
                        "ambiguously sizes {}; treating parameter as inert",
                        paths.join(", ")
                    ),
                ));
                p.role = ParameterRole::Inert;
            }
        }
        diagnostics
    }
}

/// Classify every root parameter of `map`.
pub fn classify(map: &AddressMap) -> Result<Classification, StructuralError> {
    let provenance = capture_provenance(map)?;

    let mut claims: BTreeMap<&str, Vec<ArrayEnable>> = BTreeMap::new();
    let mut contests: BTreeMap<&str, Vec<ContestedArray>> = BTreeMap::new();

    for idx in map.preorder() {
        let node = map.node(idx);
        for (dim_idx, dim) in node.dimensions.iter().enumerate() {
            let (candidates, evidence) = match &dim.expr {
                // literal dimensions are never driven by a parameter
                Some(expr) if expr.param_refs().is_empty() => continue,
                Some(_) => {
                    let traced: Vec<&str> = map
                        .parameters
                        .iter()
                        .filter(|p| p.value.as_integer() == Some(dim.elaborated))
                        .filter(|p| {
                            provenance.get(&p.name).is_some_and(|nodes| {
                                nodes.iter().any(|t| {
                                    map.is_ancestor_or_self(*t, idx)
                                        || map.is_ancestor_or_self(idx, *t)
                                })
                            })
                        })
                        .map(|p| p.name.as_str())
                        .collect();
                    (traced, Evidence::Provenance)
                }
                None => {
                    let matched: Vec<&str> = map
                        .parameters
                        .iter()
                        .filter(|p| p.value.as_integer() == Some(dim.elaborated))
                        .map(|p| p.name.as_str())
                        .collect();
                    (matched, Evidence::ValueMatch)
                }
            };
            match candidates.as_slice() {
                [] => {}
                [name] => {
                    debug!(
                        "{} dimension {} driven by {} ({:?})",
                        map.path(idx),
                        dim_idx,
                        name,
                        evidence
                    );
                    claims.entry(*name).or_default().push(ArrayEnable {
                        node: idx,
                        path: map.path(idx),
                        dimension_index: dim_idx,
                        max_elements: dim.elaborated,
                        evidence,
                    });
                }
                _ => {
                    for name in &candidates {
                        contests.entry(*name).or_default().push(ContestedArray {
                            node: idx,
                            path: map.path(idx),
                            dimension_index: dim_idx,
                            candidates: candidates.iter().map(|c| c.to_string()).collect(),
                        });
                    }
                }
            }
        }
    }

    let parameters = map
        .parameters
        .iter()
        .map(|p| {
            let arrays = claims.remove(p.name.as_str()).unwrap_or_default();
            let contested = contests.remove(p.name.as_str()).unwrap_or_default();
            let role = match (p.value.as_integer(), arrays.is_empty(), contested.is_empty()) {
                (None, _, _) => ParameterRole::Inert,
                (Some(_), _, false) => ParameterRole::Ambiguous { arrays, contested },
                (Some(_), true, true) => ParameterRole::Inert,
                (Some(max), false, true) => ParameterRole::AddressModifying {
                    arrays,
                    bound: RuntimeBound { min: 0, max },
                },
            };
            Parameter {
                name: p.name.clone(),
                value: p.value.clone(),
                role,
            }
        })
        .collect();

    let classification = Classification { parameters };
    info!(
        "{}: {} address-modifying parameter(s)",
        map.name(),
        classification.address_modifying().count()
    );
    Ok(classification)
}

//=============================================================================
// Runtime values
//=============================================================================

/// Runtime values of the address-modifying parameters.
///
/// Every parameter starts at its elaborated maximum.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeParams {
    values: BTreeMap<String, u64>,
    bounds: BTreeMap<String, RuntimeBound>,
}

impl RuntimeParams {
    pub fn new(classification: &Classification) -> Self {
        let mut params = Self::default();
        for p in classification.address_modifying() {
            if let ParameterRole::AddressModifying { bound, .. } = &p.role {
                params.values.insert(p.name.clone(), bound.max);
                params.bounds.insert(p.name.clone(), *bound);
            }
        }
        params
    }

    pub fn set(&mut self, name: &str, value: u64) -> Result<(), StructuralError> {
        let bound = self
            .bounds
            .get(name)
            .ok_or_else(|| StructuralError::UnknownParameter {
                name: name.to_string(),
            })?;
        if !bound.contains(value) {
            return Err(StructuralError::ParameterOutOfBounds {
                name: name.to_string(),
                value,
                max: bound.max,
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn with(mut self, name: &str, value: u64) -> Result<Self, StructuralError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::types::{AddressMapBuilder, Dimension};

    fn ports_map(n: u64) -> AddressMap {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("N_PORTS", n).parameter("UNUSED", 3u64);
        let root = b.root();
        let r = b.add_register(root, "ports", 0, 4);
        b.make_array(r, vec![Dimension::param(n, "N_PORTS")], None);
        b.build()
    }

    struct Counter(Rc<RefCell<usize>>);

    impl ResolutionObserver for Counter {
        fn resolved(&mut self, _param: &str, _assignee: NodeIdx) {
            *self.0.borrow_mut() += 1;
        }
    }

    #[test]
    fn test_direct_dimension_is_address_modifying() {
        let map = ports_map(8);
        let c = classify(&map).unwrap();
        let p = c.get("N_PORTS").unwrap();
        match &p.role {
            ParameterRole::AddressModifying { arrays, bound } => {
                assert_eq!(*bound, RuntimeBound { min: 0, max: 8 });
                assert_eq!(arrays.len(), 1);
                assert_eq!(arrays[0].path, "top.ports");
                assert_eq!(arrays[0].max_elements, 8);
                assert_eq!(arrays[0].evidence, Evidence::Provenance);
            }
            role => panic!("unexpected role {:?}", role),
        }
        assert_eq!(c.get("UNUSED").unwrap().role, ParameterRole::Inert);
        assert_eq!(c.enable_for(1, 0), Some("N_PORTS"));
        assert!(!c.is_static());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let map = ports_map(8);
        assert_eq!(classify(&map).unwrap(), classify(&map).unwrap());
    }

    #[test]
    fn test_binding_through_ancestor() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("N_CH", 6u64);
        let root = b.root();
        let blk = b.add_submap(root, "blk", 0, 0);
        b.bind(blk, "N", Expr::param("N_CH"));
        let r = b.add_register(blk, "ch", 0, 4);
        b.make_array(r, vec![Dimension::param(6, "N")], None);
        let map = b.build();

        let provenance = capture_provenance(&map).unwrap();
        assert_eq!(provenance["N_CH"], BTreeSet::from([blk]));
        let c = classify(&map).unwrap();
        assert_eq!(c.enable_for(r, 0), Some("N_CH"));
    }

    #[test]
    fn test_scaled_dimension_is_not_claimed() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("N", 4u64);
        let root = b.root();
        let r = b.add_register(root, "regs", 0, 4);
        let expr = Expr::binary(BinaryOp::Mul, Expr::param("N"), Expr::literal(2u64));
        b.make_array(r, vec![Dimension::from_expr(8, expr)], None);
        let c = classify(&b.build()).unwrap();
        assert!(c.is_static());
    }

    #[test]
    fn test_literal_dimension_is_static() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("N", 4u64);
        let root = b.root();
        let r = b.add_register(root, "regs", 0, 4);
        b.make_array(r, vec![Dimension::literal(4)], None);
        let c = classify(&b.build()).unwrap();
        assert!(c.is_static());
    }

    #[test]
    fn test_value_match_fallback() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("N", 4u64).parameter("MODE", "fast");
        let root = b.root();
        let r = b.add_register(root, "regs", 0, 4);
        b.make_array(r, vec![Dimension::elaborated(4)], None);
        let c = classify(&b.build()).unwrap();
        match &c.get("N").unwrap().role {
            ParameterRole::AddressModifying { arrays, .. } => {
                assert_eq!(arrays[0].evidence, Evidence::ValueMatch)
            }
            role => panic!("unexpected role {:?}", role),
        }
        assert_eq!(c.get("MODE").unwrap().role, ParameterRole::Inert);
    }

    #[test]
    fn test_equal_values_are_ambiguous() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("A", 4u64).parameter("B", 4u64);
        let root = b.root();
        let r = b.add_register(root, "regs", 0, 4);
        b.make_array(r, vec![Dimension::elaborated(4)], None);
        let mut c = classify(&b.build()).unwrap();
        assert_eq!(c.ambiguous().count(), 2);
        let err = c.require_unambiguous().unwrap_err();
        assert_eq!(
            err,
            StructuralError::AmbiguousParameterClassification {
                parameter: "A".into(),
                path: "top.regs".into(),
                candidates: vec!["A".into(), "B".into()],
            }
        );
        let diagnostics = c.demote_ambiguous();
        assert_eq!(diagnostics.len(), 2);
        assert!(c.is_static());
        assert!(c.require_unambiguous().is_ok());
    }

    #[test]
    fn test_inconsistent_dimension_rejected() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("N", 4u64);
        let root = b.root();
        let r = b.add_register(root, "regs", 0, 4);
        b.make_array(r, vec![Dimension::param(5, "N")], None);
        let err = classify(&b.build()).unwrap_err();
        assert!(matches!(err, StructuralError::Expression { .. }));
    }

    #[test]
    fn test_observer_restored_after_failure() {
        let mut b = AddressMapBuilder::new("top");
        let root = b.root();
        let r = b.add_register(root, "regs", 0, 4);
        b.make_array(r, vec![Dimension::param(4, "MISSING")], None);
        let map = b.build();

        let count = Rc::new(RefCell::new(0));
        let mut evaluator = ParamEvaluator::new(&map);
        assert!(!evaluator.has_observer());
        {
            let mut guard = evaluator.observe(Box::new(Counter(Rc::clone(&count))));
            assert!(guard.has_observer());
            assert!(guard.reevaluate_all().is_err());
        }
        assert!(!evaluator.has_observer());
    }

    #[test]
    fn test_nested_observers() {
        let map = ports_map(4);
        let outer = Rc::new(RefCell::new(0));
        let inner = Rc::new(RefCell::new(0));
        let mut evaluator = ParamEvaluator::new(&map);
        let mut guard = evaluator.observe(Box::new(Counter(Rc::clone(&outer))));
        {
            let mut nested = guard.observe(Box::new(Counter(Rc::clone(&inner))));
            nested.resolve("N_PORTS", 0).unwrap();
        }
        guard.resolve("N_PORTS", 0).unwrap();
        drop(guard);
        assert_eq!(*inner.borrow(), 1);
        assert_eq!(*outer.borrow(), 1);
    }

    #[test]
    fn test_runtime_params_bounds() {
        let c = classify(&ports_map(8)).unwrap();
        let mut rt = RuntimeParams::new(&c);
        assert_eq!(rt.get("N_PORTS"), Some(8));
        rt.set("N_PORTS", 0).unwrap();
        assert_eq!(rt.get("N_PORTS"), Some(0));
        assert!(matches!(
            rt.set("N_PORTS", 9),
            Err(StructuralError::ParameterOutOfBounds { max: 8, .. })
        ));
        assert!(matches!(
            rt.set("UNUSED", 1),
            Err(StructuralError::UnknownParameter { .. })
        ));
    }
}
