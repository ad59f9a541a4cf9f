//! Type hierarchies for nodes and edges.
//!
//! Types are opaque small integers. A hierarchy is built once from
//! `(type, parents)` declarations and then answers "is A a subtype of B"
//! with a single lookup into a flattened matrix.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AttributeMap, Value};
use crate::{Error, Result};

/// Opaque type identifier. Index into its hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u16);

impl TypeId {
    /// The root type every hierarchy starts with.
    pub const ROOT: TypeId = TypeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// TypeHierarchy
// ============================================================================

/// A closed, precomputed type hierarchy (multiple inheritance allowed).
#[derive(Debug, Clone)]
pub struct TypeHierarchy {
    names: Vec<String>,
    parents: Vec<Vec<TypeId>>,
    /// Row-major `len * len`; `is_a[sub * len + sup]`.
    is_a: Vec<bool>,
    /// Attribute defaults per type, already merged with inherited ones.
    defaults: Vec<AttributeMap>,
}

impl TypeHierarchy {
    pub fn builder(root_name: impl Into<String>) -> TypeHierarchyBuilder {
        TypeHierarchyBuilder::new(root_name)
    }

    /// Build from `(type, parent)` pairs. Types are numbered densely from 1;
    /// type 0 is the implicit root. Each type's parents must have smaller ids.
    pub fn from_pairs(pairs: &[(TypeId, TypeId)]) -> Result<Self> {
        let count = pairs.iter().map(|(t, _)| t.index()).max().map_or(1, |m| m + 1);
        let mut parents: Vec<Vec<TypeId>> = vec![Vec::new(); count];
        for &(ty, parent) in pairs {
            if ty == TypeId::ROOT || parent.index() >= ty.index() {
                return Err(Error::UnknownType(format!(
                    "type {ty} cannot derive from {parent}"
                )));
            }
            parents[ty.index()].push(parent);
        }
        let mut builder = TypeHierarchyBuilder::new("Root");
        for (i, ps) in parents.iter().enumerate().skip(1) {
            let ps = if ps.is_empty() { vec![TypeId::ROOT] } else { ps.clone() };
            builder.add_type(format!("Type{i}"), &ps)?;
        }
        Ok(builder.build())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, ty: TypeId) -> bool {
        ty.index() < self.len()
    }

    pub fn name(&self, ty: TypeId) -> Option<&str> {
        self.names.get(ty.index()).map(String::as_str)
    }

    /// Name for messages; unknown ids render as their number.
    pub fn describe(&self, ty: TypeId) -> String {
        self.name(ty).map_or_else(|| ty.to_string(), str::to_owned)
    }

    pub fn by_name(&self, name: &str) -> Option<TypeId> {
        self.names.iter().position(|n| n == name).map(|i| TypeId(i as u16))
    }

    pub fn parents(&self, ty: TypeId) -> &[TypeId] {
        self.parents.get(ty.index()).map_or(&[], Vec::as_slice)
    }

    /// `sub` equals `sup` or derives from it. Unknown ids are never related.
    pub fn is_a(&self, sub: TypeId, sup: TypeId) -> bool {
        let n = self.len();
        sub.index() < n && sup.index() < n && self.is_a[sub.index() * n + sup.index()]
    }

    /// `ty` and every type deriving from it, in id order.
    pub fn subtypes_of(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.len())
            .map(|i| TypeId(i as u16))
            .filter(move |&t| self.is_a(t, ty))
    }

    pub fn defaults(&self, ty: TypeId) -> Option<&AttributeMap> {
        self.defaults.get(ty.index())
    }

    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.len()).map(|i| TypeId(i as u16))
    }
}

/// Incremental construction of a `TypeHierarchy`.
#[derive(Debug, Clone)]
pub struct TypeHierarchyBuilder {
    names: Vec<String>,
    parents: Vec<Vec<TypeId>>,
    own_defaults: Vec<AttributeMap>,
}

impl TypeHierarchyBuilder {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            names: vec![root_name.into()],
            parents: vec![Vec::new()],
            own_defaults: vec![AttributeMap::new()],
        }
    }

    /// Declare a type deriving from `parents` (all already declared).
    pub fn add_type(&mut self, name: impl Into<String>, parents: &[TypeId]) -> Result<TypeId> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(Error::UnknownType(format!("type '{name}' declared twice")));
        }
        if let Some(bad) = parents.iter().find(|p| p.index() >= self.names.len()) {
            return Err(Error::UnknownType(format!("parent {bad} of '{name}'")));
        }
        if self.names.len() > u16::MAX as usize {
            return Err(Error::UnknownType(format!("too many types declaring '{name}'")));
        }
        let id = TypeId(self.names.len() as u16);
        self.names.push(name);
        self.parents.push(parents.to_vec());
        self.own_defaults.push(AttributeMap::new());
        Ok(id)
    }

    /// Default attribute value installed on elements created with `ty`
    /// (and with any subtype of it).
    pub fn default_attribute(
        &mut self,
        ty: TypeId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let slot = self
            .own_defaults
            .get_mut(ty.index())
            .ok_or_else(|| Error::UnknownType(ty.to_string()))?;
        slot.insert(key.into(), value.into());
        Ok(self)
    }

    pub fn build(self) -> TypeHierarchy {
        let n = self.names.len();
        let mut is_a = vec![false; n * n];
        let mut defaults: Vec<AttributeMap> = Vec::with_capacity(n);
        // Parents always precede their children, so one forward pass suffices.
        for t in 0..n {
            is_a[t * n + t] = true;
            let mut merged = AttributeMap::new();
            for p in &self.parents[t] {
                let p = p.index();
                for sup in 0..n {
                    if is_a[p * n + sup] {
                        is_a[t * n + sup] = true;
                    }
                }
                merged.extend(defaults[p].iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            merged.extend(self.own_defaults[t].iter().map(|(k, v)| (k.clone(), v.clone())));
            defaults.push(merged);
        }
        TypeHierarchy {
            names: self.names,
            parents: self.parents,
            is_a,
            defaults,
        }
    }
}

// ============================================================================
// TypeModel
// ============================================================================

/// The node and edge hierarchies a graph and its rules agree on.
#[derive(Debug, Clone)]
pub struct TypeModel {
    pub nodes: TypeHierarchy,
    pub edges: TypeHierarchy,
}

impl TypeModel {
    pub fn new(nodes: TypeHierarchy, edges: TypeHierarchy) -> Self {
        Self { nodes, edges }
    }

    /// Only the two root types `Node` and `Edge`.
    pub fn untyped() -> Self {
        Self {
            nodes: TypeHierarchyBuilder::new("Node").build(),
            edges: TypeHierarchyBuilder::new("Edge").build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animals() -> (TypeHierarchy, TypeId, TypeId, TypeId) {
        let mut b = TypeHierarchy::builder("Node");
        let animal = b.add_type("Animal", &[TypeId::ROOT]).unwrap();
        let cat = b.add_type("Cat", &[animal]).unwrap();
        let rock = b.add_type("Rock", &[TypeId::ROOT]).unwrap();
        b.default_attribute(animal, "legs", 4).unwrap();
        b.default_attribute(cat, "lives", 9).unwrap();
        (b.build(), animal, cat, rock)
    }

    #[test]
    fn test_is_a_is_reflexive_and_transitive() {
        let (h, animal, cat, rock) = animals();
        assert!(h.is_a(cat, cat));
        assert!(h.is_a(cat, animal));
        assert!(h.is_a(cat, TypeId::ROOT));
        assert!(!h.is_a(animal, cat));
        assert!(!h.is_a(rock, animal));
        assert!(!h.is_a(TypeId(99), TypeId::ROOT));
    }

    #[test]
    fn test_subtypes_of() {
        let (h, animal, cat, _) = animals();
        assert_eq!(h.subtypes_of(animal).collect::<Vec<_>>(), vec![animal, cat]);
        assert_eq!(h.subtypes_of(TypeId::ROOT).count(), 4);
    }

    #[test]
    fn test_defaults_are_inherited() {
        let (h, _, cat, rock) = animals();
        let d = h.defaults(cat).unwrap();
        assert_eq!(d.get("legs"), Some(&Value::Int(4)));
        assert_eq!(d.get("lives"), Some(&Value::Int(9)));
        assert!(h.defaults(rock).unwrap().is_empty());
    }

    #[test]
    fn test_multiple_inheritance() {
        let mut b = TypeHierarchy::builder("Node");
        let a = b.add_type("A", &[TypeId::ROOT]).unwrap();
        let bb = b.add_type("B", &[TypeId::ROOT]).unwrap();
        let ab = b.add_type("AB", &[a, bb]).unwrap();
        let h = b.build();
        assert!(h.is_a(ab, a));
        assert!(h.is_a(ab, bb));
        assert_eq!(h.parents(ab), &[a, bb]);
    }

    #[test]
    fn test_from_pairs() {
        let h = TypeHierarchy::from_pairs(&[(TypeId(1), TypeId(0)), (TypeId(2), TypeId(1))]).unwrap();
        assert_eq!(h.len(), 3);
        assert!(h.is_a(TypeId(2), TypeId(1)));
        assert!(TypeHierarchy::from_pairs(&[(TypeId(1), TypeId(2))]).is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_parent() {
        let mut b = TypeHierarchy::builder("Node");
        b.add_type("A", &[TypeId::ROOT]).unwrap();
        assert!(matches!(b.add_type("A", &[TypeId::ROOT]), Err(Error::UnknownType(_))));
        assert!(matches!(b.add_type("B", &[TypeId(7)]), Err(Error::UnknownType(_))));
    }
}
