//! Object descriptions
//!
//! An [`ObjectDescription`] is the compile-time layout record of one class,
//! interface or object literal: an ordered slot array of members, the base
//! description it extends, and the shapes derived from it.

use std::fmt;

use crate::error::{SemanticError, SemanticResult};
use crate::nodes::FuncId;
use crate::object_model::ShapeId;
use crate::types::ValueTypeId;

/// Unique identifier for an object description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescId(pub(crate) u32);

impl DescId {
    /// Create a description id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DescId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "desc{}", self.0)
    }
}

/// What a description lays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptionKind {
    /// Object literal
    Literal,
    /// Interface (structural type)
    Interface,
    /// Instances of a class
    Instance,
    /// The class value itself: statics and the constructor
    Class,
}

impl DescriptionKind {
    fn as_str(self) -> &'static str {
        match self {
            DescriptionKind::Literal => "literal",
            DescriptionKind::Interface => "interface",
            DescriptionKind::Instance => "instance",
            DescriptionKind::Class => "class",
        }
    }
}

impl fmt::Display for DescriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage kind of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    Constructor,
    Accessor,
}

impl MemberKind {
    /// Fields and accessors both read and write a value; methods do not
    pub fn is_compatible(self, other: MemberKind) -> bool {
        self == other
            || matches!(
                (self, other),
                (MemberKind::Field, MemberKind::Accessor) | (MemberKind::Accessor, MemberKind::Field)
            )
    }
}

/// One member slot of a description
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescription {
    pub name: String,
    pub kind: MemberKind,
    /// Stable slot index
    pub index: u32,
    /// Field type, method type, or accessor value type
    pub value_type: ValueTypeId,
    /// Implementation of a method or constructor
    pub method: Option<FuncId>,
    pub getter: Option<FuncId>,
    pub setter: Option<FuncId>,
    /// Declared by this description rather than inherited
    pub is_own: bool,
    pub is_optional: bool,
    /// Set on a base member once a derived description redefines it
    pub overridden: bool,
}

impl MemberDescription {
    fn new(name: &str, kind: MemberKind, index: u32, value_type: ValueTypeId, is_own: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            index,
            value_type,
            method: None,
            getter: None,
            setter: None,
            is_own,
            is_optional: false,
            overridden: false,
        }
    }

    fn inherit_payload(&mut self, base: &MemberDescription) {
        self.method = self.method.or(base.method);
        self.getter = self.getter.or(base.getter);
        self.setter = self.setter.or(base.setter);
    }
}

/// Compile-time layout record of a class, interface or object literal
#[derive(Debug, Clone)]
pub struct ObjectDescription {
    pub id: DescId,
    pub name: String,
    pub kind: DescriptionKind,
    /// Object type of values laid out by this description
    pub value_type: ValueTypeId,
    pub(crate) members: Vec<Option<MemberDescription>>,
    pub base: Option<DescId>,
    /// Template of a generic specialization; the member table is shared
    pub generic: Option<DescId>,
    /// Class side of an instance description
    pub class_desc: Option<DescId>,
    /// Instance side of a class description
    pub instance_desc: Option<DescId>,
    pub constructor: Option<FuncId>,
    pub field_count: u32,
    /// Number of descriptions naming this one as base
    pub derived: u32,
    pub this_shape: Option<ShapeId>,
    pub origin_shape: Option<ShapeId>,
    pub(crate) laid_out: bool,
}

impl ObjectDescription {
    pub(crate) fn new(id: DescId, name: &str, kind: DescriptionKind, value_type: ValueTypeId) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            value_type,
            members: Vec::new(),
            base: None,
            generic: None,
            class_desc: None,
            instance_desc: None,
            constructor: None,
            field_count: 0,
            derived: 0,
            this_shape: None,
            origin_shape: None,
            laid_out: false,
        }
    }

    /// Members in slot order; free slots are skipped
    pub fn members(&self) -> impl Iterator<Item = &MemberDescription> {
        self.members.iter().flatten()
    }

    /// Number of slots, free ones included
    pub fn slot_count(&self) -> usize {
        self.members.len()
    }

    /// Member in slot `index`
    pub fn member_at(&self, index: u32) -> Option<&MemberDescription> {
        self.members.get(index as usize).and_then(Option::as_ref)
    }

    /// Member by name
    pub fn member(&self, name: &str) -> Option<&MemberDescription> {
        self.members().find(|m| m.name == name)
    }

    pub(crate) fn member_mut(&mut self, index: u32) -> Option<&mut MemberDescription> {
        self.members.get_mut(index as usize).and_then(Option::as_mut)
    }

    /// Whether values of this description are interface-typed
    pub fn is_interface(&self) -> bool {
        self.kind == DescriptionKind::Interface
    }

    /// Presize the slot array and copy the base's members into the same slots
    pub(crate) fn inherit(&mut self, base: &ObjectDescription, total: usize) {
        self.members = vec![None; total.max(base.members.len())];
        for member in base.members() {
            let mut inherited = member.clone();
            inherited.is_own = false;
            inherited.overridden = false;
            self.members[member.index as usize] = Some(inherited);
        }
        self.field_count = base.field_count;
    }

    /// Presize the slot array of a description without base
    pub(crate) fn reserve(&mut self, total: usize) {
        if self.members.len() < total {
            self.members.resize(total, None);
        }
    }

    /// Place a member.
    ///
    /// A member whose name is already present (inherited from the base) takes
    /// over that slot, so layouts stay base-compatible; constructors never do.
    /// Returns the slot index and, when a base member was redefined, that slot.
    pub(crate) fn update_member(
        &mut self,
        name: &str,
        kind: MemberKind,
        value_type: ValueTypeId,
        is_own: bool,
    ) -> SemanticResult<(u32, bool)> {
        if kind != MemberKind::Constructor {
            let existing = self
                .members
                .iter()
                .flatten()
                .find(|m| m.name == name && m.kind != MemberKind::Constructor)
                .map(|m| (m.index, m.is_own));
            if let Some((index, already_own)) = existing {
                if already_own {
                    // getter and setter of one accessor
                    if let Some(m) = self.member_mut(index) {
                        if kind == MemberKind::Accessor {
                            m.kind = MemberKind::Accessor;
                        }
                    }
                    return Ok((index, false));
                }
                let mut member = MemberDescription::new(name, kind, index, value_type, is_own);
                if let Some(base) = self.member_at(index) {
                    if !is_own {
                        member.inherit_payload(base);
                    }
                }
                self.members[index as usize] = Some(member);
                return Ok((index, is_own));
            }
        }

        let free = self.members.iter().position(Option::is_none).ok_or_else(|| {
            SemanticError::ShapeLayout {
                description: self.name.clone(),
                member: name.to_string(),
            }
        })?;
        let index = free as u32;
        self.members[free] = Some(MemberDescription::new(name, kind, index, value_type, is_own));
        if kind == MemberKind::Field {
            self.field_count += 1;
        }
        Ok((index, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> ObjectDescription {
        ObjectDescription::new(DescId(0), name, DescriptionKind::Instance, ValueTypeId::ANY)
    }

    #[test]
    fn test_first_free_slot() {
        let mut d = desc("Point");
        d.reserve(2);
        assert_eq!(d.update_member("x", MemberKind::Field, ValueTypeId::NUMBER, true).ok(), Some((0, false)));
        assert_eq!(d.update_member("y", MemberKind::Field, ValueTypeId::NUMBER, true).ok(), Some((1, false)));
        assert_eq!(d.field_count, 2);
        assert_eq!(d.member("y").map(|m| m.index), Some(1));
    }

    #[test]
    fn test_no_free_slot() {
        let mut d = desc("Tiny");
        d.reserve(1);
        assert!(d.update_member("a", MemberKind::Field, ValueTypeId::INT, true).is_ok());
        let err = d.update_member("b", MemberKind::Field, ValueTypeId::INT, true);
        assert!(matches!(err, Err(SemanticError::ShapeLayout { .. })));
    }

    #[test]
    fn test_accessor_pair_shares_slot() {
        let mut d = desc("Temp");
        d.reserve(1);
        let (g, _) = d.update_member("c", MemberKind::Accessor, ValueTypeId::NUMBER, true).unwrap();
        let (s, _) = d.update_member("c", MemberKind::Accessor, ValueTypeId::NUMBER, true).unwrap();
        assert_eq!(g, s);
    }

    #[test]
    fn test_inherited_slot_reused() {
        let mut base = desc("Base");
        base.reserve(2);
        base.update_member("a", MemberKind::Field, ValueTypeId::INT, true).unwrap();
        base.update_member("m", MemberKind::Method, ValueTypeId::ANY, true).unwrap();

        let mut derived = desc("Derived");
        derived.inherit(&base, 3);
        let (index, overrides) = derived
            .update_member("m", MemberKind::Method, ValueTypeId::ANY, true)
            .unwrap();
        assert_eq!((index, overrides), (1, true));
        let (extra, _) = derived
            .update_member("b", MemberKind::Field, ValueTypeId::INT, true)
            .unwrap();
        assert_eq!(extra, 2);
        assert_eq!(derived.field_count, 2);
    }
}
