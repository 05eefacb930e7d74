//! Dispatch resolution
//!
//! Decides, once per member access or call site, how the member is
//! addressed. Options are tried in cost order and the first legal one wins:
//!
//! 1. direct: fixed function of an exactly known layout
//! 2. offset / vtable: fixed slot of a known class hierarchy member
//! 3. shape: slot translated through a compatibility shape
//! 4. dynamic: named lookup with a run-time type-tag check

use std::fmt;

use crate::nodes::FuncId;
use crate::object_model::{DescId, DescriptionKind, MemberKind, MethodTarget, ObjectModel, ShapeId, ShapeMember};
use crate::types::{ValueTypeId, ValueTypeTable};

/// Dispatch strategy, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DispatchKind {
    Direct,
    Offset,
    VTable,
    Shape,
    Dynamic,
}

impl DispatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchKind::Direct => "direct",
            DispatchKind::Offset => "offset",
            DispatchKind::VTable => "vtable",
            DispatchKind::Shape => "shape",
            DispatchKind::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the access site does with the member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Get,
    Set,
    Call,
}

/// Resolved addressing of one member access
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberAccess {
    /// Named property lookup at run time
    Dynamic { name: String },
    /// Slot `index` of the expected layout, translated through `shape`, or
    /// through the receiver's run-time shape when `shape` is `None`
    Shape { shape: Option<ShapeId>, index: u32 },
    /// Fixed slot of the receiver
    Offset { index: u32 },
    /// Virtual slot read through the receiver's own description
    VTable { index: u32 },
    /// Fixed function
    Direct { func: FuncId },
    OffsetGetter { index: u32 },
    OffsetSetter { index: u32 },
    DirectGetter { func: FuncId },
    DirectSetter { func: FuncId },
}

impl MemberAccess {
    /// Dispatch strategy of this access
    pub fn kind(&self) -> DispatchKind {
        match self {
            MemberAccess::Dynamic { .. } => DispatchKind::Dynamic,
            MemberAccess::Shape { .. } => DispatchKind::Shape,
            MemberAccess::Offset { .. }
            | MemberAccess::OffsetGetter { .. }
            | MemberAccess::OffsetSetter { .. } => DispatchKind::Offset,
            MemberAccess::VTable { .. } => DispatchKind::VTable,
            MemberAccess::Direct { .. }
            | MemberAccess::DirectGetter { .. }
            | MemberAccess::DirectSetter { .. } => DispatchKind::Direct,
        }
    }
}

impl fmt::Display for MemberAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberAccess::Dynamic { name } => write!(f, "dynamic {:?}", name),
            MemberAccess::Shape {
                shape: Some(shape),
                index,
            } => write!(f, "shape {} @{}", shape, index),
            MemberAccess::Shape { shape: None, index } => write!(f, "shape runtime @{}", index),
            MemberAccess::Offset { index } => write!(f, "offset @{}", index),
            MemberAccess::VTable { index } => write!(f, "vtable @{}", index),
            MemberAccess::Direct { func } => write!(f, "direct {}", func),
            MemberAccess::OffsetGetter { index } => write!(f, "offset get @{}", index),
            MemberAccess::OffsetSetter { index } => write!(f, "offset set @{}", index),
            MemberAccess::DirectGetter { func } => write!(f, "direct get {}", func),
            MemberAccess::DirectSetter { func } => write!(f, "direct set {}", func),
        }
    }
}

/// Result of [`ObjectModel::resolve_member`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    pub access: MemberAccess,
    /// Static type of the member value (`any` when unknown)
    pub value_type: ValueTypeId,
    pub kind: Option<MemberKind>,
    /// Description the member was found on
    pub desc: Option<DescId>,
}

impl ResolvedMember {
    fn dynamic(name: &str) -> Self {
        Self {
            access: MemberAccess::Dynamic {
                name: name.to_string(),
            },
            value_type: ValueTypeId::ANY,
            kind: None,
            desc: None,
        }
    }
}

fn accessor_access(target: Option<MethodTarget>, mode: AccessMode) -> Option<MemberAccess> {
    let setter = mode == AccessMode::Set;
    Some(match (target?, setter) {
        (MethodTarget::Function(func), false) => MemberAccess::DirectGetter { func },
        (MethodTarget::Function(func), true) => MemberAccess::DirectSetter { func },
        (MethodTarget::Offset(index), false) => MemberAccess::OffsetGetter { index },
        (MethodTarget::Offset(index), true) => MemberAccess::OffsetSetter { index },
    })
}

impl ObjectModel {
    /// Resolve member `name` of a receiver of static type `receiver` whose
    /// value carries `shape`.
    ///
    /// The result depends only on the receiver's static type category, its
    /// shape and the member's storage kind.
    pub fn resolve_member(
        &self,
        types: &ValueTypeTable,
        receiver: ValueTypeId,
        shape: Option<ShapeId>,
        name: &str,
        mode: AccessMode,
    ) -> ResolvedMember {
        let Some(desc_id) = self.description_of(types, receiver) else {
            return ResolvedMember::dynamic(name);
        };
        let root = self.layout_root(desc_id);
        let desc = self.description(desc_id);
        let Some(member) = desc.member(name) else {
            return ResolvedMember::dynamic(name);
        };
        let index = member.index;
        let resolved = |access: MemberAccess| ResolvedMember {
            access,
            value_type: member.value_type,
            kind: Some(member.kind),
            desc: Some(desc_id),
        };

        // a value converted from another layout reads through its shape
        if let Some(s) = shape.map(|s| self.shape(s)) {
            if s.is_compatibility() && s.desc == root {
                return resolved(MemberAccess::Shape {
                    shape: Some(s.id),
                    index,
                });
            }
        }

        let layout = shape
            .filter(|s| self.shape(*s).desc == root)
            .or(desc.this_shape);
        let slot = layout.and_then(|s| self.shape(s).member(index));

        let access = match slot {
            None => match desc.kind {
                DescriptionKind::Instance | DescriptionKind::Class => {
                    MemberAccess::VTable { index }
                }
                DescriptionKind::Interface | DescriptionKind::Literal => {
                    MemberAccess::Shape { shape: None, index }
                }
            },
            Some(ShapeMember::Field { offset }) => MemberAccess::Offset { index: offset },
            Some(ShapeMember::Method(MethodTarget::Function(func))) => MemberAccess::Direct { func },
            Some(ShapeMember::Method(MethodTarget::Offset(offset))) => {
                MemberAccess::Offset { index: offset }
            }
            Some(ShapeMember::Accessor { getter, setter }) => {
                let target = if mode == AccessMode::Set { setter } else { getter };
                match accessor_access(target, mode) {
                    Some(access) => access,
                    None => return ResolvedMember::dynamic(name),
                }
            }
        };
        tracing::debug!(member = name, desc = %desc_id, dispatch = %access.kind(), "resolved member");
        resolved(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_model::MemberSpec;
    use crate::types::{ObjectFlag, ObjectType, ValueType};

    fn object_type(types: &mut ValueTypeTable, name: &str, desc: DescId, interface: bool) -> ValueTypeId {
        types.intern(ValueType::Object(ObjectType {
            name: name.to_string(),
            desc,
            flag: ObjectFlag::Object,
            interface,
            type_args: Vec::new(),
            generic_owner: None,
        }))
    }

    #[test]
    fn test_any_receiver_is_dynamic() {
        let model = ObjectModel::new();
        let types = ValueTypeTable::new();
        let r = model.resolve_member(&types, ValueTypeId::ANY, None, "x", AccessMode::Get);
        assert_eq!(r.access.kind(), DispatchKind::Dynamic);
    }

    #[test]
    fn test_sealed_class_is_direct_and_subclassed_is_vtable() {
        let mut model = ObjectModel::new();
        let mut types = ValueTypeTable::new();
        let base = model.add_description("Base", DescriptionKind::Instance, ValueTypeId::ANY);
        let derived = model.add_description("Derived", DescriptionKind::Instance, ValueTypeId::ANY);
        let leaf = model.add_description("Leaf", DescriptionKind::Instance, ValueTypeId::ANY);
        let m = MemberSpec::method("m", ValueTypeId::ANY, Some(FuncId::new(1)));
        model.layout(base, &[MemberSpec::field("v", ValueTypeId::INT), m.clone()]).unwrap();
        model.set_base(derived, base);
        model
            .layout(derived, &[MemberSpec::method("m", ValueTypeId::ANY, Some(FuncId::new(2)))])
            .unwrap();
        model.layout(leaf, &[m]).unwrap();
        model.build_all_shapes().unwrap();

        let base_ty = object_type(&mut types, "Base", base, false);
        let leaf_ty = object_type(&mut types, "Leaf", leaf, false);

        let r = model.resolve_member(&types, base_ty, None, "m", AccessMode::Call);
        assert_eq!(r.access, MemberAccess::VTable { index: 1 });
        let r = model.resolve_member(&types, base_ty, None, "v", AccessMode::Get);
        assert_eq!(r.access, MemberAccess::Offset { index: 0 });
        let r = model.resolve_member(&types, leaf_ty, None, "m", AccessMode::Call);
        assert_eq!(r.access, MemberAccess::Direct { func: FuncId::new(1) });
        let r = model.resolve_member(&types, leaf_ty, None, "missing", AccessMode::Get);
        assert_eq!(r.access.kind(), DispatchKind::Dynamic);
    }

    #[test]
    fn test_interface_receiver_uses_shapes() {
        let mut model = ObjectModel::new();
        let mut types = ValueTypeTable::new();
        let point = model.add_description("Point", DescriptionKind::Instance, ValueTypeId::ANY);
        model
            .layout(
                point,
                &[
                    MemberSpec::field("x", ValueTypeId::NUMBER),
                    MemberSpec::field("y", ValueTypeId::NUMBER),
                ],
            )
            .unwrap();
        let like = model.add_description("XLike", DescriptionKind::Interface, ValueTypeId::ANY);
        model.layout(like, &[MemberSpec::field("x", ValueTypeId::NUMBER)]).unwrap();
        model.build_all_shapes().unwrap();
        let like_ty = object_type(&mut types, "XLike", like, true);

        let r = model.resolve_member(&types, like_ty, None, "x", AccessMode::Get);
        assert_eq!(r.access, MemberAccess::Shape { shape: None, index: 0 });

        let compat = model.build_shape(like, point).unwrap();
        let r = model.resolve_member(&types, like_ty, Some(compat), "x", AccessMode::Get);
        assert_eq!(
            r.access,
            MemberAccess::Shape {
                shape: Some(compat),
                index: 0
            }
        );
        assert_eq!(r.value_type, ValueTypeId::NUMBER);
    }

    #[test]
    fn test_accessor_get_and_set() {
        let mut model = ObjectModel::new();
        let mut types = ValueTypeTable::new();
        let temp = model.add_description("Temp", DescriptionKind::Instance, ValueTypeId::ANY);
        model
            .layout(
                temp,
                &[MemberSpec {
                    kind: MemberKind::Accessor,
                    getter: Some(FuncId::new(7)),
                    setter: Some(FuncId::new(8)),
                    ..MemberSpec::field("c", ValueTypeId::NUMBER)
                }],
            )
            .unwrap();
        model.build_all_shapes().unwrap();
        let ty = object_type(&mut types, "Temp", temp, false);

        let get = model.resolve_member(&types, ty, None, "c", AccessMode::Get);
        assert_eq!(get.access, MemberAccess::DirectGetter { func: FuncId::new(7) });
        let set = model.resolve_member(&types, ty, None, "c", AccessMode::Set);
        assert_eq!(set.access, MemberAccess::DirectSetter { func: FuncId::new(8) });
    }
}
