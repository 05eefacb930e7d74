//! Object model
//!
//! Member-slot layouts of every class, interface and object literal, the
//! shapes that translate between structurally related layouts, and the
//! dispatch resolver choosing how each member access is addressed.
//!
//! The model is an arena: descriptions and shapes are referenced by
//! [`DescId`] and [`ShapeId`] and are never removed.

mod description;
mod dispatch;
mod shape;

pub use description::{DescId, DescriptionKind, MemberDescription, MemberKind, ObjectDescription};
pub use dispatch::{AccessMode, DispatchKind, MemberAccess, ResolvedMember};
pub use shape::{MethodTarget, Shape, ShapeId, ShapeMember};

use rustc_hash::FxHashMap;

use crate::error::{SemanticError, SemanticResult};
use crate::nodes::FuncId;
use crate::types::{ValueTypeId, ValueTypeTable};

/// Member declared by a description, before placement
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSpec {
    pub name: String,
    pub kind: MemberKind,
    pub value_type: ValueTypeId,
    pub is_optional: bool,
    pub method: Option<FuncId>,
    pub getter: Option<FuncId>,
    pub setter: Option<FuncId>,
}

impl MemberSpec {
    pub fn field(name: impl Into<String>, value_type: ValueTypeId) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Field,
            value_type,
            is_optional: false,
            method: None,
            getter: None,
            setter: None,
        }
    }

    pub fn method(name: impl Into<String>, value_type: ValueTypeId, func: Option<FuncId>) -> Self {
        Self {
            kind: MemberKind::Method,
            method: func,
            ..Self::field(name, value_type)
        }
    }
}

/// Arena of object descriptions and shapes
#[derive(Debug, Clone, Default)]
pub struct ObjectModel {
    descriptions: Vec<ObjectDescription>,
    shapes: Vec<Shape>,
    /// (target, source) → compatibility shape
    shape_cache: FxHashMap<(DescId, DescId), ShapeId>,
}

impl ObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Descriptions ────────────────────────────────────────────────────

    /// Create an empty description
    pub fn add_description(
        &mut self,
        name: &str,
        kind: DescriptionKind,
        value_type: ValueTypeId,
    ) -> DescId {
        let id = DescId(self.descriptions.len() as u32);
        self.descriptions
            .push(ObjectDescription::new(id, name, kind, value_type));
        id
    }

    /// Description behind an id handed out by this model
    pub fn description(&self, id: DescId) -> &ObjectDescription {
        &self.descriptions[id.0 as usize]
    }

    pub(crate) fn description_mut(&mut self, id: DescId) -> &mut ObjectDescription {
        &mut self.descriptions[id.0 as usize]
    }

    /// All descriptions in creation order
    pub fn descriptions(&self) -> &[ObjectDescription] {
        &self.descriptions
    }

    /// Description laying out values of type `ty`
    pub fn description_of(&self, types: &ValueTypeTable, ty: ValueTypeId) -> Option<DescId> {
        types.object(ty).map(|obj| obj.desc)
    }

    /// Link a description to its base
    pub fn set_base(&mut self, desc: DescId, base: DescId) {
        self.description_mut(desc).base = Some(base);
        self.description_mut(base).derived += 1;
    }

    /// Link a class description with its instance description
    pub fn link_class(&mut self, class: DescId, instance: DescId) {
        self.description_mut(class).instance_desc = Some(instance);
        self.description_mut(instance).class_desc = Some(class);
    }

    /// Follow the template chain of generic specializations
    pub fn layout_root(&self, mut id: DescId) -> DescId {
        while let Some(generic) = self.description(id).generic {
            id = generic;
        }
        id
    }

    /// Place one member, reusing the base slot of a same-named member.
    ///
    /// When a base member is redefined by an own member, the base member (and
    /// every ancestor defining the slot) is marked overridden.
    pub fn update_member(
        &mut self,
        desc: DescId,
        name: &str,
        kind: MemberKind,
        value_type: ValueTypeId,
        is_own: bool,
    ) -> SemanticResult<u32> {
        let (index, overrides) =
            self.description_mut(desc)
                .update_member(name, kind, value_type, is_own)?;
        if overrides {
            let mut ancestor = self.description(desc).base;
            while let Some(base) = ancestor {
                let d = self.description_mut(base);
                match d.member_mut(index) {
                    Some(m) if m.name == name => m.overridden = true,
                    _ => break,
                }
                ancestor = d.base;
            }
            tracing::trace!(desc = %desc, member = name, index, "member overrides base slot");
        }
        Ok(index)
    }

    /// Lay out all members of `desc`. The base (or generic template) must be
    /// laid out already.
    pub fn layout(&mut self, desc: DescId, members: &[MemberSpec]) -> SemanticResult<()> {
        if self.description(desc).laid_out {
            return Ok(());
        }

        if let Some(template) = self.description(desc).generic {
            let template = self.description(template).clone();
            if !template.laid_out {
                return Err(SemanticError::internal(format!(
                    "template `{}` of `{}` is not laid out",
                    template.name,
                    self.description(desc).name
                )));
            }
            let d = self.description_mut(desc);
            d.members = template.members.clone();
            d.field_count = template.field_count;
            d.constructor = template.constructor;
            d.laid_out = true;
            return Ok(());
        }

        match self.description(desc).base {
            Some(base_id) => {
                let base = self.description(base_id).clone();
                if !base.laid_out {
                    return Err(SemanticError::internal(format!(
                        "base `{}` of `{}` is not laid out",
                        base.name,
                        self.description(desc).name
                    )));
                }
                let total = base.slot_count() + count_new_slots(members, Some(&base));
                self.description_mut(desc).inherit(&base, total);
            }
            None => {
                let total = count_new_slots(members, None);
                self.description_mut(desc).reserve(total);
            }
        }

        for spec in members {
            let index = self.update_member(desc, &spec.name, spec.kind, spec.value_type, true)?;
            let d = self.description_mut(desc);
            if spec.kind == MemberKind::Constructor {
                d.constructor = spec.method.or(d.constructor);
            }
            if let Some(m) = d.member_mut(index) {
                m.is_optional |= spec.is_optional;
                m.method = spec.method.or(m.method);
                m.getter = spec.getter.or(m.getter);
                m.setter = spec.setter.or(m.setter);
            }
        }
        self.description_mut(desc).laid_out = true;
        Ok(())
    }

    // ── Shapes ──────────────────────────────────────────────────────────

    /// Shape behind an id handed out by this model
    pub fn shape(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.0 as usize]
    }

    /// All shapes in creation order
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub(crate) fn push_shape(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(Shape { id, ..shape });
        id
    }

    /// Cached compatibility shape for (target, source), if built
    pub fn cached_shape(&self, target: DescId, source: DescId) -> Option<ShapeId> {
        self.shape_cache.get(&(target, source)).copied()
    }

    pub(crate) fn cache_shape(&mut self, target: DescId, source: DescId, shape: ShapeId) {
        self.shape_cache.insert((target, source), shape);
    }

    /// Number of cached compatibility shapes
    pub fn cached_shape_count(&self) -> usize {
        self.shape_cache.len()
    }
}

/// Slots `members` needs beyond those of `base`. A getter/setter pair shares
/// one slot; constructors never reuse one.
fn count_new_slots(members: &[MemberSpec], base: Option<&ObjectDescription>) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    let mut count = 0;
    for spec in members {
        if spec.kind == MemberKind::Constructor {
            count += 1;
            continue;
        }
        if seen.contains(&spec.name.as_str()) {
            continue;
        }
        seen.push(&spec.name);
        let inherited = base
            .and_then(|b| b.member(&spec.name))
            .is_some_and(|m| m.kind != MemberKind::Constructor);
        if !inherited {
            count += 1;
        }
    }
    count
}
