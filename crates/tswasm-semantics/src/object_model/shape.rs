//! Shapes
//!
//! A shape maps the member slots of one description onto the physical access
//! path of each member. Every description has an origin shape (how its own
//! declaration accesses members) and a this shape (what is still statically
//! known inside methods, where the receiver may be a subclass). Compatibility
//! shapes translate a target layout onto a differently laid out source.

use std::fmt;

use crate::error::SemanticResult;
use crate::nodes::FuncId;
use crate::object_model::{DescId, DescriptionKind, MemberDescription, MemberKind, ObjectModel};

/// Unique identifier for a shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub(crate) u32);

impl ShapeId {
    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape{}", self.0)
    }
}

/// How a method or accessor is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodTarget {
    /// Read from slot `n` of the receiver
    Offset(u32),
    /// Fixed function
    Function(FuncId),
}

impl fmt::Display for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodTarget::Offset(i) => write!(f, "@{}", i),
            MethodTarget::Function(func) => write!(f, "{}", func),
        }
    }
}

/// Access descriptor of one shape slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeMember {
    Field { offset: u32 },
    Method(MethodTarget),
    Accessor {
        getter: Option<MethodTarget>,
        setter: Option<MethodTarget>,
    },
}

impl fmt::Display for ShapeMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeMember::Field { offset } => write!(f, "field @{}", offset),
            ShapeMember::Method(target) => write!(f, "method {}", target),
            ShapeMember::Accessor { getter, setter } => {
                write!(f, "accessor")?;
                if let Some(g) = getter {
                    write!(f, " get {}", g)?;
                }
                if let Some(s) = setter {
                    write!(f, " set {}", s)?;
                }
                Ok(())
            }
        }
    }
}

/// Per-slot access table of a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub id: ShapeId,
    /// Description whose slot order this shape follows
    pub desc: DescId,
    /// Concrete description of compatibility shapes
    pub source: Option<DescId>,
    /// One entry per slot; `None` means the access is resolved at run time
    pub members: Vec<Option<ShapeMember>>,
    /// Shape of the generic template this one was derived from
    pub generic: Option<ShapeId>,
}

impl Shape {
    fn new(desc: DescId, source: Option<DescId>, members: Vec<Option<ShapeMember>>) -> Self {
        Self {
            id: ShapeId(0),
            desc,
            source,
            members,
            generic: None,
        }
    }

    /// Every slot is resolved statically
    pub fn is_static(&self) -> bool {
        self.members.iter().all(Option::is_some)
    }

    /// Built for a (target, source) pair of different descriptions
    pub fn is_compatibility(&self) -> bool {
        self.source.is_some_and(|s| s != self.desc)
    }

    /// Descriptor of slot `index`
    pub fn member(&self, index: u32) -> Option<ShapeMember> {
        self.members.get(index as usize).copied().flatten()
    }
}

fn origin_member(kind: DescriptionKind, member: &MemberDescription) -> ShapeMember {
    let by_offset = kind == DescriptionKind::Interface;
    let target = |func: Option<FuncId>| match func {
        Some(f) if !by_offset => MethodTarget::Function(f),
        _ => MethodTarget::Offset(member.index),
    };
    match member.kind {
        MemberKind::Field => ShapeMember::Field {
            offset: member.index,
        },
        MemberKind::Method | MemberKind::Constructor => ShapeMember::Method(target(member.method)),
        MemberKind::Accessor if by_offset => ShapeMember::Accessor {
            getter: Some(MethodTarget::Offset(member.index)),
            setter: Some(MethodTarget::Offset(member.index)),
        },
        MemberKind::Accessor => ShapeMember::Accessor {
            getter: member.getter.map(MethodTarget::Function),
            setter: member.setter.map(MethodTarget::Function),
        },
    }
}

/// Descriptor for a member whose static target is unknown
fn offset_member(member: &MemberDescription) -> ShapeMember {
    let at = MethodTarget::Offset(member.index);
    match member.kind {
        MemberKind::Field => ShapeMember::Field {
            offset: member.index,
        },
        MemberKind::Method | MemberKind::Constructor => ShapeMember::Method(at),
        MemberKind::Accessor => ShapeMember::Accessor {
            getter: Some(at),
            setter: Some(at),
        },
    }
}

impl ObjectModel {
    /// Build the origin and this shapes of one description
    pub fn build_description_shapes(&mut self, desc: DescId) -> SemanticResult<()> {
        if self.description(desc).origin_shape.is_some() {
            return Ok(());
        }
        let root = self.layout_root(desc);
        if root != desc {
            self.build_description_shapes(root)?;
            let (origin, this) = {
                let r = self.description(root);
                (r.origin_shape, r.this_shape)
            };
            let d = self.description_mut(desc);
            d.origin_shape = origin;
            d.this_shape = this;
            return Ok(());
        }

        let d = self.description(desc);
        let kind = d.kind;
        let origin: Vec<Option<ShapeMember>> = d
            .members
            .iter()
            .map(|slot| slot.as_ref().map(|m| origin_member(kind, m)))
            .collect();
        let this: Option<Vec<Option<ShapeMember>>> = match kind {
            DescriptionKind::Instance if d.derived > 0 => Some(
                origin
                    .iter()
                    .map(|slot| match slot {
                        Some(ShapeMember::Field { offset }) => Some(ShapeMember::Field { offset: *offset }),
                        _ => None,
                    })
                    .collect(),
            ),
            DescriptionKind::Interface => Some(vec![None; origin.len()]),
            _ => None,
        };

        let origin_id = self.push_shape(Shape::new(desc, Some(desc), origin));
        let this_id = match this {
            Some(members) => self.push_shape(Shape::new(desc, Some(desc), members)),
            None => origin_id,
        };
        tracing::trace!(desc = %desc, origin = %origin_id, this = %this_id, "description shapes");
        let d = self.description_mut(desc);
        d.origin_shape = Some(origin_id);
        d.this_shape = Some(this_id);
        Ok(())
    }

    /// Build origin and this shapes for every description
    pub fn build_all_shapes(&mut self) -> SemanticResult<()> {
        for i in 0..self.descriptions().len() {
            self.build_description_shapes(DescId(i as u32))?;
        }
        Ok(())
    }

    /// Compatibility shape reading values laid out by `source` through the
    /// slot order of `target`.
    ///
    /// Built at most once per (target, source) pair; later calls return the
    /// cached shape.
    pub fn build_shape(&mut self, target: DescId, source: DescId) -> SemanticResult<ShapeId> {
        let target = self.layout_root(target);
        let source = self.layout_root(source);
        if let Some(cached) = self.cached_shape(target, source) {
            return Ok(cached);
        }
        self.build_description_shapes(source)?;

        let src = self.description(source);
        let src_this = src.this_shape.map(|s| self.shape(s));
        let members: Vec<Option<ShapeMember>> = self
            .description(target)
            .members
            .iter()
            .map(|slot| {
                let wanted = slot.as_ref()?;
                let found = src.member(&wanted.name)?;
                if !wanted.kind.is_compatible(found.kind) {
                    return None;
                }
                Some(
                    src_this
                        .and_then(|s| s.member(found.index))
                        .unwrap_or_else(|| offset_member(found)),
                )
            })
            .collect();

        let id = self.push_shape(Shape::new(target, Some(source), members));
        self.cache_shape(target, source, id);
        tracing::trace!(target = %target, source = %source, shape = %id, "compatibility shape");
        Ok(id)
    }
}
