//! Type Registry
//!
//! Maps every source type of the program onto one entry of the value-type
//! lattice, creating the object descriptions class-like types are laid out
//! by. Runs once, before any declaration is registered.

use rustc_hash::{FxHashMap, FxHashSet};
use tswasm_frontend::{ClassDecl, ClassKind, EnumValue, PrimitiveKind, Program, SourceType, TypeId};

use crate::error::{LookupKind, SemanticError, SemanticResult};
use crate::object_model::{DescId, DescriptionKind, ObjectModel};
use crate::types::{
    EnumMember, EnumType, FunctionType, ObjectFlag, ObjectType, TypeParameterType, ValueType,
    ValueTypeId, ValueTypeTable,
};

/// Source type → value type mapping of one program
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    map: FxHashMap<TypeId, ValueTypeId>,
    instance_descs: FxHashMap<TypeId, DescId>,
    class_descs: FxHashMap<TypeId, DescId>,
    class_types: FxHashMap<TypeId, ValueTypeId>,
    /// Class-like declarations in registration order
    classes: Vec<TypeId>,
    enums: Vec<TypeId>,
    in_progress: FxHashSet<TypeId>,
}

impl TypeRegistry {
    /// Map every type of `program`
    #[tracing::instrument(level = "debug", skip_all, fields(types = program.types.len()))]
    pub fn build(
        program: &Program,
        types: &mut ValueTypeTable,
        objects: &mut ObjectModel,
    ) -> SemanticResult<Self> {
        let mut registry = Self::default();
        for (id, _) in program.types.iter() {
            registry.resolve(program, types, objects, id)?;
        }
        tracing::debug!(
            classes = registry.classes.len(),
            enums = registry.enums.len(),
            "type registry built"
        );
        Ok(registry)
    }

    /// Value type of a source type
    pub fn get(&self, id: TypeId) -> SemanticResult<ValueTypeId> {
        self.map.get(&id).copied().ok_or_else(|| SemanticError::SymbolResolution {
            lookup: LookupKind::Type,
            name: id.to_string(),
            scope: "type registry".to_string(),
        })
    }

    /// Description laying out instances (or values) of a class-like type
    pub fn instance_desc(&self, id: TypeId) -> Option<DescId> {
        self.instance_descs.get(&id).copied()
    }

    /// Description of the static side of a class
    pub fn class_desc(&self, id: TypeId) -> Option<DescId> {
        self.class_descs.get(&id).copied()
    }

    /// Type of the class value of a class declaration
    pub fn class_type(&self, id: TypeId) -> Option<ValueTypeId> {
        self.class_types.get(&id).copied()
    }

    /// Class-like declarations in registration order
    pub fn classes(&self) -> &[TypeId] {
        &self.classes
    }

    /// Enum declarations in registration order
    pub fn enums(&self) -> &[TypeId] {
        &self.enums
    }

    fn resolve(
        &mut self,
        program: &Program,
        types: &mut ValueTypeTable,
        objects: &mut ObjectModel,
        id: TypeId,
    ) -> SemanticResult<ValueTypeId> {
        if let Some(ty) = self.map.get(&id) {
            return Ok(*ty);
        }
        if !self.in_progress.insert(id) {
            return Err(SemanticError::internal(format!("cyclic type reference through {}", id)));
        }
        let source = program
            .types
            .get(id)
            .ok_or_else(|| SemanticError::internal(format!("unknown source type {}", id)))?;

        let ty = match source {
            SourceType::Primitive(p) => match p {
                PrimitiveKind::Void => ValueTypeId::VOID,
                PrimitiveKind::Undefined => ValueTypeId::UNDEFINED,
                PrimitiveKind::Null => ValueTypeId::NULL,
                PrimitiveKind::Boolean => ValueTypeId::BOOLEAN,
                PrimitiveKind::Int => ValueTypeId::INT,
                PrimitiveKind::Number => ValueTypeId::NUMBER,
                PrimitiveKind::String => ValueTypeId::STRING,
                PrimitiveKind::Any => ValueTypeId::ANY,
                PrimitiveKind::Generic => ValueTypeId::GENERIC,
            },
            SourceType::Array(element) => {
                let element = self.resolve(program, types, objects, *element)?;
                types.array(element)
            }
            SourceType::Function(sig) => {
                let params = self.resolve_all(program, types, objects, &sig.params)?;
                let return_type = self.resolve(program, types, objects, sig.return_type)?;
                let type_params = self.resolve_all(program, types, objects, &sig.type_params)?;
                types.function_type(FunctionType {
                    params,
                    optional: sig.optional.clone(),
                    rest: sig.rest,
                    return_type,
                    type_params,
                })
            }
            SourceType::Union(members) => {
                let members = self.resolve_all(program, types, objects, members)?;
                types.union(members)
            }
            SourceType::Tuple(elements) => {
                let elements = self.resolve_all(program, types, objects, elements)?;
                types.intern(ValueType::Tuple(elements))
            }
            SourceType::TypeParameter {
                name,
                index,
                constraint,
                default,
            } => {
                let wide = match constraint {
                    Some(c) => self.resolve(program, types, objects, *c)?,
                    None => ValueTypeId::ANY,
                };
                let default = match default {
                    Some(d) => Some(self.resolve(program, types, objects, *d)?),
                    None => None,
                };
                types.intern(ValueType::TypeParameter(TypeParameterType {
                    name: name.clone(),
                    index: *index,
                    wide,
                    default,
                    origin: id.as_u32(),
                }))
            }
            SourceType::Enum(decl) => {
                let has_string = decl.members.iter().any(|(_, v)| matches!(v, EnumValue::String(_)));
                let has_int = decl.members.iter().any(|(_, v)| matches!(v, EnumValue::Int(_)));
                let member_type = match (has_int, has_string) {
                    (true, true) => ValueTypeId::ANY,
                    (_, true) => ValueTypeId::STRING,
                    _ => ValueTypeId::INT,
                };
                self.enums.push(id);
                types.intern(ValueType::Enum(EnumType {
                    name: decl.name.clone(),
                    member_type,
                    members: decl
                        .members
                        .iter()
                        .map(|(n, v)| {
                            let value = match v {
                                EnumValue::Int(i) => EnumMember::Int(*i),
                                EnumValue::String(s) => EnumMember::String(s.clone()),
                            };
                            (n.clone(), value)
                        })
                        .collect(),
                }))
            }
            SourceType::Class(decl) => self.resolve_class(program, types, objects, id, decl)?,
        };

        self.in_progress.remove(&id);
        self.map.insert(id, ty);
        Ok(ty)
    }

    fn resolve_all(
        &mut self,
        program: &Program,
        types: &mut ValueTypeTable,
        objects: &mut ObjectModel,
        ids: &[TypeId],
    ) -> SemanticResult<Vec<ValueTypeId>> {
        ids.iter()
            .map(|id| self.resolve(program, types, objects, *id))
            .collect()
    }

    fn resolve_class(
        &mut self,
        program: &Program,
        types: &mut ValueTypeTable,
        objects: &mut ObjectModel,
        id: TypeId,
        decl: &ClassDecl,
    ) -> SemanticResult<ValueTypeId> {
        let name = if decl.name.is_empty() {
            format!("@literal{}", id.as_u32())
        } else {
            decl.name.clone()
        };
        let type_args = self.resolve_all(program, types, objects, &decl.type_args)?;
        let generic_owner = match decl.generic_owner {
            Some(owner) => Some(self.resolve(program, types, objects, owner)?),
            None => None,
        };
        let base = match decl.base {
            Some(base) => {
                self.resolve(program, types, objects, base)?;
                Some(base)
            }
            None => None,
        };

        let kind = match decl.kind {
            ClassKind::Class => DescriptionKind::Instance,
            ClassKind::Interface => DescriptionKind::Interface,
            ClassKind::ObjectLiteral => DescriptionKind::Literal,
        };
        let desc = objects.add_description(&name, kind, ValueTypeId::ANY);
        let instance_ty = types.intern(ValueType::Object(ObjectType {
            name: name.clone(),
            desc,
            flag: match decl.kind {
                ClassKind::ObjectLiteral => ObjectFlag::Literal,
                _ => ObjectFlag::Object,
            },
            interface: decl.kind == ClassKind::Interface,
            type_args,
            generic_owner,
        }));
        objects.description_mut(desc).value_type = instance_ty;
        self.instance_descs.insert(id, desc);

        if let Some(owner) = decl.generic_owner.and_then(|o| self.instance_desc(o)) {
            objects.description_mut(desc).generic = Some(owner);
        }
        if let Some(base_desc) = base.and_then(|b| self.instance_desc(b)) {
            objects.set_base(desc, base_desc);
        }

        if decl.kind == ClassKind::Class {
            let class_desc = objects.add_description(&name, DescriptionKind::Class, ValueTypeId::ANY);
            let class_ty = types.intern(ValueType::Object(ObjectType {
                name: name.clone(),
                desc: class_desc,
                flag: ObjectFlag::Class,
                interface: false,
                type_args: Vec::new(),
                generic_owner: None,
            }));
            objects.description_mut(class_desc).value_type = class_ty;
            objects.link_class(class_desc, desc);
            types.link_class(class_ty, instance_ty);
            if let Some(owner) = decl.generic_owner.and_then(|o| self.class_desc(o)) {
                objects.description_mut(class_desc).generic = Some(owner);
            }
            if let Some(base_class) = base.and_then(|b| self.class_desc(b)) {
                objects.set_base(class_desc, base_class);
            }
            self.class_descs.insert(id, class_desc);
            self.class_types.insert(id, class_ty);
        }
        self.classes.push(id);
        tracing::trace!(class = %name, desc = %desc, "registered class-like type");
        Ok(instance_ty)
    }
}
