//! Source Types
//!
//! Types as resolved by the front end's checker. Every expression, variable and
//! declaration refers to one entry of the [`TypeTable`] by [`TypeId`]. The
//! semantic builder maps these onto its own value-type lattice.

use std::fmt;

use crate::scope::ScopeId;

/// Unique identifier for a type in the [`TypeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// `void`
    pub const VOID: TypeId = TypeId(0);
    /// `undefined`
    pub const UNDEFINED: TypeId = TypeId(1);
    /// `null`
    pub const NULL: TypeId = TypeId(2);
    /// `boolean`
    pub const BOOLEAN: TypeId = TypeId(3);
    /// Integer-valued `number` proven by the checker
    pub const INT: TypeId = TypeId(4);
    /// `number`
    pub const NUMBER: TypeId = TypeId(5);
    /// `string`
    pub const STRING: TypeId = TypeId(6);
    /// `any`
    pub const ANY: TypeId = TypeId(7);
    /// Unresolved template type
    pub const GENERIC: TypeId = TypeId(8);

    /// Create a type id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Primitive source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Void,
    Undefined,
    Null,
    Boolean,
    Int,
    Number,
    String,
    Any,
    Generic,
}

impl PrimitiveKind {
    const ALL: [PrimitiveKind; 9] = [
        PrimitiveKind::Void,
        PrimitiveKind::Undefined,
        PrimitiveKind::Null,
        PrimitiveKind::Boolean,
        PrimitiveKind::Int,
        PrimitiveKind::Number,
        PrimitiveKind::String,
        PrimitiveKind::Any,
        PrimitiveKind::Generic,
    ];
}

/// Function signature: (T1, T2, ..., Tn) => R
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    /// Parameter types
    pub params: Vec<TypeId>,
    /// Optional flag per parameter
    pub optional: Vec<bool>,
    /// Index of the rest parameter, if any
    pub rest: Option<usize>,
    /// Return type
    pub return_type: TypeId,
    /// Type parameters of a generic function
    pub type_params: Vec<TypeId>,
}

impl FunctionSignature {
    /// A signature with required parameters only
    pub fn new(params: Vec<TypeId>, return_type: TypeId) -> Self {
        let optional = vec![false; params.len()];
        Self {
            params,
            optional,
            rest: None,
            return_type,
            type_params: Vec::new(),
        }
    }
}

/// Kind of a class-like declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
    ObjectLiteral,
}

/// Kind of a class member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    Getter,
    Setter,
}

/// A member of a class, interface or object literal type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassMember {
    /// Member name
    pub name: String,
    /// Member kind
    pub kind: MemberKind,
    /// Field type, method signature type, or accessor value type
    pub ty: TypeId,
    /// Declared with `?`
    pub optional: bool,
    /// Declared `static`
    pub is_static: bool,
    /// Function scope implementing a method or accessor
    pub body: Option<ScopeId>,
}

impl ClassMember {
    /// A field member
    pub fn field(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Field,
            ty,
            optional: false,
            is_static: false,
            body: None,
        }
    }

    /// A method member implemented by `body`
    pub fn method(name: impl Into<String>, ty: TypeId, body: Option<ScopeId>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Method,
            ty,
            optional: false,
            is_static: false,
            body,
        }
    }
}

/// Class, interface or object literal declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassDecl {
    /// Declared (or synthesized) name
    pub name: String,
    /// Declaration kind
    pub kind: ClassKind,
    /// Base class
    pub base: Option<TypeId>,
    /// Implemented interfaces
    pub implements: Vec<TypeId>,
    /// Members in declaration order
    pub members: Vec<ClassMember>,
    /// Constructor function scope
    pub constructor: Option<ScopeId>,
    /// Type parameters of a generic class
    pub type_params: Vec<TypeId>,
    /// Template this class was specialized from
    pub generic_owner: Option<TypeId>,
    /// Type arguments of a specialization
    pub type_args: Vec<TypeId>,
    /// Ambient (`declare`) class
    pub is_declare: bool,
}

impl ClassDecl {
    /// An empty declaration of the given kind
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base: None,
            implements: Vec::new(),
            members: Vec::new(),
            constructor: None,
            type_params: Vec::new(),
            generic_owner: None,
            type_args: Vec::new(),
            is_declare: false,
        }
    }

    /// Builder-style member addition
    pub fn with_member(mut self, member: ClassMember) -> Self {
        self.members.push(member);
        self
    }

    /// Builder-style base assignment
    pub fn with_base(mut self, base: TypeId) -> Self {
        self.base = Some(base);
        self
    }
}

/// Enum member initializer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumValue {
    Int(i64),
    String(String),
}

/// Enum declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDecl {
    /// Enum name
    pub name: String,
    /// Members in declaration order
    pub members: Vec<(String, EnumValue)>,
}

/// A resolved source type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceType {
    Primitive(PrimitiveKind),
    Array(TypeId),
    Function(FunctionSignature),
    Union(Vec<TypeId>),
    TypeParameter {
        name: String,
        index: u32,
        constraint: Option<TypeId>,
        default: Option<TypeId>,
    },
    Enum(EnumDecl),
    Tuple(Vec<TypeId>),
    Class(ClassDecl),
}

/// Table of all source types of a program
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<SourceType>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table with the primitive types pre-registered at their fixed ids
    pub fn new() -> Self {
        let types = PrimitiveKind::ALL
            .iter()
            .map(|p| SourceType::Primitive(*p))
            .collect();
        Self { types }
    }

    /// Register a type
    pub fn add(&mut self, ty: SourceType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Look up a type
    pub fn get(&self, id: TypeId) -> Option<&SourceType> {
        self.types.get(id.0 as usize)
    }

    /// Mutable access, used while a declaration is being completed
    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut SourceType> {
        self.types.get_mut(id.0 as usize)
    }

    /// Class-like declaration behind `id`
    pub fn class(&self, id: TypeId) -> Option<&ClassDecl> {
        match self.get(id) {
            Some(SourceType::Class(decl)) => Some(decl),
            _ => None,
        }
    }

    /// Function signature behind `id`
    pub fn function(&self, id: TypeId) -> Option<&FunctionSignature> {
        match self.get(id) {
            Some(SourceType::Function(sig)) => Some(sig),
            _ => None,
        }
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether only primitives are registered
    pub fn is_empty(&self) -> bool {
        self.types.len() <= PrimitiveKind::ALL.len()
    }

    /// Iterate over all types with their ids
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &SourceType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_have_fixed_ids() {
        let table = TypeTable::new();
        assert_eq!(
            table.get(TypeId::NUMBER),
            Some(&SourceType::Primitive(PrimitiveKind::Number))
        );
        assert_eq!(
            table.get(TypeId::GENERIC),
            Some(&SourceType::Primitive(PrimitiveKind::Generic))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_add_class() {
        let mut table = TypeTable::new();
        let id = table.add(SourceType::Class(
            ClassDecl::new("Point", ClassKind::Class)
                .with_member(ClassMember::field("x", TypeId::NUMBER)),
        ));
        assert_eq!(table.class(id).map(|c| c.name.as_str()), Some("Point"));
        assert!(table.function(id).is_none());
        assert!(!table.is_empty());
    }
}
