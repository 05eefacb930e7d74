//! Value-type lattice
//!
//! Every semantic value carries a [`ValueTypeId`] into the module's
//! [`ValueTypeTable`]. Types are interned, so structural equality is id
//! equality.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::object_model::DescId;

/// Unique identifier for an interned value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueTypeId(pub(crate) u32);

impl ValueTypeId {
    pub const VOID: ValueTypeId = ValueTypeId(0);
    pub const UNDEFINED: ValueTypeId = ValueTypeId(1);
    pub const NULL: ValueTypeId = ValueTypeId(2);
    pub const NEVER: ValueTypeId = ValueTypeId(3);
    pub const BOOLEAN: ValueTypeId = ValueTypeId(4);
    pub const INT: ValueTypeId = ValueTypeId(5);
    pub const NUMBER: ValueTypeId = ValueTypeId(6);
    pub const RAW_STRING: ValueTypeId = ValueTypeId(7);
    pub const STRING: ValueTypeId = ValueTypeId(8);
    pub const ANY: ValueTypeId = ValueTypeId(9);
    pub const GENERIC: ValueTypeId = ValueTypeId(10);
    pub const NAMESPACE: ValueTypeId = ValueTypeId(11);

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Primitive value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Undefined,
    Null,
    Never,
    Boolean,
    Int,
    Number,
    /// String literal not yet converted to a string object
    RawString,
    String,
    Any,
    /// Unresolved template type
    Generic,
    Namespace,
}

impl Primitive {
    const ALL: [Primitive; 12] = [
        Primitive::Void,
        Primitive::Undefined,
        Primitive::Null,
        Primitive::Never,
        Primitive::Boolean,
        Primitive::Int,
        Primitive::Number,
        Primitive::RawString,
        Primitive::String,
        Primitive::Any,
        Primitive::Generic,
        Primitive::Namespace,
    ];

    fn name(self) -> &'static str {
        match self {
            Primitive::Void => "void",
            Primitive::Undefined => "undefined",
            Primitive::Null => "null",
            Primitive::Never => "never",
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Number => "number",
            Primitive::RawString => "raw_string",
            Primitive::String => "string",
            Primitive::Any => "any",
            Primitive::Generic => "generic",
            Primitive::Namespace => "namespace",
        }
    }
}

/// Which side of a class an object type describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectFlag {
    /// Instance or interface value
    Object,
    /// Object literal value
    Literal,
    /// The class value itself (static side)
    Class,
}

/// Object, interface or class type backed by an object description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectType {
    pub name: String,
    pub desc: DescId,
    pub flag: ObjectFlag,
    pub interface: bool,
    pub type_args: Vec<ValueTypeId>,
    pub generic_owner: Option<ValueTypeId>,
}

/// Function type: (T1, ..., Tn) => R
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<ValueTypeId>,
    pub optional: Vec<bool>,
    pub rest: Option<usize>,
    pub return_type: ValueTypeId,
    pub type_params: Vec<ValueTypeId>,
}

impl FunctionType {
    /// A function type with required parameters only
    pub fn new(params: Vec<ValueTypeId>, return_type: ValueTypeId) -> Self {
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

/// Template type parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParameterType {
    pub name: String,
    pub index: u32,
    /// Upper bound used wherever the parameter is still unresolved
    pub wide: ValueTypeId,
    pub default: Option<ValueTypeId>,
    /// Distinguishes same-named parameters of different declarations
    pub origin: u32,
}

/// Enum member value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumMember {
    Int(i64),
    String(String),
}

/// Enum type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub member_type: ValueTypeId,
    pub members: Vec<(String, EnumMember)>,
}

impl EnumType {
    /// Member value by name
    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Closure context record type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClosureContextType {
    pub parent: Option<ValueTypeId>,
    pub free_vars: Vec<ValueTypeId>,
}

/// An entry of the value-type lattice
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Primitive(Primitive),
    Object(ObjectType),
    Array(ValueTypeId),
    Function(FunctionType),
    /// Sorted, deduplicated members
    Union(Vec<ValueTypeId>),
    TypeParameter(TypeParameterType),
    Enum(EnumType),
    Tuple(Vec<ValueTypeId>),
    ClosureContext(ClosureContextType),
}

/// Tag of a value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTypeKind {
    Void,
    Undefined,
    Null,
    Never,
    Boolean,
    Int,
    Number,
    RawString,
    String,
    Any,
    Generic,
    Namespace,
    Object,
    Interface,
    Array,
    Function,
    Union,
    TypeParameter,
    Enum,
    Tuple,
    ClosureContext,
}

/// Type-parameter substitution: parameter type → argument type
pub type Substitution = FxHashMap<ValueTypeId, ValueTypeId>;

// ============================================================================
// Type Table
// ============================================================================

/// Interning table of all value types of a module
#[derive(Debug, Clone)]
pub struct ValueTypeTable {
    types: Vec<ValueType>,
    interned: FxHashMap<ValueType, ValueTypeId>,
    class_to_instance: FxHashMap<ValueTypeId, ValueTypeId>,
    instance_to_class: FxHashMap<ValueTypeId, ValueTypeId>,
}

impl Default for ValueTypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueTypeTable {
    /// Create a table with the primitives pre-registered at their fixed ids
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            interned: FxHashMap::default(),
            class_to_instance: FxHashMap::default(),
            instance_to_class: FxHashMap::default(),
        };
        for p in Primitive::ALL {
            table.intern(ValueType::Primitive(p));
        }
        table
    }

    /// Intern a type, returning the existing id for a structurally equal one
    pub fn intern(&mut self, ty: ValueType) -> ValueTypeId {
        if let Some(id) = self.interned.get(&ty) {
            return *id;
        }
        let id = ValueTypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    /// Type behind an id handed out by this table
    pub fn get(&self, id: ValueTypeId) -> &ValueType {
        &self.types[id.0 as usize]
    }

    /// Number of interned types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing beyond the primitives is interned
    pub fn is_empty(&self) -> bool {
        self.types.len() <= Primitive::ALL.len()
    }

    /// Tag of a type
    pub fn kind(&self, id: ValueTypeId) -> ValueTypeKind {
        match self.get(id) {
            ValueType::Primitive(p) => match p {
                Primitive::Void => ValueTypeKind::Void,
                Primitive::Undefined => ValueTypeKind::Undefined,
                Primitive::Null => ValueTypeKind::Null,
                Primitive::Never => ValueTypeKind::Never,
                Primitive::Boolean => ValueTypeKind::Boolean,
                Primitive::Int => ValueTypeKind::Int,
                Primitive::Number => ValueTypeKind::Number,
                Primitive::RawString => ValueTypeKind::RawString,
                Primitive::String => ValueTypeKind::String,
                Primitive::Any => ValueTypeKind::Any,
                Primitive::Generic => ValueTypeKind::Generic,
                Primitive::Namespace => ValueTypeKind::Namespace,
            },
            ValueType::Object(obj) if obj.interface => ValueTypeKind::Interface,
            ValueType::Object(_) => ValueTypeKind::Object,
            ValueType::Array(_) => ValueTypeKind::Array,
            ValueType::Function(_) => ValueTypeKind::Function,
            ValueType::Union(_) => ValueTypeKind::Union,
            ValueType::TypeParameter(_) => ValueTypeKind::TypeParameter,
            ValueType::Enum(_) => ValueTypeKind::Enum,
            ValueType::Tuple(_) => ValueTypeKind::Tuple,
            ValueType::ClosureContext(_) => ValueTypeKind::ClosureContext,
        }
    }

    /// Primitive value types, `any` and `generic` included
    pub fn is_primitive(&self, id: ValueTypeId) -> bool {
        matches!(self.get(id), ValueType::Primitive(p) if *p != Primitive::Namespace)
    }

    /// Types whose values are heap references with a described layout or none
    pub fn is_object_like(&self, id: ValueTypeId) -> bool {
        matches!(
            self.get(id),
            ValueType::Object(_)
                | ValueType::Array(_)
                | ValueType::Function(_)
                | ValueType::Tuple(_)
                | ValueType::ClosureContext(_)
        )
    }

    pub fn is_string(&self, id: ValueTypeId) -> bool {
        id == ValueTypeId::STRING || id == ValueTypeId::RAW_STRING
    }

    pub fn is_nullish(&self, id: ValueTypeId) -> bool {
        id == ValueTypeId::NULL || id == ValueTypeId::UNDEFINED
    }

    pub fn object(&self, id: ValueTypeId) -> Option<&ObjectType> {
        match self.get(id) {
            ValueType::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn function(&self, id: ValueTypeId) -> Option<&FunctionType> {
        match self.get(id) {
            ValueType::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn enumeration(&self, id: ValueTypeId) -> Option<&EnumType> {
        match self.get(id) {
            ValueType::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn type_parameter(&self, id: ValueTypeId) -> Option<&TypeParameterType> {
        match self.get(id) {
            ValueType::TypeParameter(p) => Some(p),
            _ => None,
        }
    }

    /// Union members, or `None` for a non-union type
    pub fn union_members(&self, id: ValueTypeId) -> Option<&[ValueTypeId]> {
        match self.get(id) {
            ValueType::Union(members) => Some(members),
            _ => None,
        }
    }

    /// Element type of an array
    pub fn array_element(&self, id: ValueTypeId) -> Option<ValueTypeId> {
        match self.get(id) {
            ValueType::Array(element) => Some(*element),
            _ => None,
        }
    }

    /// Intern `element[]`
    pub fn array(&mut self, element: ValueTypeId) -> ValueTypeId {
        self.intern(ValueType::Array(element))
    }

    /// Intern a function type
    pub fn function_type(&mut self, func: FunctionType) -> ValueTypeId {
        self.intern(ValueType::Function(func))
    }

    /// Intern the union of `members`; nested unions are flattened and a single
    /// remaining member is returned as is.
    pub fn union(&mut self, members: impl IntoIterator<Item = ValueTypeId>) -> ValueTypeId {
        let mut flat = Vec::new();
        for m in members {
            match self.union_members(m) {
                Some(inner) => flat.extend_from_slice(inner),
                None => flat.push(m),
            }
        }
        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => ValueTypeId::NEVER,
            1 => flat[0],
            _ => self.intern(ValueType::Union(flat)),
        }
    }

    /// Parameter type at `index`, honoring a rest parameter
    pub fn param_type(&self, func: ValueTypeId, index: usize) -> Option<ValueTypeId> {
        let f = self.function(func)?;
        match f.rest {
            Some(rest) if index >= rest => {
                let rest_ty = *f.params.get(rest)?;
                Some(self.array_element(rest_ty).unwrap_or(rest_ty))
            }
            _ => f.params.get(index).copied(),
        }
    }

    /// Return type of a function type
    pub fn return_type(&self, func: ValueTypeId) -> Option<ValueTypeId> {
        self.function(func).map(|f| f.return_type)
    }

    /// Record the class ↔ instance link of a class declaration
    pub fn link_class(&mut self, class: ValueTypeId, instance: ValueTypeId) {
        self.class_to_instance.insert(class, instance);
        self.instance_to_class.insert(instance, class);
    }

    /// Instance type of a class type
    pub fn instance_of(&self, class: ValueTypeId) -> Option<ValueTypeId> {
        self.class_to_instance.get(&class).copied()
    }

    /// Class type of an instance type
    pub fn class_of(&self, instance: ValueTypeId) -> Option<ValueTypeId> {
        self.instance_to_class.get(&instance).copied()
    }

    /// Whether `ty` mentions a type parameter anywhere
    pub fn has_type_parameter(&self, ty: ValueTypeId) -> bool {
        match self.get(ty) {
            ValueType::TypeParameter(_) => true,
            ValueType::Array(e) => self.has_type_parameter(*e),
            ValueType::Function(f) => {
                f.params.iter().any(|p| self.has_type_parameter(*p))
                    || self.has_type_parameter(f.return_type)
            }
            ValueType::Union(ms) | ValueType::Tuple(ms) => {
                ms.iter().any(|m| self.has_type_parameter(*m))
            }
            ValueType::Object(o) => o.type_args.iter().any(|a| self.has_type_parameter(*a)),
            _ => false,
        }
    }

    /// Replace type parameters according to `subst`
    pub fn substitute(&mut self, ty: ValueTypeId, subst: &Substitution) -> ValueTypeId {
        if subst.is_empty() {
            return ty;
        }
        if let Some(arg) = subst.get(&ty) {
            return *arg;
        }
        match self.get(ty).clone() {
            ValueType::Array(element) => {
                let element = self.substitute(element, subst);
                self.array(element)
            }
            ValueType::Function(mut f) => {
                f.params = f.params.iter().map(|p| self.substitute(*p, subst)).collect();
                f.return_type = self.substitute(f.return_type, subst);
                f.type_params.retain(|p| !subst.contains_key(p));
                self.function_type(f)
            }
            ValueType::Union(members) => {
                let members: Vec<_> = members.iter().map(|m| self.substitute(*m, subst)).collect();
                self.union(members)
            }
            ValueType::Tuple(elements) => {
                let elements = elements.iter().map(|e| self.substitute(*e, subst)).collect();
                self.intern(ValueType::Tuple(elements))
            }
            ValueType::Object(mut o) if !o.type_args.is_empty() => {
                o.type_args = o.type_args.iter().map(|a| self.substitute(*a, subst)).collect();
                self.intern(ValueType::Object(o))
            }
            _ => ty,
        }
    }

    /// Renderable form of a type
    pub fn display(&self, id: ValueTypeId) -> TypeDisplay<'_> {
        TypeDisplay { table: self, id }
    }
}

/// [`fmt::Display`] adapter for a type id
pub struct TypeDisplay<'a> {
    table: &'a ValueTypeTable,
    id: ValueTypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.table;
        match t.get(self.id) {
            ValueType::Primitive(p) => f.write_str(p.name()),
            ValueType::Object(o) => {
                match o.flag {
                    ObjectFlag::Class => write!(f, "class {}", o.name)?,
                    _ => write!(f, "{}", o.name)?,
                }
                if !o.type_args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in o.type_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", t.display(*a))?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            ValueType::Array(e) => write!(f, "{}[]", t.display(*e)),
            ValueType::Function(func) => {
                write!(f, "(")?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if func.rest == Some(i) {
                        write!(f, "...")?;
                    }
                    write!(f, "{}", t.display(*p))?;
                }
                write!(f, ") => {}", t.display(func.return_type))
            }
            ValueType::Union(ms) => {
                for (i, m) in ms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", t.display(*m))?;
                }
                Ok(())
            }
            ValueType::TypeParameter(p) => write!(f, "{}", p.name),
            ValueType::Enum(e) => write!(f, "enum {}", e.name),
            ValueType::Tuple(es) => {
                write!(f, "[")?;
                for (i, e) in es.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t.display(*e))?;
                }
                write!(f, "]")
            }
            ValueType::ClosureContext(ctx) => write!(f, "context<{}>", ctx.free_vars.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_ids() {
        let table = ValueTypeTable::new();
        assert_eq!(table.kind(ValueTypeId::NUMBER), ValueTypeKind::Number);
        assert_eq!(table.kind(ValueTypeId::NAMESPACE), ValueTypeKind::Namespace);
        assert!(table.is_primitive(ValueTypeId::ANY));
        assert!(!table.is_primitive(ValueTypeId::NAMESPACE));
        assert!(table.is_empty());
    }

    #[test]
    fn test_interning() {
        let mut table = ValueTypeTable::new();
        let a = table.array(ValueTypeId::NUMBER);
        let b = table.array(ValueTypeId::NUMBER);
        assert_eq!(a, b);
        assert_eq!(table.display(a).to_string(), "number[]");
    }

    #[test]
    fn test_union_normalization() {
        let mut table = ValueTypeTable::new();
        let u1 = table.union([ValueTypeId::STRING, ValueTypeId::NUMBER]);
        let u2 = table.union([ValueTypeId::NUMBER, ValueTypeId::STRING, ValueTypeId::NUMBER]);
        assert_eq!(u1, u2);
        let nested = table.union([u1, ValueTypeId::BOOLEAN]);
        assert_eq!(table.union_members(nested).map(|m| m.len()), Some(3));
        assert_eq!(table.union([ValueTypeId::INT]), ValueTypeId::INT);
    }

    #[test]
    fn test_param_type_with_rest() {
        let mut table = ValueTypeTable::new();
        let rest = table.array(ValueTypeId::STRING);
        let mut func = FunctionType::new(vec![ValueTypeId::INT, rest], ValueTypeId::VOID);
        func.rest = Some(1);
        let f = table.function_type(func);
        assert_eq!(table.param_type(f, 0), Some(ValueTypeId::INT));
        assert_eq!(table.param_type(f, 1), Some(ValueTypeId::STRING));
        assert_eq!(table.param_type(f, 5), Some(ValueTypeId::STRING));
        assert_eq!(table.display(f).to_string(), "(int, ...string[]) => void");
    }

    #[test]
    fn test_substitute() {
        let mut table = ValueTypeTable::new();
        let t = table.intern(ValueType::TypeParameter(TypeParameterType {
            name: "T".to_string(),
            index: 0,
            wide: ValueTypeId::ANY,
            default: None,
            origin: 42,
        }));
        let arr_t = table.array(t);
        let mut func = FunctionType::new(vec![arr_t], t);
        func.type_params = vec![t];
        let f = table.function_type(func);
        assert!(table.has_type_parameter(f));

        let mut subst = Substitution::default();
        subst.insert(t, ValueTypeId::NUMBER);
        let g = table.substitute(f, &subst);
        assert!(!table.has_type_parameter(g));
        assert_eq!(table.display(g).to_string(), "(number[]) => number");
        assert!(table.function(g).is_some_and(|f| f.type_params.is_empty()));
    }
}
