//! Scope tree
//!
//! Scopes form a tree rooted at one global scope per source module. Each scope
//! owns the variables it declares, the named types visible in it, and (for
//! global, namespace and function scopes) its statements.

use std::fmt;

use crate::ast::{Expr, Stmt};
use crate::span::Span;
use crate::types::TypeId;

/// Unique identifier for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// Create a scope id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

/// Position of a variable inside its scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarSlot {
    /// Function parameter
    Param(u32),
    /// Declared variable
    Local(u32),
}

/// Identity of a declared variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarKey {
    /// Declaring scope
    pub scope: ScopeId,
    /// Position inside the scope
    pub slot: VarSlot,
}

/// Declaration modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VarFlags {
    /// Declared `const`
    pub is_const: bool,
    /// Declared `readonly`
    pub is_readonly: bool,
    /// Ambient declaration
    pub is_declare: bool,
    /// Static class member
    pub is_static: bool,
    /// Exported from its module
    pub is_export: bool,
}

impl VarFlags {
    /// Flags of a `const` binding
    pub fn constant() -> Self {
        Self {
            is_const: true,
            ..Self::default()
        }
    }

    /// Binding cannot be reassigned
    pub fn is_immutable(&self) -> bool {
        self.is_const || self.is_readonly
    }
}

/// A declared variable or parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Source name
    pub name: String,
    /// Resolved type
    pub ty: TypeId,
    /// Modifiers
    pub flags: VarFlags,
    /// Initializer
    pub init: Option<Expr>,
    /// Declaration position
    pub span: Option<Span>,
}

impl Variable {
    /// A mutable variable without initializer
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            flags: VarFlags::default(),
            init: None,
            span: None,
        }
    }
}

/// Function modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FunctionFlags {
    pub is_static: bool,
    pub is_method: bool,
    pub is_declare: bool,
    pub is_export: bool,
    pub is_default: bool,
    pub is_decorator: bool,
}

/// Role of a function inside a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodRole {
    Constructor,
    Method,
    Getter,
    Setter,
}

/// Function scope details
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Function name (empty for anonymous expressions)
    pub name: String,
    /// Signature type
    pub ty: TypeId,
    /// Parameters in order
    pub params: Vec<Variable>,
    /// Modifiers
    pub flags: FunctionFlags,
    /// Owning class for methods, accessors and constructors
    pub class: Option<TypeId>,
    /// Role inside the owning class
    pub role: Option<MethodRole>,
    /// Function expression or arrow function
    pub is_expression: bool,
}

/// How a module binding is imported
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportedName {
    /// `import { name } from`
    Named(String),
    /// `import * as ns from`
    Namespace,
}

/// An import declaration of a global scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportDecl {
    /// Local binding name
    pub local: String,
    /// Module name of the source global scope
    pub module: String,
    /// Imported binding
    pub imported: ImportedName,
}

/// An export declaration of a global scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportDecl {
    /// Externally visible name
    pub exported: String,
    /// Local binding name
    pub local: String,
}

/// Global scope details
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalInfo {
    /// Module name
    pub module: String,
    /// Source file path
    pub file: String,
    /// Imports
    pub imports: Vec<ImportDecl>,
    /// Exports
    pub exports: Vec<ExportDecl>,
}

/// Kind of a scope
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeKind {
    Global(GlobalInfo),
    Namespace(String),
    Function(FunctionInfo),
    Class(TypeId),
    Block,
}

/// A node of the scope tree
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    /// Identifier
    pub id: ScopeId,
    /// Scope kind
    pub kind: ScopeKind,
    /// Enclosing scope
    pub parent: Option<ScopeId>,
    /// Nested scopes in declaration order
    pub children: Vec<ScopeId>,
    /// Variables declared directly in this scope
    pub vars: Vec<Variable>,
    /// Types declared in this scope
    pub named_types: Vec<(String, TypeId)>,
    /// Statements owned by this scope
    pub statements: Vec<Stmt>,
}

impl Scope {
    /// Create an empty scope
    pub fn new(id: ScopeId, kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            kind,
            parent,
            children: Vec::new(),
            vars: Vec::new(),
            named_types: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// Function details of a function scope
    pub fn function(&self) -> Option<&FunctionInfo> {
        match &self.kind {
            ScopeKind::Function(info) => Some(info),
            _ => None,
        }
    }

    /// Global details of a global scope
    pub fn global(&self) -> Option<&GlobalInfo> {
        match &self.kind {
            ScopeKind::Global(info) => Some(info),
            _ => None,
        }
    }

    /// Whether this scope starts a function body
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ScopeKind::Function(_))
    }

    /// Whether variables declared here are module globals
    pub fn holds_globals(&self) -> bool {
        matches!(self.kind, ScopeKind::Global(_) | ScopeKind::Namespace(_))
    }

    /// Display name
    pub fn name(&self) -> String {
        match &self.kind {
            ScopeKind::Global(info) => info.module.clone(),
            ScopeKind::Namespace(name) => name.clone(),
            ScopeKind::Function(info) if info.name.is_empty() => format!("anonymous{}", self.id.0),
            ScopeKind::Function(info) => info.name.clone(),
            ScopeKind::Class(ty) => format!("class{}", ty.0),
            ScopeKind::Block => format!("block{}", self.id.0),
        }
    }

    /// Variable declared in this scope
    pub fn variable(&self, slot: VarSlot) -> Option<&Variable> {
        match slot {
            VarSlot::Param(i) => self.function()?.params.get(i as usize),
            VarSlot::Local(i) => self.vars.get(i as usize),
        }
    }

    /// Keys of all parameters followed by all locals of this scope
    pub fn var_keys(&self) -> Vec<VarKey> {
        let params = self.function().map(|f| f.params.len()).unwrap_or(0);
        (0..params as u32)
            .map(VarSlot::Param)
            .chain((0..self.vars.len() as u32).map(VarSlot::Local))
            .map(|slot| VarKey {
                scope: self.id,
                slot,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_keys_order() {
        let mut scope = Scope::new(
            ScopeId(3),
            ScopeKind::Function(FunctionInfo {
                name: "f".to_string(),
                ty: TypeId::ANY,
                params: vec![Variable::new("a", TypeId::NUMBER)],
                flags: FunctionFlags::default(),
                class: None,
                role: None,
                is_expression: false,
            }),
            None,
        );
        scope.vars.push(Variable::new("b", TypeId::STRING));

        let keys = scope.var_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].slot, VarSlot::Param(0));
        assert_eq!(keys[1].slot, VarSlot::Local(0));
        assert_eq!(scope.variable(VarSlot::Local(0)).map(|v| v.name.as_str()), Some("b"));
        assert_eq!(scope.name(), "f");
    }

    #[test]
    fn test_immutable_flags() {
        assert!(VarFlags::constant().is_immutable());
        assert!(!VarFlags::default().is_immutable());
    }
}
