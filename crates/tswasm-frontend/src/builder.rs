//! Programmatic construction of front-end output
//!
//! Embedders that already own a checker, and tests, build a [`Program`]
//! directly through [`ProgramBuilder`] instead of parsing source text.

use crate::ast::{Expr, Stmt};
use crate::program::Program;
use crate::scope::{
    ExportDecl, FunctionFlags, FunctionInfo, GlobalInfo, ImportDecl, MethodRole, Scope, ScopeId,
    ScopeKind, VarFlags, VarKey, VarSlot, Variable,
};
use crate::types::{ClassDecl, ClassMember, FunctionSignature, MemberKind, SourceType, TypeId};
use rustc_hash::FxHashMap;

/// Incremental builder for a [`Program`]
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
    class_scopes: FxHashMap<TypeId, ScopeId>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the builder
    pub fn finish(self) -> Program {
        self.program
    }

    // ── Types ───────────────────────────────────────────────────────────

    /// Register an anonymous type
    pub fn add_type(&mut self, ty: SourceType) -> TypeId {
        self.program.types.add(ty)
    }

    /// Register a function type
    pub fn function_type(&mut self, sig: FunctionSignature) -> TypeId {
        self.add_type(SourceType::Function(sig))
    }

    /// Register an array type
    pub fn array_type(&mut self, element: TypeId) -> TypeId {
        self.add_type(SourceType::Array(element))
    }

    /// Register a type and declare it under `name` in `scope`
    pub fn named_type(&mut self, scope: ScopeId, name: &str, ty: SourceType) -> TypeId {
        let id = self.add_type(ty);
        if let Some(s) = self.scope_mut(scope) {
            s.named_types.push((name.to_string(), id));
        }
        id
    }

    /// Declare a class-like type in `parent` and open its class scope
    pub fn class(&mut self, parent: ScopeId, decl: ClassDecl) -> TypeId {
        let name = decl.name.clone();
        let ty = self.named_type(parent, &name, SourceType::Class(decl));
        let scope = self.push_scope(ScopeKind::Class(ty), Some(parent));
        self.class_scopes.insert(ty, scope);
        ty
    }

    /// Register an object literal type without declaring a name
    pub fn literal_type(&mut self, decl: ClassDecl) -> TypeId {
        self.add_type(SourceType::Class(decl))
    }

    /// Class scope opened by [`ProgramBuilder::class`]
    pub fn class_scope(&self, class: TypeId) -> Option<ScopeId> {
        self.class_scopes.get(&class).copied()
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    /// Open a global scope for module `module`
    pub fn global(&mut self, module: &str) -> ScopeId {
        let id = self.push_scope(
            ScopeKind::Global(GlobalInfo {
                module: module.to_string(),
                file: format!("{}.ts", module),
                imports: Vec::new(),
                exports: Vec::new(),
            }),
            None,
        );
        self.program.globals.push(id);
        id
    }

    /// Open a namespace scope
    pub fn namespace(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        self.push_scope(ScopeKind::Namespace(name.to_string()), Some(parent))
    }

    /// Open a block scope
    pub fn block(&mut self, parent: ScopeId) -> ScopeId {
        self.push_scope(ScopeKind::Block, Some(parent))
    }

    /// Open a function declaration scope
    pub fn function(
        &mut self,
        parent: ScopeId,
        name: &str,
        ty: TypeId,
        params: Vec<(&str, TypeId)>,
    ) -> ScopeId {
        self.push_function(Some(parent), name, ty, params, None, None, false)
    }

    /// Open a function expression (or arrow function) scope
    pub fn function_expression(
        &mut self,
        parent: ScopeId,
        ty: TypeId,
        params: Vec<(&str, TypeId)>,
    ) -> ScopeId {
        self.push_function(Some(parent), "", ty, params, None, None, true)
    }

    /// Open a method, accessor or constructor scope of `class` and record it
    /// as a member of the class declaration.
    pub fn method(
        &mut self,
        class: TypeId,
        name: &str,
        role: MethodRole,
        ty: TypeId,
        params: Vec<(&str, TypeId)>,
    ) -> ScopeId {
        let parent = self.class_scopes.get(&class).copied();
        let scope = self.push_function(parent, name, ty, params, Some(class), Some(role), false);
        let value_ty = match role {
            MethodRole::Getter => self
                .program
                .types
                .function(ty)
                .map(|sig| sig.return_type)
                .unwrap_or(TypeId::ANY),
            MethodRole::Setter => self
                .program
                .types
                .function(ty)
                .and_then(|sig| sig.params.first().copied())
                .unwrap_or(TypeId::ANY),
            _ => ty,
        };
        if let Some(SourceType::Class(decl)) = self.program.types.get_mut(class) {
            match role {
                MethodRole::Constructor => decl.constructor = Some(scope),
                MethodRole::Method => {
                    decl.members.push(ClassMember::method(name, ty, Some(scope)));
                }
                MethodRole::Getter | MethodRole::Setter => {
                    let kind = if role == MethodRole::Getter {
                        MemberKind::Getter
                    } else {
                        MemberKind::Setter
                    };
                    decl.members.push(ClassMember {
                        name: name.to_string(),
                        kind,
                        ty: value_ty,
                        optional: false,
                        is_static: false,
                        body: Some(scope),
                    });
                }
            }
        }
        scope
    }

    /// Replace the modifiers of a function scope
    pub fn set_function_flags(&mut self, scope: ScopeId, flags: FunctionFlags) {
        if let Some(Scope {
            kind: ScopeKind::Function(info),
            ..
        }) = self.scope_mut(scope)
        {
            info.flags = flags;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_function(
        &mut self,
        parent: Option<ScopeId>,
        name: &str,
        ty: TypeId,
        params: Vec<(&str, TypeId)>,
        class: Option<TypeId>,
        role: Option<MethodRole>,
        is_expression: bool,
    ) -> ScopeId {
        let flags = FunctionFlags {
            is_method: role.is_some(),
            ..FunctionFlags::default()
        };
        let info = FunctionInfo {
            name: name.to_string(),
            ty,
            params: params
                .into_iter()
                .map(|(n, t)| Variable::new(n, t))
                .collect(),
            flags,
            class,
            role,
            is_expression,
        };
        self.push_scope(ScopeKind::Function(info), parent)
    }

    fn push_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.program.scopes.len() as u32);
        self.program.scopes.push(Scope::new(id, kind, parent));
        if let Some(p) = parent.and_then(|p| self.scope_mut(p)) {
            p.children.push(id);
        }
        id
    }

    fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.program.scopes.get_mut(id.0 as usize)
    }

    // ── Variables ───────────────────────────────────────────────────────

    /// Declare a mutable variable
    pub fn var(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> VarKey {
        self.declare(scope, Variable::new(name, ty))
    }

    /// Declare a `const` binding with an initializer
    pub fn constant(&mut self, scope: ScopeId, name: &str, ty: TypeId, init: Expr) -> VarKey {
        self.declare(
            scope,
            Variable {
                flags: VarFlags::constant(),
                init: Some(init),
                ..Variable::new(name, ty)
            },
        )
    }

    /// Declare a fully described variable
    pub fn declare(&mut self, scope: ScopeId, var: Variable) -> VarKey {
        let len = match self.scope_mut(scope) {
            Some(s) => {
                s.vars.push(var);
                s.vars.len()
            }
            None => 0,
        };
        VarKey {
            scope,
            slot: VarSlot::Local(len.saturating_sub(1) as u32),
        }
    }

    /// Key of parameter `index` of function scope `scope`
    pub fn param(&self, scope: ScopeId, index: u32) -> VarKey {
        VarKey {
            scope,
            slot: VarSlot::Param(index),
        }
    }

    /// Set the initializer of a declared variable
    pub fn set_init(&mut self, key: VarKey, init: Expr) {
        if let (Some(s), VarSlot::Local(i)) = (self.scope_mut(key.scope), key.slot) {
            if let Some(var) = s.vars.get_mut(i as usize) {
                var.init = Some(init);
            }
        }
    }

    // ── Statements and module tables ────────────────────────────────────

    /// Append a statement to a global, namespace or function scope
    pub fn stmt(&mut self, scope: ScopeId, stmt: Stmt) {
        if let Some(s) = self.scope_mut(scope) {
            s.statements.push(stmt);
        }
    }

    /// Add an import to a global scope
    pub fn import(&mut self, global: ScopeId, decl: ImportDecl) {
        if let Some(Scope {
            kind: ScopeKind::Global(info),
            ..
        }) = self.scope_mut(global)
        {
            info.imports.push(decl);
        }
    }

    /// Add an export to a global scope
    pub fn export(&mut self, global: ScopeId, decl: ExportDecl) {
        if let Some(Scope {
            kind: ScopeKind::Global(info),
            ..
        }) = self.scope_mut(global)
        {
            info.exports.push(decl);
        }
    }
}
