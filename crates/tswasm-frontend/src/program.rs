//! Program: the complete front-end output
//!
//! A [`Program`] bundles the type table and the scope trees of all global
//! scopes, and answers name lookups through the scope chain.

use crate::scope::{ImportedName, Scope, ScopeId, ScopeKind, VarKey, VarSlot, Variable};
use crate::types::{ClassKind, SourceType, TypeId, TypeTable};

/// Imports are followed at most this many modules deep
const MAX_IMPORT_DEPTH: u32 = 16;

/// What a name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A variable or parameter
    Var(VarKey),
    /// A function declaration
    Function(ScopeId),
    /// A class declaration
    Class(TypeId),
    /// An enum declaration
    Enum(TypeId),
    /// A namespace or an imported module
    Namespace(ScopeId),
    /// A type-only declaration (interface, alias)
    Type(TypeId),
}

/// Scope trees and types of all modules in one compilation
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// All source types
    pub types: TypeTable,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) globals: Vec<ScopeId>,
}

impl Program {
    /// Scope by id
    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0 as usize)
    }

    /// All scopes
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Global scopes in compilation order; the last one is the entry module
    pub fn globals(&self) -> &[ScopeId] {
        &self.globals
    }

    /// Variable behind a key
    pub fn variable(&self, key: VarKey) -> Option<&Variable> {
        self.scope(key.scope)?.variable(key.slot)
    }

    /// Global scope declaring the module `name`
    pub fn find_global(&self, name: &str) -> Option<ScopeId> {
        self.globals.iter().copied().find(|id| {
            self.scope(*id)
                .and_then(Scope::global)
                .is_some_and(|g| g.module == name)
        })
    }

    /// The global scope containing `id`
    pub fn global_of(&self, id: ScopeId) -> ScopeId {
        let mut current = id;
        while let Some(parent) = self.scope(current).and_then(|s| s.parent) {
            current = parent;
        }
        current
    }

    /// Nearest function scope at or above `id`
    pub fn enclosing_function(&self, id: ScopeId) -> Option<ScopeId> {
        let mut current = Some(id);
        while let Some(scope) = current.and_then(|c| self.scope(c)) {
            if scope.is_function() {
                return Some(scope.id);
            }
            current = scope.parent;
        }
        None
    }

    /// Function scopes directly owned by `id`: nested blocks, classes and
    /// namespaces are searched, other function bodies are not entered.
    pub fn nested_functions(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        if let Some(scope) = self.scope(id) {
            for &child in &scope.children {
                self.collect_functions(child, &mut out);
            }
        }
        out
    }

    fn collect_functions(&self, id: ScopeId, out: &mut Vec<ScopeId>) {
        let Some(scope) = self.scope(id) else {
            return;
        };
        match scope.kind {
            ScopeKind::Function(_) => out.push(id),
            ScopeKind::Namespace(_) | ScopeKind::Global(_) => {}
            ScopeKind::Block | ScopeKind::Class(_) => {
                for &child in &scope.children {
                    self.collect_functions(child, out);
                }
            }
        }
    }

    /// Variables declared in block scopes nested in `id` without crossing a
    /// function, class or namespace boundary. The scope's own variables come first.
    pub fn block_locals(&self, id: ScopeId) -> Vec<VarKey> {
        let mut out = Vec::new();
        self.collect_locals(id, true, &mut out);
        out
    }

    fn collect_locals(&self, id: ScopeId, root: bool, out: &mut Vec<VarKey>) {
        let Some(scope) = self.scope(id) else {
            return;
        };
        if !root && !matches!(scope.kind, ScopeKind::Block) {
            return;
        }
        out.extend((0..scope.vars.len() as u32).map(|i| VarKey {
            scope: id,
            slot: VarSlot::Local(i),
        }));
        for &child in &scope.children {
            self.collect_locals(child, false, out);
        }
    }

    /// Resolve `name` starting at scope `from` and walking outwards
    pub fn lookup(&self, from: ScopeId, name: &str) -> Option<Binding> {
        let mut current = Some(from);
        while let Some(scope) = current.and_then(|c| self.scope(c)) {
            if let Some(binding) = self.lookup_in(scope, name, 0) {
                return Some(binding);
            }
            current = scope.parent;
        }
        None
    }

    /// Resolve `name` declared directly in `scope` (namespace member access)
    pub fn lookup_member(&self, scope: ScopeId, name: &str) -> Option<Binding> {
        self.scope(scope)
            .and_then(|s| self.lookup_in(s, name, 0))
    }

    fn lookup_in(&self, scope: &Scope, name: &str, depth: u32) -> Option<Binding> {
        if let Some(i) = scope.vars.iter().position(|v| v.name == name) {
            return Some(Binding::Var(VarKey {
                scope: scope.id,
                slot: VarSlot::Local(i as u32),
            }));
        }
        if let Some(info) = scope.function() {
            if let Some(i) = info.params.iter().position(|p| p.name == name) {
                return Some(Binding::Var(VarKey {
                    scope: scope.id,
                    slot: VarSlot::Param(i as u32),
                }));
            }
        }
        for child in scope.children.iter().filter_map(|c| self.scope(*c)) {
            match &child.kind {
                ScopeKind::Function(info)
                    if !info.is_expression && info.role.is_none() && info.name == name =>
                {
                    return Some(Binding::Function(child.id));
                }
                ScopeKind::Namespace(ns) if ns == name => {
                    return Some(Binding::Namespace(child.id));
                }
                _ => {}
            }
        }
        if let Some((_, ty)) = scope.named_types.iter().find(|(n, _)| n == name) {
            return Some(match self.types.get(*ty) {
                Some(SourceType::Class(decl)) if decl.kind == ClassKind::Class => {
                    Binding::Class(*ty)
                }
                Some(SourceType::Enum(_)) => Binding::Enum(*ty),
                _ => Binding::Type(*ty),
            });
        }
        if depth < MAX_IMPORT_DEPTH {
            if let Some(global) = scope.global() {
                let import = global.imports.iter().find(|i| i.local == name)?;
                let target = self.find_global(&import.module)?;
                return match &import.imported {
                    ImportedName::Namespace => Some(Binding::Namespace(target)),
                    ImportedName::Named(imported) => {
                        let target_scope = self.scope(target)?;
                        self.lookup_in(target_scope, imported, depth + 1)
                    }
                };
            }
        }
        None
    }
}
