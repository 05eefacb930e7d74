//! Build context
//!
//! Owns all state of one build pass: the arenas the module graph is made of,
//! the stack of resolution frames over the scope tree, the deferred-task
//! queue, the LEFT/RIGHT reference stack and the pending generic
//! specializations. Nothing here is process-wide; a fresh context is created
//! per build.
//!
//! # Closure promotion
//!
//! When a variable resolved from an outer function is used inside a nested
//! function, the source declaration is marked captured and gets a slot in its
//! owner's context record. Every function between the owner and the user
//! receives its own closure copy of the variable, linked to the previous copy
//! through `origin`, so a deeply nested function reaches the variable through a
//! chain of context records, one hop per function level.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tswasm_frontend::{Binding, Program, ScopeId, TypeId, VarKey};

use crate::config::BuildConfig;
use crate::error::{LookupKind, SemanticError, SemanticResult};
use crate::flatten::LocalAllocator;
use crate::nodes::{
    CaptureMode, ContextArena, ContextId, FuncId, FunctionDeclareNode, StorageKind, VarDeclareNode,
    VarId,
};
use crate::object_model::{DescId, ObjectModel};
use crate::type_registry::TypeRegistry;
use crate::types::{Substitution, ValueTypeId, ValueTypeTable};

// ============================================================================
// Symbols
// ============================================================================

/// Identity of a resolvable symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKey {
    Var(VarKey),
    Function(ScopeId),
    Class(TypeId),
    Type(TypeId),
    Namespace(ScopeId),
    Enum(TypeId),
}

impl From<Binding> for SymbolKey {
    fn from(binding: Binding) -> Self {
        match binding {
            Binding::Var(key) => SymbolKey::Var(key),
            Binding::Function(scope) => SymbolKey::Function(scope),
            Binding::Class(ty) => SymbolKey::Class(ty),
            Binding::Enum(ty) => SymbolKey::Enum(ty),
            Binding::Namespace(scope) => SymbolKey::Namespace(scope),
            Binding::Type(ty) => SymbolKey::Type(ty),
        }
    }
}

/// What a symbol resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolValue {
    Var(VarId),
    /// Module-level function, called directly
    Function(FuncId),
    Class { desc: DescId, ty: ValueTypeId },
    Type(ValueTypeId),
    Namespace(ScopeId),
    Enum(ValueTypeId),
}

/// One active scope
#[derive(Debug, Clone)]
pub(crate) struct ResolutionFrame {
    pub(crate) scope: ScopeId,
    pub(crate) function: Option<FuncId>,
    pub(crate) introduces_function: bool,
    pub(crate) symbols: FxHashMap<SymbolKey, SymbolValue>,
    /// Closure copies created for this function, by source symbol
    pub(crate) closures: FxHashMap<SymbolKey, VarId>,
}

/// Bookkeeping deferred until every scope registered its declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Lay out the description(s) of a class-like type
    LayoutDescription(TypeId),
    /// Assign parameter and local slot indices
    FinalizeSlots(FuncId),
}

/// Whether an expression is being built as an assignment target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefMode {
    Left,
    Right,
}

// ============================================================================
// Build Context
// ============================================================================

/// State of one build pass
pub struct BuildContext<'a> {
    pub(crate) program: &'a Program,
    pub(crate) config: &'a BuildConfig,
    pub(crate) types: ValueTypeTable,
    pub(crate) registry: TypeRegistry,
    pub(crate) objects: ObjectModel,
    pub(crate) vars: Vec<VarDeclareNode>,
    pub(crate) functions: Vec<FunctionDeclareNode>,
    pub(crate) contexts: ContextArena,
    pub(crate) globals: Vec<VarId>,
    pub(crate) global_symbols: FxHashMap<SymbolKey, SymbolValue>,
    /// Function declaration standing for each function scope
    pub(crate) function_of_scope: FxHashMap<ScopeId, FuncId>,
    /// Hidden local holding the closure of a nested function declaration
    pub(crate) nested_function_vars: FxHashMap<ScopeId, VarId>,
    /// Start function of each global scope
    pub(crate) start_functions: FxHashMap<ScopeId, FuncId>,
    pub(crate) file: String,
    frames: Vec<ResolutionFrame>,
    tasks: VecDeque<DeferredTask>,
    ref_stack: Vec<RefMode>,
    pending_specializations: Vec<FuncId>,
    specialization_cache: FxHashMap<(FuncId, Vec<ValueTypeId>), FuncId>,
    substitution: Substitution,
    temp_counter: u32,
}

impl<'a> BuildContext<'a> {
    pub fn new(program: &'a Program, config: &'a BuildConfig) -> Self {
        Self {
            program,
            config,
            types: ValueTypeTable::new(),
            registry: TypeRegistry::default(),
            objects: ObjectModel::new(),
            vars: Vec::new(),
            functions: Vec::new(),
            contexts: ContextArena::new(),
            globals: Vec::new(),
            global_symbols: FxHashMap::default(),
            function_of_scope: FxHashMap::default(),
            nested_function_vars: FxHashMap::default(),
            start_functions: FxHashMap::default(),
            file: String::new(),
            frames: Vec::new(),
            tasks: VecDeque::new(),
            ref_stack: Vec::new(),
            pending_specializations: Vec::new(),
            specialization_cache: FxHashMap::default(),
            substitution: Substitution::default(),
            temp_counter: 0,
        }
    }

    // ── Arenas ──────────────────────────────────────────────────────────

    pub(crate) fn var(&self, id: VarId) -> &VarDeclareNode {
        &self.vars[id.0 as usize]
    }

    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut VarDeclareNode {
        &mut self.vars[id.0 as usize]
    }

    pub(crate) fn function(&self, id: FuncId) -> &FunctionDeclareNode {
        &self.functions[id.0 as usize]
    }

    pub(crate) fn function_mut(&mut self, id: FuncId) -> &mut FunctionDeclareNode {
        &mut self.functions[id.0 as usize]
    }

    /// Create a variable declaration
    pub(crate) fn new_var(
        &mut self,
        name: impl Into<String>,
        storage: StorageKind,
        ty: ValueTypeId,
        owner: Option<FuncId>,
    ) -> VarId {
        let id = VarId(self.vars.len() as u32);
        let mut var = VarDeclareNode::new(id, name, storage, ty);
        var.owner = owner;
        self.vars.push(var);
        id
    }

    /// Create a function declaration
    pub(crate) fn new_function(&mut self, mut node: FunctionDeclareNode) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        node.id = id;
        self.functions.push(node);
        id
    }

    /// Add a compiler-generated local to `func`
    pub(crate) fn add_local(&mut self, func: FuncId, hint: &str, ty: ValueTypeId) -> VarId {
        self.temp_counter += 1;
        let name = format!("@{}{}", hint, self.temp_counter);
        let var = self.new_var(name, StorageKind::LocalVar, ty, Some(func));
        let f = self.function_mut(func);
        let index = (f.params.len() + f.locals.len()) as u32;
        f.locals.push(var);
        let finalized = f.slots_finalized;
        if finalized {
            self.var_mut(var).index = index;
        }
        var
    }

    /// Assign parameter and local slot indices once
    pub(crate) fn finalize_slots(&mut self, func: FuncId) {
        if self.function(func).slots_finalized {
            return;
        }
        let (params, locals) = {
            let f = self.function(func);
            (f.params.clone(), f.locals.clone())
        };
        for (i, p) in params.iter().enumerate() {
            self.var_mut(*p).index = i as u32;
        }
        for (i, l) in locals.iter().enumerate() {
            self.var_mut(*l).index = (params.len() + i) as u32;
        }
        self.function_mut(func).slots_finalized = true;
    }

    // ── Types ───────────────────────────────────────────────────────────

    /// Value type of a source type under the active substitution
    pub(crate) fn value_type(&mut self, id: TypeId) -> SemanticResult<ValueTypeId> {
        let ty = self.registry.get(id)?;
        Ok(if self.substitution.is_empty() {
            ty
        } else {
            self.types.substitute(ty, &self.substitution)
        })
    }

    pub(crate) fn set_substitution(&mut self, substitution: Substitution) -> Substitution {
        std::mem::replace(&mut self.substitution, substitution)
    }

    // ── Frames ──────────────────────────────────────────────────────────

    /// Activate a scope
    pub(crate) fn push_frame(&mut self, scope: ScopeId, function: Option<FuncId>, introduces_function: bool) {
        self.frames.push(ResolutionFrame {
            scope,
            function,
            introduces_function,
            symbols: FxHashMap::default(),
            closures: FxHashMap::default(),
        });
    }

    /// Deactivate the innermost scope
    pub(crate) fn pop_frame(&mut self) -> SemanticResult<()> {
        self.frames
            .pop()
            .map(|_| ())
            .ok_or_else(|| SemanticError::internal("resolution frame stack underflow"))
    }

    /// Register a symbol in the innermost frame
    pub(crate) fn declare_symbol(&mut self, key: SymbolKey, value: SymbolValue) {
        if let Some(frame) = self.frames.last_mut() {
            frame.symbols.insert(key, value);
        }
    }

    /// Function whose body is being built
    pub(crate) fn current_function(&self) -> Option<FuncId> {
        self.frames.last().and_then(|f| f.function)
    }

    /// Innermost active scope
    pub(crate) fn current_scope(&self) -> Option<ScopeId> {
        self.frames.last().map(|f| f.scope)
    }

    pub(crate) fn scope_name(&self) -> String {
        self.current_scope()
            .and_then(|s| self.program.scope(s))
            .map(|s| s.name())
            .unwrap_or_else(|| "<none>".to_string())
    }

    /// Resolve a name from the innermost scope outwards
    pub(crate) fn resolve_name(&mut self, name: &str, lookup: LookupKind) -> SemanticResult<SymbolValue> {
        let binding = self
            .current_scope()
            .and_then(|scope| self.program.lookup(scope, name));
        let resolved = match binding {
            Some(binding) => self.resolve(binding.into())?,
            None => None,
        };
        resolved.ok_or_else(|| SemanticError::SymbolResolution {
            lookup,
            name: name.to_string(),
            scope: self.scope_name(),
        })
    }

    /// Resolve a symbol: frames innermost-first (own symbols, then closure
    /// copies), then module globals. Variables owned by an outer function are
    /// promoted to closure slots.
    pub(crate) fn resolve(&mut self, key: SymbolKey) -> SemanticResult<Option<SymbolValue>> {
        let found = self.frames.iter().enumerate().rev().find_map(|(i, frame)| {
            frame
                .symbols
                .get(&key)
                .copied()
                .or_else(|| frame.closures.get(&key).map(|v| SymbolValue::Var(*v)))
                .map(|value| (i, value))
        });
        match found {
            Some((index, SymbolValue::Var(var))) => {
                let owner = self.var(var).owner;
                let current = self.current_function();
                if owner.is_some() && owner != current {
                    let promoted = self.promote(key, var, index)?;
                    return Ok(Some(SymbolValue::Var(promoted)));
                }
                Ok(Some(SymbolValue::Var(var)))
            }
            Some((_, value)) => Ok(Some(value)),
            None => Ok(self.global_symbols.get(&key).copied()),
        }
    }

    /// Mark a source variable captured and give it a slot in its owner's
    /// context record
    fn capture(&mut self, var: VarId) -> SemanticResult<()> {
        let v = self.var(var);
        if v.is_captured() {
            return Ok(());
        }
        let mode = if v.storage.is_const() {
            CaptureMode::ByValue
        } else {
            CaptureMode::ByRef
        };
        let owner = v.owner;
        let needs_slot = v.closure_index.is_none();
        self.var_mut(var).capture = mode;
        if let (Some(owner), true) = (owner, needs_slot) {
            let ctx = self.context_of(owner);
            let slot = self.push_context_slot(ctx, var)?;
            let v = self.var_mut(var);
            v.init_ctx = Some(ctx);
            v.closure_index = Some(slot);
        }
        Ok(())
    }

    fn promote(&mut self, key: SymbolKey, var: VarId, found: usize) -> SemanticResult<VarId> {
        self.capture(var)?;
        let mut previous = var;
        for index in (found + 1)..self.frames.len() {
            let frame = &self.frames[index];
            let Some(func) = frame.function.filter(|_| frame.introduces_function) else {
                continue;
            };
            if let Some(existing) = frame.closures.get(&key) {
                previous = *existing;
                continue;
            }
            let (name, ty, capture, constant) = {
                let p = self.var(previous);
                (p.name.clone(), p.ty, p.capture, p.storage.is_const())
            };
            let storage = if constant {
                StorageKind::ClosureConst
            } else {
                StorageKind::ClosureVar
            };
            let ctx = self.context_of(func);
            let copy = self.new_var(name, storage, ty, Some(func));
            let slot = self.push_context_slot(ctx, copy)?;
            {
                let c = self.var_mut(copy);
                c.capture = capture;
                c.origin = Some(previous);
                c.belong_ctx = Some(ctx);
                c.closure_index = Some(slot);
            }
            self.function_mut(func).closure_vars.push(copy);
            self.frames[index].closures.insert(key, copy);
            tracing::debug!(
                var = %self.var(copy).name,
                function = %self.function(func).name,
                origin = %previous,
                slot,
                "promoted variable to closure slot"
            );
            previous = copy;
        }
        Ok(previous)
    }

    fn push_context_slot(&mut self, ctx: ContextId, var: VarId) -> SemanticResult<u32> {
        self.contexts
            .push_slot(ctx, var)
            .ok_or_else(|| SemanticError::internal(format!("unknown context record {}", ctx)))
    }

    /// Context record of `func`, allocated on first use and chained to the
    /// enclosing function's record
    pub(crate) fn context_of(&mut self, func: FuncId) -> ContextId {
        if let Some(ctx) = self.function(func).context {
            return ctx;
        }
        let parent = self.function(func).parent.map(|p| self.context_of(p));
        let ctx = self.contexts.alloc(func, parent);
        self.function_mut(func).context = Some(ctx);
        ctx
    }

    // ── Deferred tasks ──────────────────────────────────────────────────

    pub(crate) fn push_task(&mut self, task: DeferredTask) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop_task(&mut self) -> Option<DeferredTask> {
        self.tasks.pop_front()
    }

    // ── Reference stack ─────────────────────────────────────────────────

    pub(crate) fn push_ref(&mut self, mode: RefMode) {
        self.ref_stack.push(mode);
    }

    pub(crate) fn pop_ref(&mut self) {
        self.ref_stack.pop();
    }

    /// Current reference mode; expressions are read unless told otherwise
    pub(crate) fn ref_mode(&self) -> RefMode {
        self.ref_stack.last().copied().unwrap_or(RefMode::Right)
    }

    // ── Specialization ──────────────────────────────────────────────────

    /// Specialization of the generic function `template` for `args`, created
    /// on first request and generated after all module functions
    pub(crate) fn request_specialization(
        &mut self,
        template: FuncId,
        args: Vec<ValueTypeId>,
    ) -> SemanticResult<FuncId> {
        let key = (template, args);
        if let Some(func) = self.specialization_cache.get(&key) {
            return Ok(*func);
        }
        let t = self.function(template).clone();
        if t.type_params.len() != key.1.len() {
            return Err(SemanticError::internal(format!(
                "`{}` expects {} type arguments, got {}",
                t.name,
                t.type_params.len(),
                key.1.len()
            )));
        }
        let substitution: Substitution = t.type_params.iter().copied().zip(key.1.iter().copied()).collect();
        let arg_names: Vec<String> = key
            .1
            .iter()
            .map(|a| self.types.display(*a).to_string())
            .collect();

        let mut node = FunctionDeclareNode::new(
            FuncId(0),
            format!("{}<{}>", t.name, arg_names.join(", ")),
            t.kind,
            self.types.substitute(t.ty, &substitution),
        );
        node.flags = t.flags;
        node.parent = t.parent;
        node.class = t.class;
        node.this_type = t.this_type;
        node.type_params = t.type_params.clone();
        node.generic = Some(template);
        node.type_args = key.1.clone();
        node.scope = t.scope;
        let func = self.new_function(node);

        let mut remap: FxHashMap<VarId, VarId> = FxHashMap::default();
        let mut var_keys = Vec::with_capacity(t.var_keys.len());
        for (source_key, old) in &t.var_keys {
            let (name, storage, ty) = {
                let v = self.var(*old);
                (v.name.clone(), v.storage, v.ty)
            };
            let ty = self.types.substitute(ty, &substitution);
            let new = self.new_var(name, storage, ty, Some(func));
            remap.insert(*old, new);
            var_keys.push((*source_key, new));
        }
        let map = |vars: &[VarId]| -> Vec<VarId> {
            vars.iter().filter_map(|v| remap.get(v).copied()).collect()
        };
        let params = map(&t.params);
        let locals = map(&t.locals);
        let f = self.function_mut(func);
        f.params = params;
        f.locals = locals;
        f.var_keys = var_keys;

        self.specialization_cache.insert(key, func);
        self.pending_specializations.push(func);
        tracing::debug!(template = %t.name, specialization = %func, "requested specialization");
        Ok(func)
    }

    /// Take the pending specialization list
    pub(crate) fn take_specializations(&mut self) -> Vec<FuncId> {
        std::mem::take(&mut self.pending_specializations)
    }

    /// Substitution a specialization is generated under
    pub(crate) fn specialization_substitution(&self, func: FuncId) -> Substitution {
        let f = self.function(func);
        f.type_params
            .iter()
            .copied()
            .zip(f.type_args.iter().copied())
            .collect()
    }

    pub(crate) fn has_pending_specializations(&self) -> bool {
        !self.pending_specializations.is_empty()
    }

    /// Drop per-pass state once the module is complete
    pub(crate) fn clear_pass_state(&mut self) {
        self.pending_specializations.clear();
        self.tasks.clear();
        self.ref_stack.clear();
        self.frames.clear();
        self.substitution.clear();
    }
}

impl LocalAllocator for BuildContext<'_> {
    fn alloc_local(&mut self, hint: &str, ty: ValueTypeId) -> SemanticResult<VarId> {
        let func = self
            .current_function()
            .ok_or_else(|| SemanticError::internal("local allocated outside a function"))?;
        Ok(self.add_local(func, hint, ty))
    }
}
