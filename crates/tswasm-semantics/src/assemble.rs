//! Module Assembler
//!
//! Drives one build pass over a whole program:
//!
//! 0. map every source type onto the value-type lattice
//! 1. register declarations (globals, functions, named types) with
//!    placeholder handles, queueing description layout and slot
//!    finalization as deferred tasks, then run the tasks
//! 2. build the shapes of every description
//! 3. build the import and export tables
//! 4. per global scope: function bodies, then the start function holding
//!    the scope's top-level statements
//! 5. generate pending generic specializations
//! 6. finish: freeze the module graph
//!
//! Registration completes before any body is lowered, so sibling scopes may
//! reference each other in any order.

use tswasm_frontend::{
    Binding, ClassKind, ImportedName, MemberKind as SourceMemberKind, MethodRole, Program, ScopeId,
    ScopeKind, SourceType, TypeId, VarKey, VarSlot,
};

use crate::config::BuildConfig;
use crate::context::{BuildContext, DeferredTask, SymbolKey, SymbolValue};
use crate::error::{LookupKind, SemanticError, SemanticResult};
use crate::nodes::{
    ExternItem, ExternModule, ExternTarget, FuncId, FunctionDeclareNode, FunctionFlags,
    FunctionKind, ModuleNode, StorageKind, VarId,
};
use crate::object_model::{MemberKind, MemberSpec};
use crate::pretty::PrettyPrint;
use crate::type_registry::TypeRegistry;
use crate::types::{FunctionType, ValueTypeId};

/// Build the module graph of `program`
#[tracing::instrument(level = "debug", skip_all, fields(globals = program.globals().len()))]
pub fn build_module(program: &Program, config: &BuildConfig) -> SemanticResult<ModuleNode> {
    let mut ctx = BuildContext::new(program, config);

    // Phase 0: types
    ctx.registry = TypeRegistry::build(program, &mut ctx.types, &mut ctx.objects)?;

    // Phase 1: declarations
    ctx.register_declarations()?;
    ctx.run_tasks()?;

    // Phase 2: shapes
    ctx.objects.build_all_shapes()?;

    // Phase 3: import/export tables
    let (imports, exports) = ctx.extern_tables()?;

    // Phase 4: bodies
    let mut entry = None;
    for &global in program.globals() {
        entry = Some(ctx.generate_global(global)?);
    }

    // Phase 5: specializations
    ctx.generate_specializations()?;

    // Phase 6
    let module = ctx.finish_build(entry, imports, exports)?;
    if config.dump_semantic_tree {
        tracing::info!("semantic tree of `{}`:\n{}", module.name, module.pretty_print());
    }
    Ok(module)
}

impl<'a> BuildContext<'a> {
    // ========================================================================
    // Phase 1: registration
    // ========================================================================

    fn register_declarations(&mut self) -> SemanticResult<()> {
        let program = self.program;

        for scope in program.scopes() {
            for (_, ty) in &scope.named_types {
                let symbol = match program.types.get(*ty) {
                    Some(SourceType::Class(decl)) if decl.kind == ClassKind::Class => {
                        let desc = self.registry.class_desc(*ty);
                        let class_ty = self.registry.class_type(*ty);
                        match (desc, class_ty) {
                            (Some(desc), Some(ty)) => SymbolValue::Class { desc, ty },
                            _ => {
                                return Err(SemanticError::internal(format!(
                                    "class type {} has no class description",
                                    ty
                                )))
                            }
                        }
                    }
                    Some(SourceType::Enum(_)) => SymbolValue::Enum(self.value_type(*ty)?),
                    _ => SymbolValue::Type(self.value_type(*ty)?),
                };
                let key = match symbol {
                    SymbolValue::Class { .. } => SymbolKey::Class(*ty),
                    SymbolValue::Enum(_) => SymbolKey::Enum(*ty),
                    _ => SymbolKey::Type(*ty),
                };
                self.global_symbols.insert(key, symbol);
            }
            if let ScopeKind::Namespace(_) = scope.kind {
                self.global_symbols
                    .insert(SymbolKey::Namespace(scope.id), SymbolValue::Namespace(scope.id));
            }
        }

        for &global in program.globals() {
            // `import * as ns` binds the whole module
            self.global_symbols
                .insert(SymbolKey::Namespace(global), SymbolValue::Namespace(global));
            for scope in module_scopes(program, global) {
                for key in program.block_locals(scope) {
                    self.register_global(key)?;
                }
            }
        }

        for &global in program.globals() {
            for scope in module_scopes(program, global) {
                for function in program.nested_functions(scope) {
                    let func = self.register_function(function, None)?;
                    let declared = program
                        .scope(function)
                        .and_then(|s| s.function())
                        .is_some_and(|info| !info.is_expression && info.role.is_none());
                    if declared {
                        self.global_symbols
                            .insert(SymbolKey::Function(function), SymbolValue::Function(func));
                    }
                }
            }
        }

        let classes = self.registry.classes().to_vec();
        for class in classes {
            self.push_task(DeferredTask::LayoutDescription(class));
        }
        tracing::debug!(
            globals = self.globals.len(),
            functions = self.functions.len(),
            "registered declarations"
        );
        Ok(())
    }

    fn register_global(&mut self, key: VarKey) -> SemanticResult<VarId> {
        let program = self.program;
        let variable = program.variable(key).ok_or_else(|| {
            SemanticError::internal(format!("unknown variable {:?}", key))
        })?;
        let storage = if variable.flags.is_immutable() {
            StorageKind::GlobalConst
        } else {
            StorageKind::GlobalVar
        };
        let ty = self.value_type(variable.ty)?;
        let var = self.new_var(variable.name.clone(), storage, ty, None);
        let index = self.globals.len() as u32;
        let v = self.var_mut(var);
        v.index = index;
        v.is_export = variable.flags.is_export;
        v.location = variable.span;
        self.globals.push(var);
        self.global_symbols
            .insert(SymbolKey::Var(key), SymbolValue::Var(var));
        Ok(var)
    }

    /// Register the function of `scope` and, recursively, the functions
    /// nested in it. Nested declarations get a hidden local holding their
    /// closure.
    fn register_function(&mut self, scope: ScopeId, parent: Option<FuncId>) -> SemanticResult<FuncId> {
        let program = self.program;
        let source = program
            .scope(scope)
            .ok_or_else(|| SemanticError::internal(format!("unknown scope {}", scope)))?;
        let info = source
            .function()
            .ok_or_else(|| SemanticError::internal(format!("{} is not a function scope", scope)))?;

        let kind = match info.role {
            Some(MethodRole::Constructor) => FunctionKind::Constructor,
            Some(MethodRole::Getter) => FunctionKind::Getter,
            Some(MethodRole::Setter) => FunctionKind::Setter,
            Some(MethodRole::Method) if info.flags.is_static => FunctionKind::Static,
            Some(MethodRole::Method) => FunctionKind::Method,
            None => FunctionKind::Default,
        };
        let class_name = info
            .class
            .and_then(|c| program.types.class(c))
            .map(|decl| decl.name.clone());
        let name = match (&class_name, info.role) {
            (Some(class), Some(MethodRole::Constructor)) => format!("{}.constructor", class),
            (Some(class), _) => format!("{}.{}", class, info.name),
            (None, _) => source.name(),
        };

        let ty = self.value_type(info.ty)?;
        let mut node = FunctionDeclareNode::new(FuncId::new(0), name, kind, ty);
        node.flags = FunctionFlags {
            is_static: info.flags.is_static,
            is_method: info.flags.is_method,
            is_declare: info.flags.is_declare,
            is_decorator: info.flags.is_decorator,
            is_export: info.flags.is_export,
            is_start: false,
            is_closure: parent.is_some(),
        };
        node.parent = parent;
        node.scope = Some(scope);
        node.type_params = self
            .types
            .function(ty)
            .map(|f| f.type_params.clone())
            .unwrap_or_default();
        if let Some(class) = info.class {
            let static_side = info.flags.is_static;
            let desc = if static_side {
                self.registry.class_desc(class)
            } else {
                self.registry.instance_desc(class)
            };
            node.class = desc;
            node.this_type = desc.map(|d| self.objects.description(d).value_type);
        }
        let func = self.new_function(node);
        self.function_of_scope.insert(scope, func);

        for (i, param) in info.params.iter().enumerate() {
            let ty = self.value_type(param.ty)?;
            let var = self.new_var(param.name.clone(), StorageKind::ParamVar, ty, Some(func));
            self.var_mut(var).location = param.span;
            let key = VarKey {
                scope,
                slot: VarSlot::Param(i as u32),
            };
            let f = self.function_mut(func);
            f.params.push(var);
            f.var_keys.push((key, var));
        }
        for key in program.block_locals(scope) {
            let Some(variable) = program.variable(key) else {
                continue;
            };
            let storage = if variable.flags.is_immutable() {
                StorageKind::LocalConst
            } else {
                StorageKind::LocalVar
            };
            let ty = self.value_type(variable.ty)?;
            let var = self.new_var(variable.name.clone(), storage, ty, Some(func));
            self.var_mut(var).location = variable.span;
            let f = self.function_mut(func);
            f.locals.push(var);
            f.var_keys.push((key, var));
        }

        for child in program.nested_functions(scope) {
            let child_func = self.register_function(child, Some(func))?;
            let declared = program
                .scope(child)
                .and_then(|s| s.function())
                .filter(|info| !info.is_expression && info.role.is_none());
            if let Some(info) = declared {
                let ty = self.function(child_func).ty;
                let hidden = self.new_var(info.name.clone(), StorageKind::LocalConst, ty, Some(func));
                self.function_mut(func).locals.push(hidden);
                self.nested_function_vars.insert(child, hidden);
            }
        }

        self.push_task(DeferredTask::FinalizeSlots(func));
        Ok(func)
    }

    // ── Deferred tasks ──────────────────────────────────────────────────

    fn run_tasks(&mut self) -> SemanticResult<()> {
        let mut count = 0usize;
        while let Some(task) = self.pop_task() {
            match task {
                DeferredTask::LayoutDescription(ty) => self.layout_class(ty)?,
                DeferredTask::FinalizeSlots(func) => self.finalize_slots(func),
            }
            count += 1;
        }
        tracing::debug!(tasks = count, "ran deferred tasks");
        Ok(())
    }

    /// Lay out the descriptions of a class-like type; bases and generic
    /// templates first
    fn layout_class(&mut self, ty: TypeId) -> SemanticResult<()> {
        let program = self.program;
        let Some(instance) = self.registry.instance_desc(ty) else {
            return Ok(());
        };
        if self.objects.description(instance).laid_out {
            return Ok(());
        }
        let decl = program
            .types
            .class(ty)
            .ok_or_else(|| SemanticError::internal(format!("{} is not a class-like type", ty)))?;
        if let Some(base) = decl.base {
            self.layout_class(base)?;
        }
        if let Some(owner) = decl.generic_owner {
            self.layout_class(owner)?;
        }

        let mut instance_specs = Vec::new();
        let mut static_specs = Vec::new();
        for member in &decl.members {
            let value_type = self.value_type(member.ty)?;
            let func = member.body.and_then(|b| self.function_of_scope.get(&b).copied());
            let mut spec = match member.kind {
                SourceMemberKind::Field => MemberSpec::field(member.name.clone(), value_type),
                SourceMemberKind::Method => MemberSpec::method(member.name.clone(), value_type, func),
                SourceMemberKind::Getter => MemberSpec {
                    kind: MemberKind::Accessor,
                    getter: func,
                    ..MemberSpec::field(member.name.clone(), value_type)
                },
                SourceMemberKind::Setter => MemberSpec {
                    kind: MemberKind::Accessor,
                    setter: func,
                    ..MemberSpec::field(member.name.clone(), value_type)
                },
            };
            spec.is_optional = member.optional;
            if member.is_static {
                static_specs.push(spec);
            } else {
                instance_specs.push(spec);
            }
        }
        self.objects.layout(instance, &instance_specs)?;

        if let Some(class) = self.registry.class_desc(ty) {
            let ctor = decl
                .constructor
                .and_then(|c| self.function_of_scope.get(&c).copied());
            if let Some(ctor) = ctor {
                let ctor_ty = self.function(ctor).ty;
                static_specs.push(MemberSpec {
                    kind: MemberKind::Constructor,
                    ..MemberSpec::method("constructor", ctor_ty, Some(ctor))
                });
            }
            self.objects.layout(class, &static_specs)?;
            let ctor = ctor.or(self.objects.description(class).constructor);
            if ctor.is_some() {
                self.objects.description_mut(instance).constructor = ctor;
            }
        }
        tracing::trace!(
            class = %self.objects.description(instance).name,
            slots = self.objects.description(instance).slot_count(),
            "laid out class"
        );
        Ok(())
    }

    // ========================================================================
    // Phase 3: import/export tables
    // ========================================================================

    fn extern_tables(&mut self) -> SemanticResult<(Vec<ExternModule>, Vec<ExternModule>)> {
        let program = self.program;
        let mut imports: Vec<ExternModule> = Vec::new();
        let mut exports = Vec::new();

        for &global in program.globals() {
            let Some(info) = program.scope(global).and_then(|s| s.global()) else {
                continue;
            };
            let mut table = ExternModule {
                name: info.module.clone(),
                items: Vec::new(),
            };
            for export in &info.exports {
                let binding = program.lookup_member(global, &export.local).ok_or_else(|| {
                    SemanticError::SymbolResolution {
                        lookup: LookupKind::Identifier,
                        name: export.local.clone(),
                        scope: info.module.clone(),
                    }
                })?;
                // type-only exports have no runtime form
                let Some(target) = self.extern_target(binding) else {
                    continue;
                };
                match target {
                    ExternTarget::Var(var) => self.var_mut(var).is_export = true,
                    ExternTarget::Function(func) => self.function_mut(func).flags.is_export = true,
                    _ => {}
                }
                table.items.push(ExternItem {
                    name: export.exported.clone(),
                    target,
                });
            }
            exports.push(table);

            for import in &info.imports {
                let ImportedName::Named(name) = &import.imported else {
                    continue;
                };
                let binding = program
                    .find_global(&import.module)
                    .and_then(|m| program.lookup_member(m, name))
                    .ok_or_else(|| SemanticError::SymbolResolution {
                        lookup: LookupKind::Identifier,
                        name: format!("{}.{}", import.module, name),
                        scope: info.module.clone(),
                    })?;
                let Some(target) = self.extern_target(binding) else {
                    continue;
                };
                let item = ExternItem {
                    name: name.clone(),
                    target,
                };
                match imports.iter_mut().find(|m| m.name == import.module) {
                    Some(module) if module.items.contains(&item) => {}
                    Some(module) => module.items.push(item),
                    None => imports.push(ExternModule {
                        name: import.module.clone(),
                        items: vec![item],
                    }),
                }
            }
        }
        Ok((imports, exports))
    }

    /// Runtime declaration a binding exports; `None` for types and
    /// namespaces
    fn extern_target(&self, binding: Binding) -> Option<ExternTarget> {
        match self.global_symbols.get(&SymbolKey::from(binding)).copied()? {
            SymbolValue::Var(var) => Some(ExternTarget::Var(var)),
            SymbolValue::Function(func) => Some(ExternTarget::Function(func)),
            SymbolValue::Class { desc, .. } => Some(ExternTarget::Class(desc)),
            SymbolValue::Enum(ty) => Some(ExternTarget::Enum(ty)),
            SymbolValue::Type(_) | SymbolValue::Namespace(_) => None,
        }
    }

    // ========================================================================
    // Phase 4: bodies
    // ========================================================================

    /// Generate every function of a global scope and its start function
    #[tracing::instrument(level = "debug", skip_all, fields(scope = %global))]
    fn generate_global(&mut self, global: ScopeId) -> SemanticResult<FuncId> {
        let program = self.program;
        let scope = program
            .scope(global)
            .ok_or_else(|| SemanticError::internal(format!("unknown scope {}", global)))?;
        let module = scope.name();
        self.file = scope
            .global()
            .map(|g| g.file.clone())
            .unwrap_or_else(|| module.clone());

        self.push_frame(global, None, false);
        for ns in module_scopes(program, global) {
            for function in program.nested_functions(ns) {
                let func = self.function_for(function)?;
                self.generate_function(func)?;
            }
        }

        let ty = self
            .types
            .function_type(FunctionType::new(Vec::new(), ValueTypeId::VOID));
        let mut node = FunctionDeclareNode::new(FuncId::new(0), format!("{}|start", module), FunctionKind::Start, ty);
        node.flags.is_start = true;
        node.scope = Some(global);
        let start = self.new_function(node);
        self.start_functions.insert(global, start);
        self.finalize_slots(start);

        self.push_frame(global, Some(start), true);
        let mut list = crate::build::NodeList::new();
        let result = scope
            .statements
            .iter()
            .try_for_each(|stmt| self.build_stmt(stmt, &mut list));
        self.pop_frame()?;
        result?;
        self.finish_body(start, list.finish())?;
        self.pop_frame()?;
        Ok(start)
    }

    // ========================================================================
    // Phase 5: specializations
    // ========================================================================

    fn generate_specializations(&mut self) -> SemanticResult<()> {
        let program = self.program;
        while self.has_pending_specializations() {
            for func in self.take_specializations() {
                let Some(scope) = self.function(func).scope else {
                    continue;
                };
                let global = program.global_of(scope);
                if let Some(file) = program.scope(global).and_then(|s| s.global()) {
                    self.file = file.file.clone();
                }
                let substitution = self.specialization_substitution(func);
                let previous = self.set_substitution(substitution);
                self.push_frame(global, None, false);
                let result = self.generate_function(func);
                self.pop_frame()?;
                self.set_substitution(previous);
                result?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Phase 6: finish
    // ========================================================================

    fn finish_build(
        mut self,
        entry: Option<FuncId>,
        imports: Vec<ExternModule>,
        exports: Vec<ExternModule>,
    ) -> SemanticResult<ModuleNode> {
        self.clear_pass_state();
        let enums = self
            .registry
            .enums()
            .iter()
            .map(|e| self.registry.get(*e))
            .collect::<SemanticResult<Vec<_>>>()?;
        let name = entry
            .and_then(|e| self.function(e).scope)
            .and_then(|s| self.program.scope(s))
            .map(|s| s.name())
            .unwrap_or_default();
        tracing::debug!(
            module = %name,
            functions = self.functions.len(),
            descriptions = self.objects.descriptions().len(),
            shapes = self.objects.shapes().len(),
            "finished build"
        );
        Ok(ModuleNode {
            name,
            types: self.types,
            objects: self.objects,
            vars: self.vars,
            functions: self.functions,
            contexts: self.contexts,
            globals: self.globals,
            enums,
            imports,
            exports,
            entry,
            entry_name: self.config.entry.clone(),
        })
    }
}

/// A global scope and the namespaces nested in it, outermost first
fn module_scopes(program: &Program, global: ScopeId) -> Vec<ScopeId> {
    let mut out = vec![global];
    let mut i = 0;
    while i < out.len() {
        if let Some(scope) = program.scope(out[i]) {
            out.extend(
                scope
                    .children
                    .iter()
                    .copied()
                    .filter(|c| matches!(program.scope(*c).map(|s| &s.kind), Some(ScopeKind::Namespace(_)))),
            );
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tswasm_frontend::{Expr, FunctionSignature, ProgramBuilder, Stmt};

    #[test]
    fn test_module_scopes_include_namespaces() {
        let mut b = ProgramBuilder::new();
        let g = b.global("main");
        let ns = b.namespace(g, "util");
        let inner = b.namespace(ns, "deep");
        let block = b.block(g);
        let program = b.finish();
        let scopes = module_scopes(&program, g);
        assert_eq!(scopes, vec![g, ns, inner]);
        assert!(!scopes.contains(&block));
    }

    #[test]
    fn test_start_function_is_entry() {
        let mut b = ProgramBuilder::new();
        let g = b.global("main");
        let x = b.var(g, "x", TypeId::NUMBER);
        b.set_init(x, Expr::number(1.5));
        b.stmt(g, Stmt::var(vec![x]));
        let fty = b.function_type(FunctionSignature::new(vec![], TypeId::VOID));
        b.function(g, "f", fty, vec![]);
        let program = b.finish();

        let module = build_module(&program, &BuildConfig::default()).unwrap();
        let entry = module.entry.and_then(|e| module.function(e)).unwrap();
        assert_eq!(entry.name, "main|start");
        assert!(entry.flags.is_start);
        assert_eq!(module.entry_name, "_entry");
        // a literal initializer becomes the global's initial value
        let global = module.global_by_name("x").unwrap();
        assert!(global.init.is_some());
        assert!(entry.body.as_ref().unwrap().values.is_empty());
        assert!(module.function_by_name("f").unwrap().body.is_some());
    }
}
