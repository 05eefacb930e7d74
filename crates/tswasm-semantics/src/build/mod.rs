//! Value/Statement Builder
//!
//! Lowers the front end's expression and statement trees into semantic
//! values and structured nodes, then hands each function body to the
//! flattener.
//!
//! Function bodies are generated depth-first: a function's frame stays on the
//! resolution stack while its nested functions are generated, so every
//! closure copy a nested function needs exists before the enclosing body
//! (which creates the closures) is lowered.

mod cast;
mod expr;
mod stmt;

use tswasm_frontend::{ScopeId, VarKey};

use crate::context::{BuildContext, RefMode, SymbolKey, SymbolValue};
use crate::error::{SemanticError, SemanticResult};
use crate::flatten::flatten_function;
use crate::nodes::{CaptureMode, FuncId, SemanticsNode, VarId};
use crate::value::{ClosureInit, SemanticsValue, ValueKind};

/// Statement list under construction; pure values are coalesced into one
/// basic node until a control-bearing statement arrives
#[derive(Debug, Default)]
pub(crate) struct NodeList {
    nodes: Vec<SemanticsNode>,
    pending: Vec<SemanticsValue>,
}

impl NodeList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_value(&mut self, value: SemanticsValue) {
        self.pending.push(value);
    }

    pub(crate) fn push_node(&mut self, node: SemanticsNode) {
        self.flush();
        self.nodes.push(node);
    }

    pub(crate) fn extend(&mut self, other: NodeList) {
        for node in other.finish() {
            match node {
                SemanticsNode::Basic(values) => self.pending.extend(values),
                node => self.push_node(node),
            }
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.nodes
                .push(SemanticsNode::Basic(std::mem::take(&mut self.pending)));
        }
    }

    pub(crate) fn finish(mut self) -> Vec<SemanticsNode> {
        self.flush();
        self.nodes
    }
}

impl BuildContext<'_> {
    /// Run `f` with the reference mode set to `mode`
    pub(crate) fn with_ref<T>(
        &mut self,
        mode: RefMode,
        f: impl FnOnce(&mut Self) -> SemanticResult<T>,
    ) -> SemanticResult<T> {
        self.push_ref(mode);
        let result = f(self);
        self.pop_ref();
        result
    }

    /// Run `f` inside a frame for `scope` that belongs to the current function
    pub(crate) fn in_scope<T>(
        &mut self,
        scope: Option<ScopeId>,
        f: impl FnOnce(&mut Self) -> SemanticResult<T>,
    ) -> SemanticResult<T> {
        let Some(scope) = scope else {
            return f(self);
        };
        let function = self.current_function();
        self.push_frame(scope, function, false);
        let result = f(self);
        self.pop_frame()?;
        result
    }

    /// Declaration standing for a source variable
    pub(crate) fn var_of(&mut self, key: VarKey) -> SemanticResult<VarId> {
        match self.resolve(SymbolKey::Var(key))? {
            Some(SymbolValue::Var(var)) => Ok(var),
            _ => Err(SemanticError::SymbolResolution {
                lookup: crate::error::LookupKind::Identifier,
                name: self
                    .program
                    .variable(key)
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| format!("{:?}", key)),
                scope: self.scope_name(),
            }),
        }
    }

    /// Function-owned declarations of the variables a block scope declares;
    /// module globals are not block-scoped and are left out
    pub(crate) fn scope_vars(&self, scope: Option<ScopeId>) -> Vec<VarId> {
        let (Some(scope), Some(func)) = (scope, self.current_function()) else {
            return Vec::new();
        };
        let Some(s) = self.program.scope(scope) else {
            return Vec::new();
        };
        let keys = s.var_keys();
        self.function(func)
            .var_keys
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(_, v)| *v)
            .collect()
    }

    /// Generate the body of `func` and, first, of every function nested in it
    #[tracing::instrument(level = "debug", skip_all, fields(function = %self.function(func).name))]
    pub(crate) fn generate_function(&mut self, func: FuncId) -> SemanticResult<()> {
        if self.function(func).body.is_some() {
            return Ok(());
        }
        let Some(scope) = self.function(func).scope else {
            return Err(SemanticError::internal(format!(
                "function `{}` has no source scope",
                self.function(func).name
            )));
        };

        self.push_frame(scope, Some(func), true);
        let result = self.generate_in_frame(func, scope);
        self.pop_frame()?;
        result
    }

    fn generate_in_frame(&mut self, func: FuncId, scope: ScopeId) -> SemanticResult<()> {
        let var_keys = self.function(func).var_keys.clone();
        for (key, var) in var_keys {
            self.declare_symbol(SymbolKey::Var(key), SymbolValue::Var(var));
        }
        let nested = self.program.nested_functions(scope);
        for child in &nested {
            if let Some(hidden) = self.nested_function_vars.get(child).copied() {
                self.declare_symbol(SymbolKey::Function(*child), SymbolValue::Var(hidden));
            }
        }

        for child in &nested {
            if let Some(child_func) = self.function_of_scope.get(child).copied() {
                self.generate_function(child_func)?;
            }
        }
        self.finalize_slots(func);

        let mut list = NodeList::new();
        for child in &nested {
            let Some(hidden) = self.nested_function_vars.get(child).copied() else {
                continue;
            };
            if let Some(child_func) = self.function_of_scope.get(child).copied() {
                let closure = self.closure_value(child_func);
                list.push_value(SemanticsValue::assign(hidden, closure));
            }
        }
        let program = self.program;
        let statements = program
            .scope(scope)
            .map(|s| s.statements.as_slice())
            .unwrap_or_default();
        for stmt in statements {
            self.build_stmt(stmt, &mut list)?;
        }
        self.finish_body(func, list.finish())
    }

    /// Flatten a lowered body into `func`'s root block
    pub(crate) fn finish_body(&mut self, func: FuncId, nodes: Vec<SemanticsNode>) -> SemanticResult<()> {
        let mut root = flatten_function(self, nodes)?;
        let f = self.function(func);
        root.var_list = f.locals.clone();
        root.ref_list = f
            .params
            .iter()
            .chain(f.locals.iter())
            .copied()
            .filter(|v| {
                let var = self.var(*v);
                var.capture == CaptureMode::ByRef && !var.storage.is_closure()
            })
            .collect();
        let closure_init = f
            .closure_vars
            .iter()
            .filter_map(|v| {
                let var = self.var(*v);
                Some(ClosureInit {
                    slot: var.closure_index?,
                    from: var.origin?,
                })
            })
            .collect();

        let f = self.function_mut(func);
        f.closure_init = closure_init;
        f.body = Some(root);
        tracing::debug!(
            function = %f.name,
            locals = f.locals.len(),
            closure_vars = f.closure_vars.len(),
            "generated function body"
        );
        Ok(())
    }

    /// Closure creation for a generated nested function
    pub(crate) fn closure_value(&self, func: FuncId) -> SemanticsValue {
        let f = self.function(func);
        SemanticsValue::new(
            ValueKind::NewClosure {
                func,
                init: f.closure_init.clone(),
            },
            f.ty,
        )
    }
}
