//! Statement lowering

use tswasm_frontend::{BinaryOp, CatchClause, Expr, ScopeId, Stmt, StmtKind, SwitchClause, VarKey};

use crate::context::BuildContext;
use crate::error::{SemanticError, SemanticResult};
use crate::flatten::LocalAllocator;
use crate::nodes::{CaptureMode, CaseClause, FunctionKind, SemanticsNode, VarId};
use crate::types::ValueTypeId;
use crate::value::{IterationKind, SemanticsValue, ValueKind};

use super::NodeList;

impl BuildContext<'_> {
    /// Lower one statement onto `list`
    pub(crate) fn build_stmt(&mut self, stmt: &Stmt, list: &mut NodeList) -> SemanticResult<()> {
        self.build_stmt_kind(stmt, list).map_err(|e| match stmt.span {
            Some(span) => e.located(&self.file, span, stmt),
            None => e,
        })
    }

    /// Lower a statement that must stand as a single node
    fn build_stmt_node(&mut self, stmt: &Stmt) -> SemanticResult<SemanticsNode> {
        let mut list = NodeList::new();
        self.build_stmt(stmt, &mut list)?;
        let mut nodes = list.finish();
        if nodes.len() == 1 {
            if let Some(node) = nodes.pop() {
                return Ok(node);
            }
        }
        Ok(SemanticsNode::Block {
            vars: Vec::new(),
            body: nodes,
        })
    }

    fn build_stmts(&mut self, stmts: &[Stmt]) -> SemanticResult<NodeList> {
        let mut list = NodeList::new();
        for stmt in stmts {
            self.build_stmt(stmt, &mut list)?;
        }
        Ok(list)
    }

    fn build_stmt_kind(&mut self, stmt: &Stmt, list: &mut NodeList) -> SemanticResult<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.build_expr(expr)?;
                list.push_value(value);
            }
            StmtKind::Var(keys) => {
                for key in keys {
                    self.build_var_init(*key, list)?;
                }
            }
            StmtKind::Block { scope, stmts } => {
                let (vars, inner) = self.in_scope(*scope, |ctx| {
                    let vars = ctx.scope_vars(*scope);
                    Ok((vars, ctx.build_stmts(stmts)?))
                })?;
                if vars.is_empty() {
                    list.extend(inner);
                } else {
                    list.push_node(SemanticsNode::Block {
                        vars,
                        body: inner.finish(),
                    });
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.build_condition(cond)?;
                let then_branch = Box::new(self.build_stmt_node(then_branch)?);
                let else_branch = match else_branch {
                    Some(e) => Some(Box::new(self.build_stmt_node(e)?)),
                    None => None,
                };
                list.push_node(SemanticsNode::If {
                    cond,
                    then_branch,
                    else_branch,
                });
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.build_return_value(expr)?),
                    None => None,
                };
                list.push_node(SemanticsNode::Return(value));
            }
            StmtKind::While { cond, body } => {
                let cond = self.build_condition(cond)?;
                let body = Box::new(self.build_stmt_node(body)?);
                list.push_node(SemanticsNode::While { cond, body });
            }
            StmtKind::DoWhile { body, cond } => {
                let body = Box::new(self.build_stmt_node(body)?);
                let cond = self.build_condition(cond)?;
                list.push_node(SemanticsNode::DoWhile { body, cond });
            }
            StmtKind::For {
                scope,
                init,
                cond,
                next,
                body,
            } => {
                let node = self.in_scope(*scope, |ctx| {
                    let vars = ctx.scope_vars(*scope);
                    let init = match init {
                        Some(init) => ctx.build_stmts(std::slice::from_ref(init.as_ref()))?.finish(),
                        None => Vec::new(),
                    };
                    let cond = match cond {
                        Some(c) => Some(ctx.build_condition(c)?),
                        None => None,
                    };
                    let next = match next {
                        Some(n) => Some(ctx.build_expr(n)?),
                        None => None,
                    };
                    let body = Box::new(ctx.build_stmt_node(body)?);
                    let rebinding = vars
                        .iter()
                        .copied()
                        .filter(|v| ctx.var(*v).capture == CaptureMode::ByRef)
                        .collect();
                    Ok(SemanticsNode::For {
                        vars,
                        init,
                        cond,
                        next,
                        body,
                        rebinding,
                    })
                })?;
                list.push_node(node);
            }
            StmtKind::ForIn {
                scope,
                var,
                object,
                body,
            } => {
                let node = self.build_for_each(IterationKind::In, *scope, *var, object, body)?;
                list.push_node(node);
            }
            StmtKind::ForOf {
                scope,
                var,
                iterable,
                body,
            } => {
                let node = self.build_for_each(IterationKind::Of, *scope, *var, iterable, body)?;
                list.push_node(node);
            }
            StmtKind::Switch {
                discriminant,
                clauses,
            } => {
                let node = self.build_switch(discriminant, clauses)?;
                list.push_node(node);
            }
            StmtKind::Break(label) => list.push_node(SemanticsNode::Break(label.clone())),
            StmtKind::Continue(label) => list.push_node(SemanticsNode::Continue(label.clone())),
            StmtKind::Labeled { label, body } => {
                let body = Box::new(self.build_stmt_node(body)?);
                list.push_node(SemanticsNode::Labeled {
                    label: label.clone(),
                    body,
                });
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                self.require_exceptions("try statement")?;
                let node = self.build_try(block, catch.as_ref(), finally.as_deref())?;
                list.push_node(node);
            }
            StmtKind::Throw(expr) => {
                self.require_exceptions("throw statement")?;
                let value = self.build_expr_as(expr, ValueTypeId::ANY)?;
                list.push_node(SemanticsNode::Throw(value));
            }
            // hoisted: the closure is created at the top of the enclosing body
            StmtKind::FunctionDecl(_) => {}
            StmtKind::Namespace(scope) => {
                let program = self.program;
                let stmts = program
                    .scope(*scope)
                    .map(|s| s.statements.as_slice())
                    .unwrap_or_default();
                let inner = self.in_scope(Some(*scope), |ctx| ctx.build_stmts(stmts))?;
                list.extend(inner);
            }
            StmtKind::Empty => {}
            StmtKind::Unsupported(text) => return Err(SemanticError::unsupported(text.clone())),
        }
        Ok(())
    }

    /// Initializer of one declared variable. Literal initializers of module
    /// globals become the global's constant initial value.
    fn build_var_init(&mut self, key: VarKey, list: &mut NodeList) -> SemanticResult<()> {
        let program = self.program;
        let Some(init) = program.variable(key).and_then(|v| v.init.as_ref()) else {
            return Ok(());
        };
        let var = self.var_of(key)?;
        let ty = self.var(var).ty;
        let value = self.build_expr_as(init, ty)?;

        let in_start = self
            .current_function()
            .is_some_and(|f| self.function(f).kind == FunctionKind::Start);
        if in_start && self.var(var).storage.is_global() {
            if let ValueKind::Literal(_) = value.kind {
                self.var_mut(var).init = Some(value);
                return Ok(());
            }
        }
        list.push_value(SemanticsValue::assign(var, value));
        Ok(())
    }

    fn build_return_value(&mut self, expr: &Expr) -> SemanticResult<SemanticsValue> {
        let ty = self
            .current_function()
            .and_then(|f| self.types.return_type(self.function(f).ty));
        match ty {
            Some(ty) if ty != ValueTypeId::VOID => self.build_expr_as(expr, ty),
            _ => self.build_expr(expr),
        }
    }

    fn build_for_each(
        &mut self,
        kind: IterationKind,
        scope: Option<ScopeId>,
        key: VarKey,
        source: &Expr,
        body: &Stmt,
    ) -> SemanticResult<SemanticsNode> {
        self.in_scope(scope, |ctx| {
            let vars = ctx.scope_vars(scope);
            let var = ctx.var_of(key)?;
            let var_type = ctx.var(var).ty;
            let source = ctx.build_expr(source)?;
            let iterable = match kind {
                IterationKind::In => {
                    SemanticsValue::new(ValueKind::EnumerateKeys(Box::new(source)), ValueTypeId::ANY)
                }
                IterationKind::Of => source,
            };
            let iterator = ctx.alloc_local("iter", ValueTypeId::ANY)?;
            let init = SemanticsValue::new(
                ValueKind::IteratorNew {
                    kind,
                    iterable: Box::new(iterable),
                },
                ValueTypeId::ANY,
            );
            let body = Box::new(ctx.build_stmt_node(body)?);
            Ok(SemanticsNode::ForEach {
                vars,
                iterator,
                init,
                var,
                var_type,
                body,
            })
        })
    }

    /// `switch` evaluates its discriminant once into a temporary; each case
    /// test is a strict comparison against it
    fn build_switch(&mut self, discriminant: &Expr, clauses: &[SwitchClause]) -> SemanticResult<SemanticsNode> {
        let value = self.build_expr(discriminant)?;
        let temp: VarId = self.alloc_local("switch", value.ty)?;
        let temp_ty = value.ty;
        let init = SemanticsValue::assign(temp, value);

        let mut cases = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let test = match &clause.test {
                Some(expr) => {
                    let case = self.build_expr(expr)?;
                    let current = SemanticsValue::var(temp, temp_ty);
                    Some(self.binary_value(BinaryOp::StrictEq, current, case, ValueTypeId::BOOLEAN)?)
                }
                None => None,
            };
            let body = self
                .in_scope(clause.scope, |ctx| {
                    let vars = ctx.scope_vars(clause.scope);
                    let body = ctx.build_stmts(&clause.body)?.finish();
                    Ok(if vars.is_empty() {
                        body
                    } else {
                        vec![SemanticsNode::Block { vars, body }]
                    })
                })?;
            cases.push(CaseClause { test, body });
        }
        Ok(SemanticsNode::Switch {
            init,
            clauses: cases,
        })
    }

    fn build_try(
        &mut self,
        block: &Stmt,
        catch: Option<&CatchClause>,
        finally: Option<&Stmt>,
    ) -> SemanticResult<SemanticsNode> {
        let block = Box::new(self.build_stmt_node(block)?);
        let (catch_var, catch) = match catch {
            Some(clause) => self.in_scope(clause.scope, |ctx| {
                let var = match clause.var {
                    Some(key) => Some(ctx.var_of(key)?),
                    None => None,
                };
                Ok((var, Some(Box::new(ctx.build_stmt_node(&clause.body)?))))
            })?,
            None => (None, None),
        };
        let finally = match finally {
            Some(f) => Some(Box::new(self.build_stmt_node(f)?)),
            None => None,
        };
        Ok(SemanticsNode::Try {
            block,
            catch_var,
            catch,
            finally,
        })
    }

    fn require_exceptions(&self, what: &str) -> SemanticResult<()> {
        if self.config.enable_exception {
            Ok(())
        } else {
            Err(SemanticError::unsupported(format!(
                "{} (exception handling is disabled)",
                what
            )))
        }
    }
}
