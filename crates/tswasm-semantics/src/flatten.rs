//! Control-Flow Flattener
//!
//! Rewrites the structured statement nodes of one function body into a tree
//! of blocks and branches:
//!
//! - [`BlockValue`]: a named scope boundary. Branching to a loop block
//!   restarts it, branching to any other block leaves it.
//! - `BlockBranch`: unconditional exit to an enclosing block.
//! - `BlockBranchIf`: exit taken when the condition evaluates to `when`.
//!
//! Every branch target is a block on the active stack when the branch is
//! emitted. Labels carry the construct kind and a per-function counter, so
//! they are unique within one function.
//!
//! ```text
//! if (c) T else F      if_N { if_false_N { if_true_N { br_if_not c if_false_N; T; br if_N } } F }
//! while (c) B          while_N { loop_N* { br_if_not c while_N; B; br loop_N } }
//! do B while (c)       do_N { loop_N* { do_body_N { B } br_if c loop_N } }
//! for (i; c; n) B      for_N { i; loop_N* { br_if_not c for_N; for_body_N { B } n; br loop_N } }
//! switch               switch_N { init; caseK_N { ... case0_N { tests } body0 ... } bodyK }
//! ```
//!
//! `try` keeps its structure and maps onto the target's native exception
//! regions.

use crate::error::{SemanticError, SemanticResult};
use crate::nodes::{CaseClause, SemanticsNode, VarId};
use crate::types::ValueTypeId;
use crate::value::{BlockId, BlockValue, IterationKind, SemanticsValue, TryValue, ValueKind};

/// Source of compiler-generated locals for the function being flattened
pub trait LocalAllocator {
    fn alloc_local(&mut self, hint: &str, ty: ValueTypeId) -> SemanticResult<VarId>;
}

/// Flatten a function body into its root block
#[tracing::instrument(level = "debug", skip_all, fields(nodes = nodes.len()))]
pub fn flatten_function<A: LocalAllocator>(
    alloc: &mut A,
    nodes: Vec<SemanticsNode>,
) -> SemanticResult<BlockValue> {
    let mut flattener = Flattener::new(alloc);
    let mut root = flattener.new_block("root".to_string(), false);
    flattener.enter(root.id);
    flattener.flatten_all(nodes, &mut root.values)?;
    flattener.leave();
    tracing::debug!(blocks = flattener.next_block, "flattened function body");
    Ok(root)
}

/// Rewrite a conditional expression in statement position as an `if`
pub fn flatten_condition(value: SemanticsValue) -> Result<SemanticsNode, SemanticsValue> {
    match value.kind {
        ValueKind::Conditional {
            cond,
            when_true,
            when_false,
        } => Ok(SemanticsNode::If {
            cond: *cond,
            then_branch: Box::new(SemanticsNode::Basic(vec![*when_true])),
            else_branch: Some(Box::new(SemanticsNode::Basic(vec![*when_false]))),
        }),
        kind => Err(SemanticsValue {
            kind,
            ty: value.ty,
            shape: value.shape,
            location: value.location,
        }),
    }
}

/// Where `break` and `continue` of one construct go
#[derive(Debug, Clone)]
struct Target {
    label: Option<String>,
    break_to: BlockId,
    continue_to: Option<BlockId>,
    /// Loops and switches take an unlabeled `break`
    plain: bool,
}

struct Flattener<'a, A> {
    alloc: &'a mut A,
    next_block: u32,
    next_label: u32,
    targets: Vec<Target>,
    open: Vec<BlockId>,
    /// Label of a labeled statement, claimed by the loop or switch it wraps
    pending_label: Option<String>,
}

impl<'a, A: LocalAllocator> Flattener<'a, A> {
    fn new(alloc: &'a mut A) -> Self {
        Self {
            alloc,
            next_block: 0,
            next_label: 0,
            targets: Vec::new(),
            open: Vec::new(),
            pending_label: None,
        }
    }

    fn new_block(&mut self, label: String, is_loop: bool) -> BlockValue {
        let id = BlockId::new(self.next_block);
        self.next_block += 1;
        BlockValue::new(id, label, is_loop)
    }

    fn label_index(&mut self) -> u32 {
        let n = self.next_label;
        self.next_label += 1;
        n
    }

    fn enter(&mut self, block: BlockId) {
        self.open.push(block);
    }

    fn leave(&mut self) {
        self.open.pop();
    }

    fn check_open(&self, target: BlockId) -> SemanticResult<()> {
        if self.open.contains(&target) {
            Ok(())
        } else {
            Err(SemanticError::internal(format!(
                "branch to {} which is not an enclosing block",
                target
            )))
        }
    }

    fn branch(&self, target: BlockId) -> SemanticResult<SemanticsValue> {
        self.check_open(target)?;
        Ok(SemanticsValue::branch(target))
    }

    fn branch_if(&self, target: BlockId, cond: SemanticsValue, when: bool) -> SemanticResult<SemanticsValue> {
        self.check_open(target)?;
        Ok(SemanticsValue::branch_if(target, cond, when))
    }

    fn flatten_all(&mut self, nodes: Vec<SemanticsNode>, out: &mut Vec<SemanticsValue>) -> SemanticResult<()> {
        for node in nodes {
            self.flatten(node, out)?;
        }
        Ok(())
    }

    fn flatten(&mut self, node: SemanticsNode, out: &mut Vec<SemanticsValue>) -> SemanticResult<()> {
        match node {
            SemanticsNode::Basic(values) => {
                for value in values {
                    match flatten_condition(value) {
                        Ok(node) => self.flatten(node, out)?,
                        Err(value) => out.push(value),
                    }
                }
            }
            SemanticsNode::Block { vars, body } => {
                if vars.is_empty() {
                    self.flatten_all(body, out)?;
                } else {
                    let n = self.label_index();
                    let mut block = self.new_block(format!("block_{}", n), false);
                    block.var_list = vars;
                    self.enter(block.id);
                    self.flatten_all(body, &mut block.values)?;
                    self.leave();
                    out.push(SemanticsValue::block(block));
                }
            }
            SemanticsNode::If {
                cond,
                then_branch,
                else_branch,
            } => self.flatten_if(cond, *then_branch, else_branch.map(|e| *e), out)?,
            SemanticsNode::While { cond, body } => self.flatten_while(cond, *body, out)?,
            SemanticsNode::DoWhile { body, cond } => self.flatten_do_while(*body, cond, out)?,
            SemanticsNode::For {
                vars,
                init,
                cond,
                next,
                body,
                rebinding,
            } => self.flatten_for(vars, init, cond, next, *body, rebinding, out)?,
            SemanticsNode::ForEach {
                vars,
                iterator,
                init,
                var,
                var_type,
                body,
            } => self.flatten_for_each(vars, iterator, init, var, var_type, *body, out)?,
            SemanticsNode::Switch { init, clauses } => self.flatten_switch(init, clauses, out)?,
            SemanticsNode::Break(label) => {
                let target = self
                    .targets
                    .iter()
                    .rev()
                    .find(|t| match &label {
                        Some(l) => t.label.as_deref() == Some(l.as_str()),
                        None => t.plain,
                    })
                    .map(|t| t.break_to);
                match target {
                    Some(target) => out.push(self.branch(target)?),
                    None => {
                        return Err(SemanticError::FlattenTarget {
                            statement: SemanticsNode::Break(label.clone()).describe(),
                            label,
                        })
                    }
                }
            }
            SemanticsNode::Continue(label) => {
                let target = self
                    .targets
                    .iter()
                    .rev()
                    .filter(|t| t.continue_to.is_some())
                    .find(|t| match &label {
                        Some(l) => t.label.as_deref() == Some(l.as_str()),
                        None => true,
                    })
                    .and_then(|t| t.continue_to);
                match target {
                    Some(target) => out.push(self.branch(target)?),
                    None => {
                        return Err(SemanticError::FlattenTarget {
                            statement: SemanticsNode::Continue(label.clone()).describe(),
                            label,
                        })
                    }
                }
            }
            SemanticsNode::Labeled { label, body } => match *body {
                body @ (SemanticsNode::While { .. }
                | SemanticsNode::DoWhile { .. }
                | SemanticsNode::For { .. }
                | SemanticsNode::ForEach { .. }
                | SemanticsNode::Switch { .. }) => {
                    self.pending_label = Some(label);
                    self.flatten(body, out)?;
                }
                body => {
                    let n = self.label_index();
                    let mut block = self.new_block(format!("label_{}", n), false);
                    self.enter(block.id);
                    self.targets.push(Target {
                        label: Some(label),
                        break_to: block.id,
                        continue_to: None,
                        plain: false,
                    });
                    self.flatten(body, &mut block.values)?;
                    self.targets.pop();
                    self.leave();
                    out.push(SemanticsValue::block(block));
                }
            },
            SemanticsNode::Try {
                block,
                catch_var,
                catch,
                finally,
            } => self.flatten_try(*block, catch_var, catch.map(|c| *c), finally.map(|f| *f), out)?,
            SemanticsNode::Throw(value) => {
                out.push(SemanticsValue::new(ValueKind::Throw(Box::new(value)), ValueTypeId::VOID))
            }
            SemanticsNode::Return(value) => out.push(SemanticsValue::new(
                ValueKind::Return(value.map(Box::new)),
                ValueTypeId::VOID,
            )),
        }
        Ok(())
    }

    // ── Conditionals ────────────────────────────────────────────────────

    fn flatten_if(
        &mut self,
        cond: SemanticsValue,
        then_branch: SemanticsNode,
        else_branch: Option<SemanticsNode>,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let mut outer = self.new_block(format!("if_{}", n), false);
        self.enter(outer.id);
        match else_branch {
            Some(else_branch) => {
                let mut when_false = self.new_block(format!("if_false_{}", n), false);
                let mut when_true = self.new_block(format!("if_true_{}", n), false);
                self.enter(when_false.id);
                self.enter(when_true.id);
                when_true.values.push(self.branch_if(when_false.id, cond, false)?);
                self.flatten(then_branch, &mut when_true.values)?;
                when_true.values.push(self.branch(outer.id)?);
                self.leave();
                when_false.values.push(SemanticsValue::block(when_true));
                self.leave();
                outer.values.push(SemanticsValue::block(when_false));
                self.flatten(else_branch, &mut outer.values)?;
            }
            None => {
                let mut when_true = self.new_block(format!("if_true_{}", n), false);
                self.enter(when_true.id);
                when_true.values.push(self.branch_if(outer.id, cond, false)?);
                self.flatten(then_branch, &mut when_true.values)?;
                when_true.values.push(self.branch(outer.id)?);
                self.leave();
                outer.values.push(SemanticsValue::block(when_true));
            }
        }
        self.leave();
        out.push(SemanticsValue::block(outer));
        Ok(())
    }

    // ── Loops ───────────────────────────────────────────────────────────

    fn flatten_while(
        &mut self,
        cond: SemanticsValue,
        body: SemanticsNode,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let label = self.pending_label.take();
        let mut outer = self.new_block(format!("while_{}", n), false);
        let mut looped = self.new_block(format!("loop_{}", n), true);
        self.enter(outer.id);
        self.enter(looped.id);
        self.targets.push(Target {
            label,
            break_to: outer.id,
            continue_to: Some(looped.id),
            plain: true,
        });
        looped.values.push(self.branch_if(outer.id, cond, false)?);
        self.flatten(body, &mut looped.values)?;
        looped.values.push(self.branch(looped.id)?);
        self.targets.pop();
        self.leave();
        self.leave();
        outer.values.push(SemanticsValue::block(looped));
        out.push(SemanticsValue::block(outer));
        Ok(())
    }

    fn flatten_do_while(
        &mut self,
        body: SemanticsNode,
        cond: SemanticsValue,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let label = self.pending_label.take();
        let mut outer = self.new_block(format!("do_{}", n), false);
        let mut looped = self.new_block(format!("loop_{}", n), true);
        let mut inner = self.new_block(format!("do_body_{}", n), false);
        self.enter(outer.id);
        self.enter(looped.id);
        self.enter(inner.id);
        self.targets.push(Target {
            label,
            break_to: outer.id,
            continue_to: Some(inner.id),
            plain: true,
        });
        self.flatten(body, &mut inner.values)?;
        self.targets.pop();
        self.leave();
        looped.values.push(SemanticsValue::block(inner));
        looped.values.push(self.branch_if(looped.id, cond, true)?);
        self.leave();
        self.leave();
        outer.values.push(SemanticsValue::block(looped));
        out.push(SemanticsValue::block(outer));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten_for(
        &mut self,
        vars: Vec<VarId>,
        init: Vec<SemanticsNode>,
        cond: Option<SemanticsValue>,
        next: Option<SemanticsValue>,
        body: SemanticsNode,
        rebinding: Vec<VarId>,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let label = self.pending_label.take();
        let mut outer = self.new_block(format!("for_{}", n), false);
        outer.var_list = vars;
        self.enter(outer.id);
        self.flatten_all(init, &mut outer.values)?;

        let mut looped = self.new_block(format!("loop_{}", n), true);
        let mut inner = self.new_block(format!("for_body_{}", n), false);
        self.enter(looped.id);
        if let Some(cond) = cond {
            looped.values.push(self.branch_if(outer.id, cond, false)?);
        }
        self.enter(inner.id);
        self.targets.push(Target {
            label,
            break_to: outer.id,
            continue_to: Some(inner.id),
            plain: true,
        });
        self.flatten(body, &mut inner.values)?;
        self.targets.pop();
        self.leave();
        looped.values.push(SemanticsValue::block(inner));
        if !rebinding.is_empty() {
            looped
                .values
                .push(SemanticsValue::new(ValueKind::Rebinding(rebinding), ValueTypeId::VOID));
        }
        if let Some(next) = next {
            looped.values.push(next);
        }
        looped.values.push(self.branch(looped.id)?);
        self.leave();
        outer.values.push(SemanticsValue::block(looped));
        self.leave();
        out.push(SemanticsValue::block(outer));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten_for_each(
        &mut self,
        vars: Vec<VarId>,
        iterator: VarId,
        init: SemanticsValue,
        var: VarId,
        var_type: ValueTypeId,
        body: SemanticsNode,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let label = self.pending_label.take();
        let kind = match &init.kind {
            ValueKind::IteratorNew {
                kind: IterationKind::In,
                ..
            } => "forin",
            _ => "forof",
        };
        let mut outer = self.new_block(format!("{}_{}", kind, n), false);
        outer.var_list = vars;
        outer.values.push(SemanticsValue::assign(iterator, init));
        self.enter(outer.id);

        let mut looped = self.new_block(format!("loop_{}", n), true);
        let mut inner = self.new_block(format!("body_{}", n), false);
        self.enter(looped.id);
        let has_next = SemanticsValue::new(ValueKind::IteratorNext(iterator), ValueTypeId::BOOLEAN);
        looped.values.push(self.branch_if(outer.id, has_next, false)?);
        looped.values.push(SemanticsValue::assign(
            var,
            SemanticsValue::new(ValueKind::IteratorValue(iterator), var_type),
        ));
        self.enter(inner.id);
        self.targets.push(Target {
            label,
            break_to: outer.id,
            continue_to: Some(inner.id),
            plain: true,
        });
        self.flatten(body, &mut inner.values)?;
        self.targets.pop();
        self.leave();
        looped.values.push(SemanticsValue::block(inner));
        looped.values.push(self.branch(looped.id)?);
        self.leave();
        outer.values.push(SemanticsValue::block(looped));
        self.leave();
        out.push(SemanticsValue::block(outer));
        Ok(())
    }

    // ── Switch ──────────────────────────────────────────────────────────

    /// Case blocks nest from the last clause outwards; the innermost block
    /// holds the case tests in source order followed by the default branch.
    /// Branching to `caseI` leaves it and lands on clause I's body, so
    /// bodies without `break` fall through in source order.
    fn flatten_switch(
        &mut self,
        init: SemanticsValue,
        clauses: Vec<CaseClause>,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let label = self.pending_label.take();
        let mut outer = self.new_block(format!("switch_{}", n), false);
        outer.values.push(init);
        if clauses.is_empty() {
            out.push(SemanticsValue::block(outer));
            return Ok(());
        }

        let mut chain: Vec<BlockValue> = (0..clauses.len())
            .map(|i| self.new_block(format!("case{}_{}", i, n), false))
            .collect();
        self.enter(outer.id);
        for block in chain.iter().rev() {
            self.enter(block.id);
        }
        self.targets.push(Target {
            label,
            break_to: outer.id,
            continue_to: None,
            plain: true,
        });

        let mut default = None;
        let mut bodies = Vec::with_capacity(clauses.len());
        let mut dispatch = Vec::new();
        for (i, clause) in clauses.into_iter().enumerate() {
            match clause.test {
                Some(test) => dispatch.push(self.branch_if(chain[i].id, test, true)?),
                None => default = Some(chain[i].id),
            }
            bodies.push(clause.body);
        }
        dispatch.push(self.branch(default.unwrap_or(outer.id))?);

        chain.push(outer);
        let mut chain = chain.into_iter();
        let mut current = chain
            .next()
            .ok_or_else(|| SemanticError::internal("switch without case blocks"))?;
        current.values.extend(dispatch);
        self.leave();
        for body in bodies {
            let mut container = chain
                .next()
                .ok_or_else(|| SemanticError::internal("switch case chain ended early"))?;
            container.values.push(SemanticsValue::block(current));
            self.flatten_all(body, &mut container.values)?;
            self.leave();
            current = container;
        }
        self.targets.pop();
        out.push(SemanticsValue::block(current));
        Ok(())
    }

    // ── Exceptions ──────────────────────────────────────────────────────

    fn flatten_try(
        &mut self,
        block: SemanticsNode,
        catch_var: Option<VarId>,
        catch: Option<SemanticsNode>,
        finally: Option<SemanticsNode>,
        out: &mut Vec<SemanticsValue>,
    ) -> SemanticResult<()> {
        let n = self.label_index();
        let rethrow_flag = self.alloc.alloc_local("rethrow", ValueTypeId::BOOLEAN)?;
        let body = self.region(format!("try_{}", n), block)?;
        let catch = match catch {
            Some(node) => Some(self.region(format!("catch_{}", n), node)?),
            None => None,
        };
        let finally = match finally {
            Some(node) => Some(self.region(format!("finally_{}", n), node)?),
            None => None,
        };
        out.push(SemanticsValue::new(
            ValueKind::Try(Box::new(TryValue {
                body,
                catch_var,
                catch,
                finally,
                rethrow_flag,
            })),
            ValueTypeId::VOID,
        ));
        Ok(())
    }

    fn region(&mut self, label: String, node: SemanticsNode) -> SemanticResult<BlockValue> {
        let mut block = self.new_block(label, false);
        self.enter(block.id);
        self.flatten(node, &mut block.values)?;
        self.leave();
        Ok(block)
    }
}
