//! Control-flow flattening checked by execution
//!
//! Each case runs twice: once on the structured statements by a reference
//! interpreter with the usual `break`/`continue`/`return` semantics, once on
//! the flattened block tree, where loop blocks restart when branched to and
//! other blocks are left. Conditions are boolean variables fed from scripted
//! queues and every integer literal that executes is appended to a trace.
//! Both runs must agree on the trace, the way the body was left and the
//! conditions consumed.

use std::collections::VecDeque;

use pretty_assertions::assert_eq;
use rustc_hash::{FxHashMap, FxHashSet};
use tswasm_semantics::nodes::CaseClause;
use tswasm_semantics::value::{IterationKind, Literal, TryValue};
use tswasm_semantics::{
    flatten_function, BlockId, BlockValue, LocalAllocator, SemanticError, SemanticResult,
    SemanticsNode, SemanticsValue, ValueKind, ValueTypeId, VarId,
};

struct Temps(u32);

impl LocalAllocator for Temps {
    fn alloc_local(&mut self, _hint: &str, _ty: ValueTypeId) -> SemanticResult<VarId> {
        self.0 += 1;
        Ok(VarId::new(1000 + self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    Normal,
    Branch(BlockId),
    Break(Option<String>),
    Continue(Option<String>),
    Return,
    Throw,
}

const STEP_LIMIT: usize = 10_000;

struct Machine {
    conditions: FxHashMap<VarId, VecDeque<bool>>,
    trace: Vec<i64>,
    steps: usize,
}

impl Machine {
    fn new(script: &[(u32, &[bool])]) -> Self {
        let conditions = script
            .iter()
            .map(|(id, values)| (VarId::new(*id), values.iter().copied().collect()))
            .collect();
        Self {
            conditions,
            trace: Vec::new(),
            steps: 0,
        }
    }

    fn tick(&mut self) {
        self.steps += 1;
        assert!(self.steps < STEP_LIMIT, "code does not terminate");
    }

    fn pop(&mut self, var: VarId) -> bool {
        self.conditions
            .get_mut(&var)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("condition {} evaluated more often than scripted", var))
    }

    fn condition(&mut self, cond: &SemanticsValue) -> bool {
        match &cond.kind {
            ValueKind::Var(var) | ValueKind::IteratorNext(var) => self.pop(*var),
            _ => panic!("unexpected condition {}", cond),
        }
    }

    fn unused_conditions(&self) -> Vec<VarId> {
        let mut unused: Vec<VarId> = self
            .conditions
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(var, _)| *var)
            .collect();
        unused.sort();
        unused
    }

    // ── Flattened form ──────────────────────────────────────────────────

    fn block(&mut self, block: &BlockValue) -> Flow {
        loop {
            match self.values(&block.values) {
                Flow::Branch(target) if target == block.id && block.is_loop => continue,
                Flow::Branch(target) if target == block.id => return Flow::Normal,
                flow => return flow,
            }
        }
    }

    fn values(&mut self, values: &[SemanticsValue]) -> Flow {
        for value in values {
            self.tick();
            match &value.kind {
                ValueKind::Literal(Literal::Int(n)) => self.trace.push(*n),
                ValueKind::Block(inner) => match self.block(inner) {
                    Flow::Normal => {}
                    flow => return flow,
                },
                ValueKind::BlockBranch { target } => return Flow::Branch(*target),
                ValueKind::BlockBranchIf { target, cond, when } => {
                    if self.condition(cond) == *when {
                        return Flow::Branch(*target);
                    }
                }
                ValueKind::Try(region) => match self.try_region(region) {
                    Flow::Normal => {}
                    flow => return flow,
                },
                ValueKind::Throw(_) => return Flow::Throw,
                ValueKind::Return(_) => return Flow::Return,
                _ => {}
            }
        }
        Flow::Normal
    }

    fn try_region(&mut self, region: &TryValue) -> Flow {
        let mut flow = self.block(&region.body);
        if flow == Flow::Throw {
            if let Some(catch) = &region.catch {
                flow = self.block(catch);
            }
        }
        if let Some(finally) = &region.finally {
            let after = self.block(finally);
            if after != Flow::Normal {
                flow = after;
            }
        }
        flow
    }

    // ── Structured form ─────────────────────────────────────────────────

    fn nodes(&mut self, nodes: &[SemanticsNode]) -> Flow {
        for node in nodes {
            match self.node(node, None) {
                Flow::Normal => {}
                flow => return flow,
            }
        }
        Flow::Normal
    }

    fn node(&mut self, node: &SemanticsNode, label: Option<&str>) -> Flow {
        self.tick();
        match node {
            SemanticsNode::Basic(values) => {
                for value in values {
                    if let ValueKind::Literal(Literal::Int(n)) = value.kind {
                        self.trace.push(n);
                    }
                }
                Flow::Normal
            }
            SemanticsNode::Block { body, .. } => self.nodes(body),
            SemanticsNode::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.condition(cond) {
                    self.node(then_branch, None)
                } else if let Some(else_branch) = else_branch {
                    self.node(else_branch, None)
                } else {
                    Flow::Normal
                }
            }
            SemanticsNode::While { cond, body } => loop {
                if !self.condition(cond) {
                    return Flow::Normal;
                }
                if let Some(flow) = leave_loop(self.node(body, None), label) {
                    return flow;
                }
            },
            SemanticsNode::DoWhile { body, cond } => loop {
                if let Some(flow) = leave_loop(self.node(body, None), label) {
                    return flow;
                }
                if !self.condition(cond) {
                    return Flow::Normal;
                }
            },
            SemanticsNode::For {
                init,
                cond,
                next,
                body,
                ..
            } => {
                match self.nodes(init) {
                    Flow::Normal => {}
                    flow => return flow,
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.condition(cond) {
                            return Flow::Normal;
                        }
                    }
                    if let Some(flow) = leave_loop(self.node(body, None), label) {
                        return flow;
                    }
                    if let Some(ValueKind::Literal(Literal::Int(n))) = next.as_ref().map(|v| &v.kind) {
                        self.trace.push(*n);
                    }
                }
            }
            SemanticsNode::ForEach { iterator, body, .. } => loop {
                if !self.pop(*iterator) {
                    return Flow::Normal;
                }
                if let Some(flow) = leave_loop(self.node(body, None), label) {
                    return flow;
                }
            },
            SemanticsNode::Switch { clauses, .. } => {
                let matched = clauses
                    .iter()
                    .position(|c| c.test.as_ref().is_some_and(|t| self.condition(t)))
                    .or_else(|| clauses.iter().position(|c| c.test.is_none()));
                let Some(start) = matched else {
                    return Flow::Normal;
                };
                for clause in &clauses[start..] {
                    match self.nodes(&clause.body) {
                        Flow::Normal => {}
                        Flow::Break(None) => return Flow::Normal,
                        Flow::Break(Some(l)) if Some(l.as_str()) == label => return Flow::Normal,
                        flow => return flow,
                    }
                }
                Flow::Normal
            }
            SemanticsNode::Break(l) => Flow::Break(l.clone()),
            SemanticsNode::Continue(l) => Flow::Continue(l.clone()),
            SemanticsNode::Labeled { label, body } => match self.node(body, Some(label.as_str())) {
                Flow::Break(Some(l)) if &l == label => Flow::Normal,
                flow => flow,
            },
            SemanticsNode::Try {
                block,
                catch,
                finally,
                ..
            } => {
                let mut flow = self.node(block, None);
                if flow == Flow::Throw {
                    if let Some(catch) = catch {
                        flow = self.node(catch, None);
                    }
                }
                if let Some(finally) = finally {
                    let after = self.node(finally, None);
                    if after != Flow::Normal {
                        flow = after;
                    }
                }
                flow
            }
            SemanticsNode::Throw(_) => Flow::Throw,
            SemanticsNode::Return(_) => Flow::Return,
        }
    }
}

/// Flow a loop body ends with: `None` runs the next iteration, `Some` leaves
/// the loop with that flow
fn leave_loop(flow: Flow, label: Option<&str>) -> Option<Flow> {
    match flow {
        Flow::Normal | Flow::Continue(None) => None,
        Flow::Continue(Some(l)) if Some(l.as_str()) == label => None,
        Flow::Break(None) => Some(Flow::Normal),
        Flow::Break(Some(l)) if Some(l.as_str()) == label => Some(Flow::Normal),
        flow => Some(flow),
    }
}

/// Every branch must target a block enclosing it
fn check_targets(block: &BlockValue, open: &mut Vec<BlockId>, labels: &mut FxHashSet<String>) {
    assert!(labels.insert(block.label.clone()), "duplicate label {}", block.label);
    open.push(block.id);
    for value in &block.values {
        match &value.kind {
            ValueKind::Block(inner) => check_targets(inner, open, labels),
            ValueKind::BlockBranch { target } | ValueKind::BlockBranchIf { target, .. } => {
                assert!(open.contains(target), "branch to {} outside its block", target);
            }
            ValueKind::Try(region) => {
                for inner in [Some(&region.body), region.catch.as_ref(), region.finally.as_ref()]
                    .into_iter()
                    .flatten()
                {
                    check_targets(inner, open, labels);
                }
            }
            _ => {}
        }
    }
    open.pop();
}

/// Run `nodes` structured and flattened under one script; both runs must
/// agree, and the shared result is returned
fn run(nodes: Vec<SemanticsNode>, script: &[(u32, &[bool])]) -> (Flow, Vec<i64>) {
    let mut reference = Machine::new(script);
    let expected = reference.nodes(&nodes);
    assert!(
        matches!(expected, Flow::Normal | Flow::Return | Flow::Throw),
        "structured body left with {:?}",
        expected
    );

    let root = flatten_function(&mut Temps(0), nodes).unwrap();
    check_targets(&root, &mut Vec::new(), &mut FxHashSet::default());
    let mut machine = Machine::new(script);
    let flow = machine.block(&root);

    assert_eq!(flow, expected, "how the body was left");
    assert_eq!(machine.trace, reference.trace, "execution order");
    assert_eq!(machine.unused_conditions(), reference.unused_conditions());
    assert_eq!(machine.unused_conditions(), Vec::<VarId>::new());
    (flow, machine.trace)
}

/// Run `nodes` under every script and compare both forms each time
fn sweep(nodes: impl Fn() -> Vec<SemanticsNode>, scripts: &[&[(u32, &[bool])]]) {
    for script in scripts {
        run(nodes(), script);
    }
}

fn cond(id: u32) -> SemanticsValue {
    SemanticsValue::var(VarId::new(id), ValueTypeId::BOOLEAN)
}

fn emit(n: i64) -> SemanticsNode {
    SemanticsNode::Basic(vec![SemanticsValue::literal(Literal::Int(n))])
}

fn seq(body: Vec<SemanticsNode>) -> Box<SemanticsNode> {
    Box::new(SemanticsNode::Block {
        vars: Vec::new(),
        body,
    })
}

fn when(id: u32, then: SemanticsNode) -> SemanticsNode {
    SemanticsNode::If {
        cond: cond(id),
        then_branch: Box::new(then),
        else_branch: None,
    }
}

fn counting_for(body: Vec<SemanticsNode>, cond_id: Option<u32>) -> SemanticsNode {
    SemanticsNode::For {
        vars: Vec::new(),
        init: vec![emit(0)],
        cond: cond_id.map(cond),
        next: Some(SemanticsValue::literal(Literal::Int(99))),
        body: seq(body),
        rebinding: Vec::new(),
    }
}

#[test]
fn test_if_else_runs_one_branch() {
    let node = || SemanticsNode::If {
        cond: cond(1),
        then_branch: Box::new(emit(1)),
        else_branch: Some(Box::new(emit(2))),
    };
    assert_eq!(run(vec![node(), emit(3)], &[(1, &[true])]).1, vec![1, 3]);
    assert_eq!(run(vec![node(), emit(3)], &[(1, &[false])]).1, vec![2, 3]);
}

#[test]
fn test_if_without_else() {
    let nodes = || vec![when(1, emit(1)), emit(2)];
    assert_eq!(run(nodes(), &[(1, &[true])]).1, vec![1, 2]);
    assert_eq!(run(nodes(), &[(1, &[false])]).1, vec![2]);
}

#[test]
fn test_for_runs_init_body_and_next_in_order() {
    let (flow, trace) = run(vec![counting_for(vec![emit(5)], Some(1))], &[(1, &[true, true, false])]);
    assert_eq!(flow, Flow::Normal);
    assert_eq!(trace, vec![0, 5, 99, 5, 99]);
}

#[test]
fn test_for_continue_still_runs_next() {
    let body = vec![when(2, SemanticsNode::Continue(None)), emit(5)];
    let trace = run(
        vec![counting_for(body, Some(1))],
        &[(1, &[true, true, false]), (2, &[true, false])],
    )
    .1;
    assert_eq!(trace, vec![0, 99, 5, 99]);
}

#[test]
fn test_for_without_condition_leaves_on_break() {
    let body = vec![emit(5), when(2, SemanticsNode::Break(None))];
    let trace = run(vec![counting_for(body, None), emit(7)], &[(2, &[false, true])]).1;
    assert_eq!(trace, vec![0, 5, 99, 5, 7]);
}

#[test]
fn test_while_break_and_continue() {
    let node = SemanticsNode::While {
        cond: cond(1),
        body: seq(vec![
            emit(1),
            when(2, SemanticsNode::Continue(None)),
            emit(2),
            when(3, SemanticsNode::Break(None)),
            emit(3),
        ]),
    };
    let trace = run(
        vec![node, emit(4)],
        &[(1, &[true, true]), (2, &[true, false]), (3, &[true])],
    )
    .1;
    assert_eq!(trace, vec![1, 1, 2, 4]);
}

#[test]
fn test_while_false_never_runs_body() {
    let node = SemanticsNode::While {
        cond: cond(1),
        body: Box::new(emit(1)),
    };
    assert_eq!(run(vec![node, emit(2)], &[(1, &[false])]).1, vec![2]);
}

#[test]
fn test_do_while_runs_body_first() {
    let node = SemanticsNode::DoWhile {
        body: Box::new(emit(7)),
        cond: cond(1),
    };
    assert_eq!(run(vec![node], &[(1, &[false])]).1, vec![7]);
}

#[test]
fn test_do_while_continue_checks_condition() {
    let node = SemanticsNode::DoWhile {
        body: seq(vec![emit(1), when(2, SemanticsNode::Continue(None)), emit(2)]),
        cond: cond(1),
    };
    let trace = run(vec![node], &[(1, &[true, false]), (2, &[true, false])]).1;
    assert_eq!(trace, vec![1, 1, 2]);
}

fn switch(clauses: Vec<CaseClause>) -> SemanticsNode {
    SemanticsNode::Switch {
        init: SemanticsValue::var(VarId::new(50), ValueTypeId::INT),
        clauses,
    }
}

fn case(test: Option<u32>, body: Vec<SemanticsNode>) -> CaseClause {
    CaseClause {
        test: test.map(cond),
        body,
    }
}

#[test]
fn test_switch_falls_through_until_break() {
    let node = || {
        switch(vec![
            case(Some(1), vec![emit(1)]),
            case(Some(2), vec![emit(2), SemanticsNode::Break(None)]),
            case(None, vec![emit(3)]),
        ])
    };
    assert_eq!(run(vec![node(), emit(9)], &[(1, &[true])]).1, vec![1, 2, 9]);
    assert_eq!(run(vec![node(), emit(9)], &[(1, &[false]), (2, &[true])]).1, vec![2, 9]);
    assert_eq!(run(vec![node(), emit(9)], &[(1, &[false]), (2, &[false])]).1, vec![3, 9]);
}

#[test]
fn test_switch_default_in_the_middle() {
    let node = switch(vec![
        case(Some(1), vec![emit(1), SemanticsNode::Break(None)]),
        case(None, vec![emit(2)]),
        case(Some(3), vec![emit(3)]),
    ]);
    // tests run in source order before the default is taken
    let trace = run(vec![node], &[(1, &[false]), (3, &[false])]).1;
    assert_eq!(trace, vec![2, 3]);
}

#[test]
fn test_switch_without_match_or_default() {
    let node = switch(vec![case(Some(1), vec![emit(1)]), case(Some(2), vec![emit(2)])]);
    let trace = run(vec![node, emit(9)], &[(1, &[false]), (2, &[false])]).1;
    assert_eq!(trace, vec![9]);
}

#[test]
fn test_continue_inside_switch_targets_loop() {
    let node = SemanticsNode::While {
        cond: cond(1),
        body: seq(vec![
            switch(vec![case(Some(2), vec![emit(1), SemanticsNode::Continue(None)])]),
            emit(2),
        ]),
    };
    let trace = run(vec![node], &[(1, &[true, false]), (2, &[true])]).1;
    assert_eq!(trace, vec![1]);
}

#[test]
fn test_labeled_continue_restarts_outer_loop() {
    let inner = SemanticsNode::While {
        cond: cond(2),
        body: seq(vec![
            emit(1),
            when(3, SemanticsNode::Continue(Some("outer".into()))),
            emit(2),
        ]),
    };
    let outer = SemanticsNode::Labeled {
        label: "outer".into(),
        body: Box::new(SemanticsNode::While {
            cond: cond(1),
            body: seq(vec![inner, emit(3)]),
        }),
    };
    let trace = run(
        vec![outer],
        &[(1, &[true, true, false]), (2, &[true, true, false]), (3, &[true, false])],
    )
    .1;
    assert_eq!(trace, vec![1, 1, 2, 3]);
}

#[test]
fn test_labeled_break_leaves_both_loops() {
    let inner = SemanticsNode::While {
        cond: cond(2),
        body: seq(vec![emit(1), SemanticsNode::Break(Some("outer".into()))]),
    };
    let outer = SemanticsNode::Labeled {
        label: "outer".into(),
        body: Box::new(SemanticsNode::While {
            cond: cond(1),
            body: seq(vec![inner, emit(2)]),
        }),
    };
    let trace = run(vec![outer, emit(3)], &[(1, &[true]), (2, &[true])]).1;
    assert_eq!(trace, vec![1, 3]);
}

#[test]
fn test_labeled_block_break() {
    let node = || SemanticsNode::Labeled {
        label: "done".into(),
        body: seq(vec![
            emit(1),
            when(1, SemanticsNode::Break(Some("done".into()))),
            emit(2),
        ]),
    };
    assert_eq!(run(vec![node(), emit(3)], &[(1, &[true])]).1, vec![1, 3]);
    assert_eq!(run(vec![node(), emit(3)], &[(1, &[false])]).1, vec![1, 2, 3]);
}

#[test]
fn test_return_leaves_every_block() {
    let node = SemanticsNode::While {
        cond: cond(1),
        body: seq(vec![emit(1), SemanticsNode::Return(None), emit(2)]),
    };
    let (flow, trace) = run(vec![node, emit(3)], &[(1, &[true])]);
    assert_eq!(flow, Flow::Return);
    assert_eq!(trace, vec![1]);
}

#[test]
fn test_misplaced_jumps_are_rejected() {
    let flatten = |nodes| flatten_function(&mut Temps(0), nodes).unwrap_err();

    let err = flatten(vec![SemanticsNode::Continue(None)]);
    assert!(matches!(err, SemanticError::FlattenTarget { label: None, .. }));

    // a switch takes `break` but not `continue`
    let err = flatten(vec![switch(vec![case(Some(1), vec![SemanticsNode::Continue(None)])])]);
    assert!(matches!(err, SemanticError::FlattenTarget { label: None, .. }));

    // a labeled block takes only its labeled `break`
    let err = flatten(vec![SemanticsNode::Labeled {
        label: "block".into(),
        body: Box::new(SemanticsNode::Continue(Some("block".into()))),
    }]);
    assert!(matches!(
        err,
        SemanticError::FlattenTarget { label: Some(ref l), .. } if l == "block"
    ));
    let err = flatten(vec![SemanticsNode::Labeled {
        label: "block".into(),
        body: Box::new(SemanticsNode::Break(None)),
    }]);
    assert_eq!(err.to_string(), "`break;` has no enclosing target block");
}

fn for_of(iterator: u32, body: Vec<SemanticsNode>) -> SemanticsNode {
    SemanticsNode::ForEach {
        vars: Vec::new(),
        iterator: VarId::new(iterator),
        init: SemanticsValue::new(
            ValueKind::IteratorNew {
                kind: IterationKind::Of,
                iterable: Box::new(SemanticsValue::var(VarId::new(60), ValueTypeId::ANY)),
            },
            ValueTypeId::ANY,
        ),
        var: VarId::new(61),
        var_type: ValueTypeId::ANY,
        body: seq(body),
    }
}

#[test]
fn test_for_of_runs_body_per_element() {
    let nodes = || vec![for_of(40, vec![emit(1), when(2, SemanticsNode::Continue(None)), emit(2)]), emit(3)];
    let (_, trace) = run(nodes(), &[(40, &[true, true, false]), (2, &[true, false])]);
    assert_eq!(trace, vec![1, 1, 2, 3]);
    assert_eq!(run(nodes(), &[(40, &[false])]).1, vec![3]);
}

#[test]
fn test_for_in_break_leaves_iteration() {
    let node = || {
        let SemanticsNode::ForEach {
            vars,
            iterator,
            init,
            var,
            var_type,
            body,
        } = for_of(40, vec![emit(1), when(2, SemanticsNode::Break(None))])
        else {
            unreachable!()
        };
        let ValueKind::IteratorNew { iterable, .. } = init.kind else {
            unreachable!()
        };
        SemanticsNode::ForEach {
            vars,
            iterator,
            init: SemanticsValue::new(
                ValueKind::IteratorNew {
                    kind: IterationKind::In,
                    iterable,
                },
                ValueTypeId::ANY,
            ),
            var,
            var_type,
            body,
        }
    };
    sweep(
        || vec![node(), emit(9)],
        &[
            &[(40, &[true, true, false]), (2, &[false, false])],
            &[(40, &[true, true]), (2, &[false, true])],
            &[(40, &[true]), (2, &[true])],
            &[(40, &[false])],
        ],
    );
    let (_, trace) = run(vec![node(), emit(9)], &[(40, &[true, true]), (2, &[false, true])]);
    assert_eq!(trace, vec![1, 1, 9]);
}

#[test]
fn test_labeled_continue_inside_switch_restarts_loop() {
    let nodes = || {
        vec![SemanticsNode::Labeled {
            label: "outer".into(),
            body: Box::new(SemanticsNode::While {
                cond: cond(1),
                body: seq(vec![
                    switch(vec![
                        case(Some(2), vec![emit(1), SemanticsNode::Continue(Some("outer".into()))]),
                        case(None, vec![emit(2)]),
                    ]),
                    emit(3),
                ]),
            }),
        }]
    };
    let trace = run(nodes(), &[(1, &[true, true, false]), (2, &[true, false])]).1;
    assert_eq!(trace, vec![1, 2, 3]);
    sweep(
        nodes,
        &[
            &[(1, &[false])],
            &[(1, &[true, false]), (2, &[true])],
            &[(1, &[true, false]), (2, &[false])],
            &[(1, &[true, true, true, false]), (2, &[false, true, false])],
        ],
    );
}

#[test]
fn test_labeled_break_out_of_switch() {
    let nodes = || {
        vec![
            SemanticsNode::Labeled {
                label: "pick".into(),
                body: Box::new(switch(vec![
                    case(
                        Some(1),
                        vec![emit(1), when(2, SemanticsNode::Break(Some("pick".into()))), emit(2)],
                    ),
                    case(None, vec![emit(3)]),
                ])),
            },
            emit(9),
        ]
    };
    assert_eq!(run(nodes(), &[(1, &[true]), (2, &[true])]).1, vec![1, 9]);
    assert_eq!(run(nodes(), &[(1, &[true]), (2, &[false])]).1, vec![1, 2, 3, 9]);
    assert_eq!(run(nodes(), &[(1, &[false])]).1, vec![3, 9]);
}

fn try_node(block: Vec<SemanticsNode>, catch: Option<Vec<SemanticsNode>>, finally: Option<Vec<SemanticsNode>>) -> SemanticsNode {
    SemanticsNode::Try {
        block: seq(block),
        catch_var: catch.as_ref().map(|_| VarId::new(70)),
        catch: catch.map(seq),
        finally: finally.map(seq),
    }
}

fn throw() -> SemanticsNode {
    SemanticsNode::Throw(SemanticsValue::literal(Literal::Undefined))
}

#[test]
fn test_try_catch_and_finally_order() {
    let nodes = || {
        vec![
            try_node(
                vec![emit(1), when(1, throw()), emit(2)],
                Some(vec![emit(3)]),
                Some(vec![emit(4)]),
            ),
            emit(5),
        ]
    };
    assert_eq!(run(nodes(), &[(1, &[true])]).1, vec![1, 3, 4, 5]);
    assert_eq!(run(nodes(), &[(1, &[false])]).1, vec![1, 2, 4, 5]);
}

#[test]
fn test_uncaught_throw_runs_finally_and_leaves() {
    let nodes = || vec![try_node(vec![emit(1), when(1, throw())], None, Some(vec![emit(2)])), emit(3)];
    let (flow, trace) = run(nodes(), &[(1, &[true])]);
    assert_eq!(flow, Flow::Throw);
    assert_eq!(trace, vec![1, 2]);
    assert_eq!(run(nodes(), &[(1, &[false])]).1, vec![1, 2, 3]);
}

#[test]
fn test_jumps_out_of_try_inside_loop() {
    let nodes = || {
        vec![
            SemanticsNode::While {
                cond: cond(1),
                body: seq(vec![
                    try_node(
                        vec![
                            emit(1),
                            when(2, SemanticsNode::Continue(None)),
                            when(3, SemanticsNode::Break(None)),
                            when(4, SemanticsNode::Return(None)),
                        ],
                        Some(vec![emit(8)]),
                        Some(vec![emit(2)]),
                    ),
                    emit(3),
                ]),
            },
            emit(9),
        ]
    };
    sweep(
        nodes,
        &[
            &[(1, &[true, true, false]), (2, &[true, false]), (3, &[false]), (4, &[false])],
            &[(1, &[true]), (2, &[false]), (3, &[true])],
            &[(1, &[true]), (2, &[false]), (3, &[false]), (4, &[true])],
            &[(1, &[false])],
        ],
    );
    let trace = run(
        nodes(),
        &[(1, &[true, true, false]), (2, &[true, false]), (3, &[false]), (4, &[false])],
    )
    .1;
    assert_eq!(trace, vec![1, 2, 1, 2, 3, 9]);
}

/// Every loop template under scripts driving each condition both ways
#[test]
fn test_loop_templates_agree_across_outcomes() {
    let body = || {
        vec![
            emit(1),
            when(2, SemanticsNode::Continue(None)),
            emit(2),
            when(3, SemanticsNode::Break(None)),
            emit(3),
        ]
    };
    let loops: Vec<Box<dyn Fn() -> SemanticsNode>> = vec![
        Box::new(move || SemanticsNode::While {
            cond: cond(1),
            body: seq(body()),
        }),
        Box::new(move || SemanticsNode::DoWhile {
            body: seq(body()),
            cond: cond(1),
        }),
        Box::new(move || counting_for(body(), Some(1))),
        Box::new(move || for_of(1, body())),
    ];
    let scripts: &[&[(u32, &[bool])]] = &[
        &[(1, &[false, false]), (2, &[false]), (3, &[false])],
        &[(1, &[true, true, false]), (2, &[true, false, true]), (3, &[false, false])],
        &[(1, &[true, true, true]), (2, &[false, false]), (3, &[false, true])],
    ];
    for make in &loops {
        for script in scripts {
            let mut reference = Machine::new(script);
            let expected = reference.node(&make(), None);
            let root = flatten_function(&mut Temps(0), vec![make()]).unwrap();
            let mut machine = Machine::new(script);
            let flow = machine.block(&root);
            assert_eq!(flow, expected);
            assert_eq!(machine.trace, reference.trace);
            assert_eq!(machine.unused_conditions(), reference.unused_conditions());
        }
    }
}
