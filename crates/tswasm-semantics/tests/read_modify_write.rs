//! Compound assignment and `++`/`--` on member and element targets

use pretty_assertions::assert_eq;
use tswasm_frontend::{
    BinaryOp, ClassDecl, ClassKind, ClassMember, Expr, FunctionSignature, MethodRole,
    ProgramBuilder, Stmt, TypeId, UnaryOp,
};
use tswasm_semantics::{
    build_module, BuildConfig, FunctionDeclareNode, MemberAccess, ModuleNode, SemanticsValue,
    ValueKind,
};

fn build(b: ProgramBuilder) -> ModuleNode {
    tswasm_semantics::init_tracing();
    build_module(&b.finish(), &BuildConfig::default()).unwrap()
}

fn function<'m>(module: &'m ModuleNode, name: &str) -> &'m FunctionDeclareNode {
    module
        .function_by_name(name)
        .unwrap_or_else(|| panic!("no function `{}`", name))
}

fn values<'m>(module: &'m ModuleNode, name: &str) -> &'m [SemanticsValue] {
    &function(module, name)
        .body
        .as_ref()
        .expect("function has a body")
        .values
}

fn children(value: &SemanticsValue) -> Vec<&SemanticsValue> {
    match &value.kind {
        ValueKind::Assign { value, .. }
        | ValueKind::Cast { value, .. }
        | ValueKind::TypeOf(value)
        | ValueKind::Spread(value)
        | ValueKind::Return(Some(value)) => vec![&**value],
        ValueKind::Binary { left, right, .. } => vec![&**left, &**right],
        ValueKind::Unary { operand, .. } => vec![&**operand],
        ValueKind::Comma(items) => items.iter().collect(),
        ValueKind::Call { args, .. } => args.iter().collect(),
        ValueKind::MemberGet { object, .. } => vec![&**object],
        ValueKind::MemberSet { object, value, .. } => vec![&**object, &**value],
        ValueKind::MemberCall { object, args, .. } => {
            std::iter::once(&**object).chain(args.iter()).collect()
        }
        ValueKind::ElementGet { object, index, .. } => vec![&**object, &**index],
        ValueKind::ElementSet {
            object,
            index,
            value,
            ..
        } => vec![&**object, &**index, &**value],
        ValueKind::Block(block) => block.values.iter().collect(),
        _ => Vec::new(),
    }
}

/// Values under `value`, itself included, matching `pred`
fn count(value: &SemanticsValue, pred: &dyn Fn(&SemanticsValue) -> bool) -> usize {
    usize::from(pred(value))
        + children(value)
            .into_iter()
            .map(|child| count(child, pred))
            .sum::<usize>()
}

fn count_all(values: &[SemanticsValue], pred: &dyn Fn(&SemanticsValue) -> bool) -> usize {
    values.iter().map(|v| count(v, pred)).sum()
}

fn comma(values: &[SemanticsValue]) -> &[SemanticsValue] {
    values
        .iter()
        .find_map(|v| match &v.kind {
            ValueKind::Comma(items) => Some(items.as_slice()),
            _ => None,
        })
        .expect("a sequenced update")
}

#[test]
fn test_compound_element_update_evaluates_key_once() {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let numbers = b.array_type(TypeId::NUMBER);
    let fn_ty = b.function_type(FunctionSignature::new(vec![numbers], TypeId::VOID));
    let f = b.function(g, "bump", fn_ty, vec![("a", numbers)]);
    let i = b.var(f, "i", TypeId::INT);
    b.set_init(i, Expr::int(0));
    b.stmt(f, Stmt::var(vec![i]));
    b.stmt(
        f,
        Stmt::expr(Expr::binary(
            BinaryOp::AddAssign,
            Expr::element(
                Expr::ident("a", numbers),
                Expr::unary(UnaryOp::Inc, false, Expr::ident("i", TypeId::INT)),
                TypeId::NUMBER,
            ),
            Expr::number(1.0),
            TypeId::NUMBER,
        )),
    );
    let module = build(b);

    let body = values(&module, "bump");
    let increments = count_all(body, &|v| {
        matches!(v.kind, ValueKind::Unary { op: UnaryOp::Inc, .. })
    });
    assert_eq!(increments, 1);

    let steps = comma(body);
    assert_eq!(steps.len(), 2);
    let ValueKind::Assign { var: key, value } = &steps[0].kind else {
        panic!("expected the key to be held, got {}", steps[0]);
    };
    assert!(matches!(value.kind, ValueKind::Unary { op: UnaryOp::Inc, .. }));
    let ValueKind::ElementSet { index, value, .. } = &steps[1].kind else {
        panic!("expected an element store, got {}", steps[1]);
    };
    assert_eq!(index.kind, ValueKind::Var(*key));
    // the read goes through the held key as well
    let reads = count(value, &|v| match &v.kind {
        ValueKind::ElementGet { index, .. } => index.kind == ValueKind::Var(*key),
        _ => false,
    });
    assert_eq!(reads, 1);
}

#[test]
fn test_compound_member_update_calls_receiver_once() {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let boxed = b.class(
        g,
        ClassDecl::new("Box", ClassKind::Class).with_member(ClassMember::field("x", TypeId::NUMBER)),
    );
    let make_ty = b.function_type(FunctionSignature::new(vec![], boxed));
    let make = b.function(g, "make", make_ty, vec![]);
    b.stmt(
        make,
        Stmt::return_(Some(Expr::new_object(Expr::ident("Box", boxed), vec![], boxed))),
    );
    let void_fn = b.function_type(FunctionSignature::new(vec![], TypeId::VOID));
    let touch = b.function(g, "touch", void_fn, vec![]);
    b.stmt(
        touch,
        Stmt::expr(Expr::binary(
            BinaryOp::MulAssign,
            Expr::property(Expr::call(Expr::ident("make", make_ty), vec![], boxed), "x", TypeId::NUMBER),
            Expr::number(2.0),
            TypeId::NUMBER,
        )),
    );
    let module = build(b);

    let make = function(&module, "make").id;
    let body = values(&module, "touch");
    let calls = count_all(body, &|v| matches!(&v.kind, ValueKind::Call { func, .. } if *func == make));
    assert_eq!(calls, 1);

    let steps = comma(body);
    let ValueKind::Assign { var: receiver, .. } = &steps[0].kind else {
        panic!("expected the receiver to be held, got {}", steps[0]);
    };
    let ValueKind::MemberSet { object, access, .. } = &steps[1].kind else {
        panic!("expected a member store, got {}", steps[1]);
    };
    assert_eq!(object.kind, ValueKind::Var(*receiver));
    assert!(matches!(access, MemberAccess::Offset { .. }));
}

/// `class Temp { get c(); set c(v) }` with one updater per operator form
fn accessor_program() -> ModuleNode {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let temp = b.class(g, ClassDecl::new("Temp", ClassKind::Class));
    let get_ty = b.function_type(FunctionSignature::new(vec![], TypeId::NUMBER));
    let set_ty = b.function_type(FunctionSignature::new(vec![TypeId::NUMBER], TypeId::VOID));
    let getter = b.method(temp, "c", MethodRole::Getter, get_ty, vec![]);
    b.stmt(getter, Stmt::return_(Some(Expr::number(20.0))));
    b.method(temp, "c", MethodRole::Setter, set_ty, vec![("v", TypeId::NUMBER)]);

    let update_ty = b.function_type(FunctionSignature::new(vec![temp], TypeId::NUMBER));
    let c = || Expr::property(Expr::ident("t", temp), "c", TypeId::NUMBER);
    let post = b.function(g, "postIncrement", update_ty, vec![("t", temp)]);
    b.stmt(post, Stmt::return_(Some(Expr::unary(UnaryOp::Inc, false, c()))));
    let pre = b.function(g, "preDecrement", update_ty, vec![("t", temp)]);
    b.stmt(pre, Stmt::return_(Some(Expr::unary(UnaryOp::Dec, true, c()))));
    let add = b.function(g, "addTwo", update_ty, vec![("t", temp)]);
    b.stmt(
        add,
        Stmt::return_(Some(Expr::binary(BinaryOp::AddAssign, c(), Expr::number(2.0), TypeId::NUMBER))),
    );
    build(b)
}

fn accessors(module: &ModuleNode) -> (MemberAccess, MemberAccess) {
    let temp = module.objects.description(module.description_by_name("Temp").unwrap());
    let c = temp.member("c").expect("accessor `c`");
    (
        MemberAccess::DirectGetter {
            func: c.getter.expect("getter"),
        },
        MemberAccess::DirectSetter {
            func: c.setter.expect("setter"),
        },
    )
}

fn returned(values: &[SemanticsValue]) -> &SemanticsValue {
    values
        .iter()
        .find_map(|v| match &v.kind {
            ValueKind::Return(Some(inner)) => Some(&**inner),
            _ => None,
        })
        .expect("a return")
}

#[test]
fn test_postfix_step_on_accessor_reads_and_writes() {
    let module = accessor_program();
    let (get, set) = accessors(&module);

    let ValueKind::Comma(steps) = &returned(values(&module, "postIncrement")).kind else {
        panic!("expected a sequenced update");
    };
    assert_eq!(steps.len(), 3);
    let ValueKind::Assign { var: old, value } = &steps[0].kind else {
        panic!("expected the old value to be saved, got {}", steps[0]);
    };
    assert!(matches!(&value.kind, ValueKind::MemberGet { access, .. } if *access == get));
    let ValueKind::MemberSet { access, value, .. } = &steps[1].kind else {
        panic!("expected a setter call, got {}", steps[1]);
    };
    assert_eq!(access, &set);
    assert!(matches!(value.kind, ValueKind::Binary { op: BinaryOp::Add, .. }));
    // the expression yields the value before the update
    assert_eq!(steps[2].kind, ValueKind::Var(*old));
}

#[test]
fn test_prefix_step_and_compound_on_accessor_use_both_halves() {
    let module = accessor_program();
    let (get, set) = accessors(&module);

    for (name, op) in [("preDecrement", BinaryOp::Sub), ("addTwo", BinaryOp::Add)] {
        let result = returned(values(&module, name));
        let ValueKind::MemberSet { access, value, .. } = &result.kind else {
            panic!("`{}`: expected a setter call, got {}", name, result);
        };
        assert_eq!(access, &set, "`{}`", name);
        assert!(
            matches!(&value.kind, ValueKind::Binary { op: o, .. } if *o == op),
            "`{}`: {}",
            name,
            value
        );
        let getters = count(value, &|v| {
            matches!(&v.kind, ValueKind::MemberGet { access, .. } if *access == get)
        });
        assert_eq!(getters, 1, "`{}`", name);
    }
}
