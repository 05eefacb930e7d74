//! Class layouts and member dispatch through whole-module builds

use pretty_assertions::assert_eq;
use tswasm_frontend::{
    ClassDecl, ClassKind, ClassMember, Expr, FunctionSignature, MethodRole, ProgramBuilder, Stmt,
    TypeId,
};
use tswasm_semantics::value::CastKind;
use tswasm_semantics::{
    build_module, BuildConfig, DispatchKind, FunctionDeclareNode, MemberAccess, ModuleNode,
    SemanticsValue, ValueKind,
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

fn returned(value: &SemanticsValue) -> &SemanticsValue {
    match &value.kind {
        ValueKind::Return(Some(inner)) => inner,
        other => panic!("expected a return, got {:?}", other),
    }
}

/// `class Base { a; b; m() }` and `class Derived extends Base { m() }` with
/// one caller per static receiver type
fn class_hierarchy() -> ModuleNode {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let m_ty = b.function_type(FunctionSignature::new(vec![], TypeId::INT));
    let base = b.class(
        g,
        ClassDecl::new("Base", ClassKind::Class)
            .with_member(ClassMember::field("a", TypeId::INT))
            .with_member(ClassMember::field("b", TypeId::INT)),
    );
    let base_m = b.method(base, "m", MethodRole::Method, m_ty, vec![]);
    b.stmt(base_m, Stmt::return_(Some(Expr::int(1))));
    let derived = b.class(g, ClassDecl::new("Derived", ClassKind::Class).with_base(base));
    let derived_m = b.method(derived, "m", MethodRole::Method, m_ty, vec![]);
    b.stmt(derived_m, Stmt::return_(Some(Expr::int(2))));

    let base_fn = b.function_type(FunctionSignature::new(vec![base], TypeId::INT));
    let call_base = b.function(g, "callBase", base_fn, vec![("o", base)]);
    b.stmt(
        call_base,
        Stmt::expr(Expr::call(
            Expr::property(Expr::ident("o", base), "m", m_ty),
            vec![],
            TypeId::INT,
        )),
    );
    b.stmt(
        call_base,
        Stmt::return_(Some(Expr::property(Expr::ident("o", base), "a", TypeId::INT))),
    );

    let derived_fn = b.function_type(FunctionSignature::new(vec![derived], TypeId::INT));
    let call_derived = b.function(g, "callDerived", derived_fn, vec![("d", derived)]);
    b.stmt(
        call_derived,
        Stmt::return_(Some(Expr::call(
            Expr::property(Expr::ident("d", derived), "m", m_ty),
            vec![],
            TypeId::INT,
        ))),
    );

    let any_fn = b.function_type(FunctionSignature::new(vec![TypeId::ANY], TypeId::ANY));
    let call_any = b.function(g, "callAny", any_fn, vec![("v", TypeId::ANY)]);
    b.stmt(
        call_any,
        Stmt::return_(Some(Expr::property(Expr::ident("v", TypeId::ANY), "a", TypeId::ANY))),
    );
    build(b)
}

#[test]
fn test_derived_layout_keeps_base_slots() {
    let module = class_hierarchy();
    let base = module.objects.description(module.description_by_name("Base").unwrap());
    let derived = module.objects.description(module.description_by_name("Derived").unwrap());

    assert_eq!(derived.base, Some(base.id));
    for name in ["a", "b", "m"] {
        assert_eq!(
            base.member(name).map(|m| m.index),
            derived.member(name).map(|m| m.index),
            "slot of `{}`",
            name
        );
    }

    let base_m = base.member("m").unwrap();
    let derived_m = derived.member("m").unwrap();
    assert_eq!(derived_m.index, 2);
    assert!(base_m.overridden);
    assert!(derived_m.is_own);
    assert!(!derived.member("a").unwrap().is_own);
    assert_ne!(base_m.method, derived_m.method);
    assert!(derived_m.method.is_some());
}

#[test]
fn test_subclassed_receiver_dispatches_through_vtable() {
    let module = class_hierarchy();
    let body = values(&module, "callBase");

    let ValueKind::MemberCall { access, .. } = &body[0].kind else {
        panic!("expected a member call, got {}", body[0]);
    };
    assert_eq!(access, &MemberAccess::VTable { index: 2 });

    let ValueKind::MemberGet { access, .. } = &returned(&body[1]).kind else {
        panic!("expected a member read");
    };
    assert_eq!(access.kind(), DispatchKind::Offset);
    assert!(matches!(access, MemberAccess::Offset { .. }));
}

#[test]
fn test_sealed_receiver_calls_method_directly() {
    let module = class_hierarchy();
    let derived = module.objects.description(module.description_by_name("Derived").unwrap());
    let expected = derived.member("m").unwrap().method.unwrap();

    let body = values(&module, "callDerived");
    let ValueKind::MemberCall { access, .. } = &returned(&body[0]).kind else {
        panic!("expected a member call");
    };
    assert_eq!(access, &MemberAccess::Direct { func: expected });
}

#[test]
fn test_untyped_receiver_is_dynamic() {
    let module = class_hierarchy();
    let body = values(&module, "callAny");
    let ValueKind::MemberGet { access, .. } = &returned(&body[0]).kind else {
        panic!("expected a member read");
    };
    assert_eq!(
        access,
        &MemberAccess::Dynamic {
            name: "a".to_string()
        }
    );
}

/// `interface XLike { x }`, `class Point { y; x }`, a reader of `XLike`
/// values and two conversions of a `Point` into one
fn interface_program() -> ModuleNode {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let xlike = b.class(
        g,
        ClassDecl::new("XLike", ClassKind::Interface)
            .with_member(ClassMember::field("x", TypeId::NUMBER)),
    );
    let point = b.class(
        g,
        ClassDecl::new("Point", ClassKind::Class)
            .with_member(ClassMember::field("y", TypeId::NUMBER))
            .with_member(ClassMember::field("x", TypeId::NUMBER)),
    );

    let read_fn = b.function_type(FunctionSignature::new(vec![xlike], TypeId::NUMBER));
    let read = b.function(g, "read", read_fn, vec![("p", xlike)]);
    b.stmt(
        read,
        Stmt::return_(Some(Expr::property(Expr::ident("p", xlike), "x", TypeId::NUMBER))),
    );

    let new_point = || Expr::new_object(Expr::ident("Point", point), vec![], point);
    let number_fn = b.function_type(FunctionSignature::new(vec![], TypeId::NUMBER));
    let converted = b.function(g, "converted", number_fn, vec![]);
    b.stmt(
        converted,
        Stmt::return_(Some(Expr::property(
            Expr::cast(new_point(), xlike),
            "x",
            TypeId::NUMBER,
        ))),
    );
    let passed = b.function(g, "passed", number_fn, vec![]);
    b.stmt(
        passed,
        Stmt::return_(Some(Expr::call(
            Expr::ident("read", read_fn),
            vec![new_point()],
            TypeId::NUMBER,
        ))),
    );
    build(b)
}

#[test]
fn test_interface_receiver_reads_through_runtime_shape() {
    let module = interface_program();
    let body = values(&module, "read");
    let ValueKind::MemberGet { access, .. } = &returned(&body[0]).kind else {
        panic!("expected a member read");
    };
    assert_eq!(access, &MemberAccess::Shape { shape: None, index: 0 });
}

#[test]
fn test_converted_value_reads_through_cached_shape() {
    let module = interface_program();
    let xlike = module.description_by_name("XLike").unwrap();
    let point = module.description_by_name("Point").unwrap();
    let compat = module
        .objects
        .cached_shape(xlike, point)
        .expect("compatibility shape for Point as XLike");

    let body = values(&module, "converted");
    let ValueKind::MemberGet { object, access } = &returned(&body[0]).kind else {
        panic!("expected a member read");
    };
    assert_eq!(object.shape, Some(compat));
    assert_eq!(
        access,
        &MemberAccess::Shape {
            shape: Some(compat),
            index: 0
        }
    );

    // the shape maps the interface slot onto the class's own slot
    let shape = module.objects.shape(compat);
    assert_eq!(shape.desc, xlike);
    assert_eq!(shape.source, Some(point));
}

#[test]
fn test_argument_conversion_shares_cached_shape() {
    let module = interface_program();
    let xlike = module.description_by_name("XLike").unwrap();
    let point = module.description_by_name("Point").unwrap();
    let compat = module.objects.cached_shape(xlike, point);
    assert!(compat.is_some());

    let body = values(&module, "passed");
    let ValueKind::Call { args, .. } = &returned(&body[0]).kind else {
        panic!("expected a call");
    };
    let ValueKind::Cast { kind, value } = &args[0].kind else {
        panic!("expected a conversion, got {}", args[0]);
    };
    assert_eq!(*kind, CastKind::ObjectToObject);
    assert!(matches!(value.kind, ValueKind::New { .. }));
    assert_eq!(args[0].shape, compat);
}
