use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tswasm_frontend::{
    BinaryOp, ClassDecl, ClassKind, ClassMember, Expr, FunctionSignature, MethodRole, Program,
    ProgramBuilder, Stmt, TypeId, UnaryOp,
};
use tswasm_semantics::{build_module, BuildConfig};

/// `count` functions, each summing a counted loop through a nested closure
fn loops_program(count: usize) -> Program {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let int_fn = b.function_type(FunctionSignature::new(vec![TypeId::INT], TypeId::INT));
    let step_fn = b.function_type(FunctionSignature::new(vec![], TypeId::INT));

    for n in 0..count {
        let f = b.function(g, &format!("sum{}", n), int_fn, vec![("limit", TypeId::INT)]);
        let total = b.var(f, "total", TypeId::INT);
        b.set_init(total, Expr::int(0));
        let step = b.function(f, "step", step_fn, vec![]);
        b.stmt(step, Stmt::return_(Some(Expr::ident("total", TypeId::INT))));

        let for_scope = b.block(f);
        let i = b.var(for_scope, "i", TypeId::INT);
        b.set_init(i, Expr::int(0));
        let i_ref = || Expr::ident("i", TypeId::INT);
        b.stmt(f, Stmt::var(vec![total]));
        b.stmt(
            f,
            Stmt::for_(
                Some(for_scope),
                Some(Stmt::var(vec![i])),
                Some(Expr::compare(
                    BinaryOp::Lt,
                    i_ref(),
                    Expr::ident("limit", TypeId::INT),
                )),
                Some(Expr::unary(UnaryOp::Inc, false, i_ref())),
                Stmt::block(
                    None,
                    vec![
                        Stmt::if_(
                            Expr::compare(BinaryOp::Gt, i_ref(), Expr::int(100)),
                            Stmt::break_(None),
                            None,
                        ),
                        Stmt::expr(Expr::assign(
                            Expr::ident("total", TypeId::INT),
                            Expr::binary(
                                BinaryOp::Add,
                                Expr::ident("total", TypeId::INT),
                                i_ref(),
                                TypeId::INT,
                            ),
                        )),
                    ],
                ),
            ),
        );
        b.stmt(
            f,
            Stmt::return_(Some(Expr::call(
                Expr::ident("step", step_fn),
                vec![],
                TypeId::INT,
            ))),
        );
    }
    b.finish()
}

/// A chain of `depth` classes, each overriding `m`, and one caller per class
fn classes_program(depth: usize) -> Program {
    let mut b = ProgramBuilder::new();
    let g = b.global("main");
    let m_ty = b.function_type(FunctionSignature::new(vec![], TypeId::INT));

    let mut base = None;
    for n in 0..depth {
        let mut decl = ClassDecl::new(format!("C{}", n), ClassKind::Class)
            .with_member(ClassMember::field(format!("f{}", n), TypeId::INT));
        if let Some(parent) = base {
            decl = decl.with_base(parent);
        }
        let class = b.class(g, decl);
        let m = b.method(class, "m", MethodRole::Method, m_ty, vec![]);
        b.stmt(m, Stmt::return_(Some(Expr::int(n as i64))));

        let call_ty = b.function_type(FunctionSignature::new(vec![class], TypeId::INT));
        let caller = b.function(g, &format!("call{}", n), call_ty, vec![("o", class)]);
        b.stmt(
            caller,
            Stmt::return_(Some(Expr::call(
                Expr::property(Expr::ident("o", class), "m", m_ty),
                vec![],
                TypeId::INT,
            ))),
        );
        base = Some(class);
    }
    b.finish()
}

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    let config = BuildConfig::default();

    for count in [10usize, 100] {
        let program = loops_program(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("functions", count), &program, |b, program| {
            b.iter(|| build_module(black_box(program), &config).unwrap());
        });
    }

    group.finish();
}

fn bench_classes(c: &mut Criterion) {
    let mut group = c.benchmark_group("classes");
    let config = BuildConfig::default();

    for depth in [4usize, 32] {
        let program = classes_program(depth);
        group.bench_with_input(BenchmarkId::new("chain", depth), &program, |b, program| {
            b.iter(|| build_module(black_box(program), &config).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_loops, bench_classes);
criterion_main!(benches);
