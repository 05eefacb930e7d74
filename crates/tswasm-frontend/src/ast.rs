//! Expression and statement trees
//!
//! Every expression carries the type the checker resolved for it. The node
//! kind drives the semantic builder's dispatch.

use std::fmt;

use crate::scope::{ScopeId, VarKey};
use crate::span::Span;
use crate::types::TypeId;

// ============================================================================
// Operators
// ============================================================================

/// Binary operators, including assignment forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    InstanceOf,
    In,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl BinaryOp {
    /// Plain or compound assignment
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
                | BinaryOp::ModAssign
        )
    }

    /// Operator applied by a compound assignment (`+=` gives `+`)
    pub fn compound_operator(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubAssign => Some(BinaryOp::Sub),
            BinaryOp::MulAssign => Some(BinaryOp::Mul),
            BinaryOp::DivAssign => Some(BinaryOp::Div),
            BinaryOp::ModAssign => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    /// Relational or equality comparison
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::StrictEq
                | BinaryOp::Ne
                | BinaryOp::StrictNe
        )
    }

    /// Source spelling
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::StrictEq => "===",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictNe => "!==",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::In => "in",
            BinaryOp::Assign => "=",
            BinaryOp::AddAssign => "+=",
            BinaryOp::SubAssign => "-=",
            BinaryOp::MulAssign => "*=",
            BinaryOp::DivAssign => "/=",
            BinaryOp::ModAssign => "%=",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Inc,
    Dec,
}

impl UnaryOp {
    /// Source spelling
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Inc => "++",
            UnaryOp::Dec => "--",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A typed expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Node kind and children
    pub kind: ExprKind,
    /// Type resolved by the checker
    pub ty: TypeId,
    /// Source position
    pub span: Option<Span>,
}

/// Expression node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Identifier(String),
    Int(i64),
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
    ObjectLiteral(Vec<(String, Expr)>),
    ArrayLiteral(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Comma(Vec<Expr>),
    Conditional {
        cond: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        type_args: Vec<TypeId>,
    },
    Super,
    This,
    New {
        class: Box<Expr>,
        args: Vec<Expr>,
        type_args: Vec<TypeId>,
        /// `new Array(len)` length argument
        len: Option<Box<Expr>>,
    },
    ElementAccess {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    As(Box<Expr>),
    Function(ScopeId),
    Paren(Box<Expr>),
    Unary {
        op: UnaryOp,
        prefix: bool,
        operand: Box<Expr>,
    },
    TypeOf(Box<Expr>),
    Spread(Box<Expr>),
    Template {
        head: String,
        spans: Vec<(Expr, String)>,
    },
    PropertyAccess {
        object: Box<Expr>,
        property: String,
    },
    EnumerateKeys(Box<Expr>),
    /// A construct the front end parsed but has no lowering (e.g. `yield`)
    Unsupported(String),
}

impl Expr {
    /// Create an expression of the given kind and type
    pub fn new(kind: ExprKind, ty: TypeId) -> Self {
        Self {
            kind,
            ty,
            span: None,
        }
    }

    /// Attach a source position
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.span = Some(Span::new(line, column));
        self
    }

    pub fn ident(name: impl Into<String>, ty: TypeId) -> Self {
        Self::new(ExprKind::Identifier(name.into()), ty)
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value), TypeId::INT)
    }

    pub fn number(value: f64) -> Self {
        Self::new(ExprKind::Number(value), TypeId::NUMBER)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::String(value.into()), TypeId::STRING)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Bool(value), TypeId::BOOLEAN)
    }

    pub fn null() -> Self {
        Self::new(ExprKind::Null, TypeId::NULL)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    /// `left = right`, typed as the left operand
    pub fn assign(left: Expr, right: Expr) -> Self {
        let ty = left.ty;
        Self::binary(BinaryOp::Assign, left, right, ty)
    }

    /// Comparison typed `boolean`
    pub fn compare(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::binary(op, left, right, TypeId::BOOLEAN)
    }

    pub fn call(callee: Expr, args: Vec<Expr>, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
                type_args: Vec::new(),
            },
            ty,
        )
    }

    pub fn property(object: Expr, property: impl Into<String>, ty: TypeId) -> Self {
        Self::new(
            ExprKind::PropertyAccess {
                object: Box::new(object),
                property: property.into(),
            },
            ty,
        )
    }

    pub fn new_object(class: Expr, args: Vec<Expr>, ty: TypeId) -> Self {
        Self::new(
            ExprKind::New {
                class: Box::new(class),
                args,
                type_args: Vec::new(),
                len: None,
            },
            ty,
        )
    }

    pub fn element(object: Expr, index: Expr, ty: TypeId) -> Self {
        Self::new(
            ExprKind::ElementAccess {
                object: Box::new(object),
                index: Box::new(index),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, prefix: bool, operand: Expr) -> Self {
        let ty = match op {
            UnaryOp::Not => TypeId::BOOLEAN,
            _ => operand.ty,
        };
        Self::new(
            ExprKind::Unary {
                op,
                prefix,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn conditional(cond: Expr, when_true: Expr, when_false: Expr, ty: TypeId) -> Self {
        Self::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                when_true: Box::new(when_true),
                when_false: Box::new(when_false),
            },
            ty,
        )
    }

    pub fn function(scope: ScopeId, ty: TypeId) -> Self {
        Self::new(ExprKind::Function(scope), ty)
    }

    pub fn this(ty: TypeId) -> Self {
        Self::new(ExprKind::This, ty)
    }

    pub fn cast(expr: Expr, ty: TypeId) -> Self {
        Self::new(ExprKind::As(Box::new(expr)), ty)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::Int(v) => write!(f, "{}", v),
            ExprKind::Number(v) => write!(f, "{}", v),
            ExprKind::String(s) => write!(f, "{:?}", s),
            ExprKind::Bool(b) => write!(f, "{}", b),
            ExprKind::Null => write!(f, "null"),
            ExprKind::Undefined => write!(f, "undefined"),
            ExprKind::ObjectLiteral(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, value)?;
                }
                write!(f, " }}")
            }
            ExprKind::ArrayLiteral(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            ExprKind::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            ExprKind::Comma(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            ExprKind::Conditional {
                cond,
                when_true,
                when_false,
            } => write!(f, "{} ? {} : {}", cond, when_true, when_false),
            ExprKind::Call { callee, args, .. } => {
                write!(f, "{}(", callee)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Super => write!(f, "super"),
            ExprKind::This => write!(f, "this"),
            ExprKind::New { class, args, .. } => {
                write!(f, "new {}(", class)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::ElementAccess { object, index } => write!(f, "{}[{}]", object, index),
            ExprKind::As(inner) => write!(f, "{} as {}", inner, self.ty),
            ExprKind::Function(scope) => write!(f, "function#{}", scope.0),
            ExprKind::Paren(inner) => write!(f, "({})", inner),
            ExprKind::Unary {
                op,
                prefix: true,
                operand,
            } => write!(f, "{}{}", op, operand),
            ExprKind::Unary { op, operand, .. } => write!(f, "{}{}", operand, op),
            ExprKind::TypeOf(inner) => write!(f, "typeof {}", inner),
            ExprKind::Spread(inner) => write!(f, "...{}", inner),
            ExprKind::Template { head, spans } => {
                write!(f, "`{}", head)?;
                for (expr, literal) in spans {
                    write!(f, "${{{}}}{}", expr, literal)?;
                }
                write!(f, "`")
            }
            ExprKind::PropertyAccess { object, property } => write!(f, "{}.{}", object, property),
            ExprKind::EnumerateKeys(inner) => write!(f, "keys({})", inner),
            ExprKind::Unsupported(text) => write!(f, "{}", text),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

// ============================================================================
// Statements
// ============================================================================

/// A statement
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Node kind and children
    pub kind: StmtKind,
    /// Source position
    pub span: Option<Span>,
}

/// `case`/`default` clause of a switch
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchClause {
    /// Case test; `None` for the default clause
    pub test: Option<Expr>,
    /// Scope holding the clause's declarations
    pub scope: Option<ScopeId>,
    /// Clause body
    pub body: Vec<Stmt>,
}

/// `catch` clause
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Catch binding
    pub var: Option<VarKey>,
    /// Scope holding the catch binding
    pub scope: Option<ScopeId>,
    /// Handler body
    pub body: Box<Stmt>,
}

/// Statement node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// Variable declarations; initializers live on the declared variables
    Var(Vec<VarKey>),
    Block {
        scope: Option<ScopeId>,
        stmts: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Return(Option<Expr>),
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        scope: Option<ScopeId>,
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        next: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        scope: Option<ScopeId>,
        var: VarKey,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        scope: Option<ScopeId>,
        var: VarKey,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Switch {
        discriminant: Expr,
        clauses: Vec<SwitchClause>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Try {
        block: Box<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Box<Stmt>>,
    },
    Throw(Expr),
    FunctionDecl(ScopeId),
    Namespace(ScopeId),
    Empty,
    Unsupported(String),
}

impl Stmt {
    /// Create a statement of the given kind
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: None }
    }

    /// Attach a source position
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.span = Some(Span::new(line, column));
        self
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    pub fn var(keys: Vec<VarKey>) -> Self {
        Self::new(StmtKind::Var(keys))
    }

    pub fn block(scope: Option<ScopeId>, stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block { scope, stmts })
    }

    pub fn if_(cond: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn return_(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn while_(cond: Expr, body: Stmt) -> Self {
        Self::new(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn do_while(body: Stmt, cond: Expr) -> Self {
        Self::new(StmtKind::DoWhile {
            body: Box::new(body),
            cond,
        })
    }

    pub fn for_(
        scope: Option<ScopeId>,
        init: Option<Stmt>,
        cond: Option<Expr>,
        next: Option<Expr>,
        body: Stmt,
    ) -> Self {
        Self::new(StmtKind::For {
            scope,
            init: init.map(Box::new),
            cond,
            next,
            body: Box::new(body),
        })
    }

    pub fn switch(discriminant: Expr, clauses: Vec<SwitchClause>) -> Self {
        Self::new(StmtKind::Switch {
            discriminant,
            clauses,
        })
    }

    pub fn break_(label: Option<&str>) -> Self {
        Self::new(StmtKind::Break(label.map(str::to_string)))
    }

    pub fn continue_(label: Option<&str>) -> Self {
        Self::new(StmtKind::Continue(label.map(str::to_string)))
    }

    pub fn labeled(label: impl Into<String>, body: Stmt) -> Self {
        Self::new(StmtKind::Labeled {
            label: label.into(),
            body: Box::new(body),
        })
    }

    pub fn throw(value: Expr) -> Self {
        Self::new(StmtKind::Throw(value))
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Expr(e) => write!(f, "{};", e),
            StmtKind::Var(keys) => write!(f, "var <{} bindings>;", keys.len()),
            StmtKind::Block { stmts, .. } => write!(f, "{{ <{} statements> }}", stmts.len()),
            StmtKind::If { cond, .. } => write!(f, "if ({}) ...", cond),
            StmtKind::Return(Some(e)) => write!(f, "return {};", e),
            StmtKind::Return(None) => write!(f, "return;"),
            StmtKind::While { cond, .. } => write!(f, "while ({}) ...", cond),
            StmtKind::DoWhile { cond, .. } => write!(f, "do ... while ({})", cond),
            StmtKind::For { .. } => write!(f, "for (...) ..."),
            StmtKind::ForIn { object, .. } => write!(f, "for (... in {}) ...", object),
            StmtKind::ForOf { iterable, .. } => write!(f, "for (... of {}) ...", iterable),
            StmtKind::Switch { discriminant, .. } => write!(f, "switch ({}) ...", discriminant),
            StmtKind::Break(Some(l)) => write!(f, "break {};", l),
            StmtKind::Break(None) => write!(f, "break;"),
            StmtKind::Continue(Some(l)) => write!(f, "continue {};", l),
            StmtKind::Continue(None) => write!(f, "continue;"),
            StmtKind::Labeled { label, .. } => write!(f, "{}: ...", label),
            StmtKind::Try { .. } => write!(f, "try ..."),
            StmtKind::Throw(e) => write!(f, "throw {};", e),
            StmtKind::FunctionDecl(scope) => write!(f, "function#{} ...", scope.0),
            StmtKind::Namespace(scope) => write!(f, "namespace#{} ...", scope.0),
            StmtKind::Empty => write!(f, ";"),
            StmtKind::Unsupported(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_operator() {
        assert_eq!(BinaryOp::AddAssign.compound_operator(), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::Assign.compound_operator(), None);
        assert!(BinaryOp::ModAssign.is_assignment());
        assert!(!BinaryOp::Lt.is_assignment());
        assert!(BinaryOp::StrictNe.is_comparison());
    }

    #[test]
    fn test_expr_display() {
        let call = Expr::call(
            Expr::property(Expr::ident("p", TypeId::ANY), "move", TypeId::ANY),
            vec![Expr::int(1), Expr::string("a")],
            TypeId::VOID,
        );
        assert_eq!(call.to_string(), "p.move(1, \"a\")");

        let post = Expr::unary(UnaryOp::Inc, false, Expr::ident("i", TypeId::INT));
        assert_eq!(post.to_string(), "i++");
        assert_eq!(post.ty, TypeId::INT);
    }

    #[test]
    fn test_stmt_display() {
        let stmt = Stmt::if_(
            Expr::compare(BinaryOp::Gt, Expr::ident("x", TypeId::NUMBER), Expr::int(0)),
            Stmt::break_(None),
            None,
        );
        assert_eq!(stmt.to_string(), "if (x > 0) ...");
        assert_eq!(Stmt::continue_(Some("outer")).to_string(), "continue outer;");
    }
}
