//! tswasm front-end model
//!
//! The data the front end hands to the semantic builder:
//! - **Types**: the resolved source type table (`types` module)
//! - **Scopes**: the scope tree with declared variables and flags (`scope` module)
//! - **Syntax**: typed expression and statement trees (`ast` module)
//! - **Program**: all modules of one compilation plus name lookup (`program` module)
//!
//! Parsing and type inference live upstream; this crate only carries their result.

#![warn(rust_2018_idioms)]

pub mod ast;
pub mod builder;
pub mod program;
pub mod scope;
pub mod span;
pub mod types;

pub use ast::{BinaryOp, CatchClause, Expr, ExprKind, Stmt, StmtKind, SwitchClause, UnaryOp};
pub use builder::ProgramBuilder;
pub use program::{Binding, Program};
pub use scope::{
    ExportDecl, FunctionFlags, FunctionInfo, GlobalInfo, ImportDecl, ImportedName, MethodRole,
    Scope, ScopeId, ScopeKind, VarFlags, VarKey, VarSlot, Variable,
};
pub use span::Span;
pub use types::{
    ClassDecl, ClassKind, ClassMember, EnumDecl, EnumValue, FunctionSignature, MemberKind,
    PrimitiveKind, SourceType, TypeId, TypeTable,
};
