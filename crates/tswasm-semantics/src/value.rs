//! Semantic values
//!
//! The typed value graph the builder produces from expression trees, and the
//! block/branch primitives flattened function bodies are made of. Every value
//! carries its resolved type and, for object values, the shape its member
//! accesses were resolved against.

use std::fmt;

use tswasm_frontend::{BinaryOp, Span, UnaryOp};

use crate::nodes::{FuncId, VarId};
use crate::object_model::{DescId, DispatchKind, MemberAccess, ShapeId};
use crate::types::ValueTypeId;

/// Block identifier, unique within one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Number(f64),
    Boolean(bool),
    String(String),
    Null,
    Undefined,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Number(v) => write!(f, "{:?}", v),
            Literal::Boolean(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Null => write!(f, "null"),
            Literal::Undefined => write!(f, "undefined"),
        }
    }
}

/// Conversion between type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    ValueToValue,
    ValueToAny,
    ValueToUnion,
    ValueToString,
    ObjectToAny,
    ObjectToUnion,
    /// Truthiness or numeric conversion of an object
    ObjectToValue,
    ObjectToString,
    ObjectToObject,
    AnyToValue,
    AnyToObject,
    UnionToValue,
    UnionToObject,
    UnionToAny,
}

impl CastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CastKind::ValueToValue => "value_to_value",
            CastKind::ValueToAny => "value_to_any",
            CastKind::ValueToUnion => "value_to_union",
            CastKind::ValueToString => "value_to_string",
            CastKind::ObjectToAny => "object_to_any",
            CastKind::ObjectToUnion => "object_to_union",
            CastKind::ObjectToValue => "object_to_value",
            CastKind::ObjectToString => "object_to_string",
            CastKind::ObjectToObject => "object_to_object",
            CastKind::AnyToValue => "any_to_value",
            CastKind::AnyToObject => "any_to_object",
            CastKind::UnionToValue => "union_to_value",
            CastKind::UnionToObject => "union_to_object",
            CastKind::UnionToAny => "union_to_any",
        }
    }
}

/// Receiver category of an element access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    String,
    Array,
    /// Keyed access on an `any` or object value
    Dynamic,
}

/// Source construct of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterationKind {
    /// `for (k in o)`: iterates the enumerated keys
    In,
    /// `for (v of xs)`
    Of,
}

/// One entry of a closure-init list: context slot ← outer variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureInit {
    pub slot: u32,
    pub from: VarId,
}

/// Scope boundary of a flattened body
#[derive(Debug, Clone, PartialEq)]
pub struct BlockValue {
    pub id: BlockId,
    pub label: String,
    /// Branching to a loop block restarts it; branching to any other block
    /// leaves it
    pub is_loop: bool,
    pub values: Vec<SemanticsValue>,
    /// Variables scoped to this block
    pub var_list: Vec<VarId>,
    /// Variables held by reference cell
    pub ref_list: Vec<VarId>,
}

impl BlockValue {
    pub fn new(id: BlockId, label: impl Into<String>, is_loop: bool) -> Self {
        Self {
            id,
            label: label.into(),
            is_loop,
            values: Vec::new(),
            var_list: Vec::new(),
            ref_list: Vec::new(),
        }
    }
}

/// Native structured exception region
#[derive(Debug, Clone, PartialEq)]
pub struct TryValue {
    pub body: BlockValue,
    pub catch_var: Option<VarId>,
    pub catch: Option<BlockValue>,
    pub finally: Option<BlockValue>,
    /// Boolean local set when the finally block must rethrow
    pub rethrow_flag: VarId,
}

/// Value kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Literal(Literal),
    /// Variable read
    Var(VarId),
    /// Variable write
    Assign {
        var: VarId,
        value: Box<SemanticsValue>,
    },
    /// Reference to a module-level function
    Function(FuncId),
    /// Closure creation with the values copied into its context record
    NewClosure {
        func: FuncId,
        init: Vec<ClosureInit>,
    },
    /// Class value (static side)
    Class(DescId),
    This,
    Super,
    Binary {
        op: BinaryOp,
        left: Box<SemanticsValue>,
        right: Box<SemanticsValue>,
    },
    Unary {
        op: UnaryOp,
        prefix: bool,
        operand: Box<SemanticsValue>,
    },
    Conditional {
        cond: Box<SemanticsValue>,
        when_true: Box<SemanticsValue>,
        when_false: Box<SemanticsValue>,
    },
    Comma(Vec<SemanticsValue>),
    Cast {
        kind: CastKind,
        value: Box<SemanticsValue>,
    },
    /// Direct call of a module-level function
    Call {
        func: FuncId,
        args: Vec<SemanticsValue>,
    },
    /// Call of a closure value
    ClosureCall {
        callee: Box<SemanticsValue>,
        args: Vec<SemanticsValue>,
    },
    /// Call of an `any` value
    DynamicCall {
        callee: Box<SemanticsValue>,
        args: Vec<SemanticsValue>,
    },
    /// `super(...)` inside a derived constructor
    ConstructorCall {
        desc: DescId,
        ctor: Option<FuncId>,
        args: Vec<SemanticsValue>,
    },
    New {
        desc: DescId,
        ctor: Option<FuncId>,
        args: Vec<SemanticsValue>,
    },
    NewArray {
        element: ValueTypeId,
        len: Option<Box<SemanticsValue>>,
        items: Vec<SemanticsValue>,
    },
    /// Object literal with field values in slot order
    NewLiteral {
        desc: DescId,
        fields: Vec<SemanticsValue>,
    },
    MemberGet {
        object: Box<SemanticsValue>,
        access: MemberAccess,
    },
    MemberSet {
        object: Box<SemanticsValue>,
        access: MemberAccess,
        value: Box<SemanticsValue>,
    },
    MemberCall {
        object: Box<SemanticsValue>,
        access: MemberAccess,
        args: Vec<SemanticsValue>,
    },
    ElementGet {
        kind: ElementKind,
        object: Box<SemanticsValue>,
        index: Box<SemanticsValue>,
    },
    ElementSet {
        kind: ElementKind,
        object: Box<SemanticsValue>,
        index: Box<SemanticsValue>,
        value: Box<SemanticsValue>,
    },
    TypeOf(Box<SemanticsValue>),
    Spread(Box<SemanticsValue>),
    EnumerateKeys(Box<SemanticsValue>),
    /// Create an iterator over a value
    IteratorNew {
        kind: IterationKind,
        iterable: Box<SemanticsValue>,
    },
    /// Advance an iterator; true while it produced a value
    IteratorNext(VarId),
    /// Current value of an iterator
    IteratorValue(VarId),
    /// Fresh reference cells for by-reference loop variables
    Rebinding(Vec<VarId>),
    Block(BlockValue),
    BlockBranch {
        target: BlockId,
    },
    /// Branch when `cond` evaluates to `when`
    BlockBranchIf {
        target: BlockId,
        cond: Box<SemanticsValue>,
        when: bool,
    },
    Return(Option<Box<SemanticsValue>>),
    Throw(Box<SemanticsValue>),
    Try(Box<TryValue>),
}

/// A typed value
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticsValue {
    pub kind: ValueKind,
    pub ty: ValueTypeId,
    /// Shape member accesses on this value resolve against
    pub shape: Option<ShapeId>,
    pub location: Option<Span>,
}

impl SemanticsValue {
    pub fn new(kind: ValueKind, ty: ValueTypeId) -> Self {
        Self {
            kind,
            ty,
            shape: None,
            location: None,
        }
    }

    pub fn literal(lit: Literal) -> Self {
        let ty = match lit {
            Literal::Int(_) => ValueTypeId::INT,
            Literal::Number(_) => ValueTypeId::NUMBER,
            Literal::Boolean(_) => ValueTypeId::BOOLEAN,
            Literal::String(_) => ValueTypeId::RAW_STRING,
            Literal::Null => ValueTypeId::NULL,
            Literal::Undefined => ValueTypeId::UNDEFINED,
        };
        Self::new(ValueKind::Literal(lit), ty)
    }

    pub fn var(var: VarId, ty: ValueTypeId) -> Self {
        Self::new(ValueKind::Var(var), ty)
    }

    pub fn assign(var: VarId, value: SemanticsValue) -> Self {
        let ty = value.ty;
        Self::new(
            ValueKind::Assign {
                var,
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn block(block: BlockValue) -> Self {
        Self::new(ValueKind::Block(block), ValueTypeId::VOID)
    }

    pub fn branch(target: BlockId) -> Self {
        Self::new(ValueKind::BlockBranch { target }, ValueTypeId::VOID)
    }

    pub fn branch_if(target: BlockId, cond: SemanticsValue, when: bool) -> Self {
        Self::new(
            ValueKind::BlockBranchIf {
                target,
                cond: Box::new(cond),
                when,
            },
            ValueTypeId::VOID,
        )
    }

    pub fn with_shape(mut self, shape: Option<ShapeId>) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_location(mut self, location: Option<Span>) -> Self {
        self.location = location;
        self
    }

    /// Same value under another static type
    pub fn retyped(mut self, ty: ValueTypeId) -> Self {
        self.ty = ty;
        self
    }

    /// Dispatch strategy of a member get/set/call
    pub fn dispatch(&self) -> Option<DispatchKind> {
        match &self.kind {
            ValueKind::MemberGet { access, .. }
            | ValueKind::MemberSet { access, .. }
            | ValueKind::MemberCall { access, .. } => Some(access.kind()),
            _ => None,
        }
    }

    /// Literal payload
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ValueKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Whether evaluating this value leaves the enclosing basic block
    pub fn is_control(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Block(_)
                | ValueKind::BlockBranch { .. }
                | ValueKind::BlockBranchIf { .. }
                | ValueKind::Return(_)
                | ValueKind::Throw(_)
                | ValueKind::Try(_)
        )
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[SemanticsValue]) -> fmt::Result {
    for arg in args {
        write!(f, " {}", arg)?;
    }
    Ok(())
}

/// Compact s-expression form; nested blocks print their label only
impl fmt::Display for SemanticsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Literal(lit) => write!(f, "{}", lit),
            ValueKind::Var(v) => write!(f, "{}", v),
            ValueKind::Assign { var, value } => write!(f, "(set {} {})", var, value),
            ValueKind::Function(func) => write!(f, "{}", func),
            ValueKind::NewClosure { func, init } => {
                write!(f, "(closure {}", func)?;
                for i in init {
                    write!(f, " [{}]={}", i.slot, i.from)?;
                }
                write!(f, ")")
            }
            ValueKind::Class(desc) => write!(f, "(class {})", desc),
            ValueKind::This => write!(f, "this"),
            ValueKind::Super => write!(f, "super"),
            ValueKind::Binary { op, left, right } => write!(f, "({} {} {})", op, left, right),
            ValueKind::Unary {
                op,
                prefix: true,
                operand,
            } => write!(f, "({} {})", op, operand),
            ValueKind::Unary { op, operand, .. } => write!(f, "({} {} post)", op, operand),
            ValueKind::Conditional {
                cond,
                when_true,
                when_false,
            } => write!(f, "(? {} {} {})", cond, when_true, when_false),
            ValueKind::Comma(items) => {
                write!(f, "(,")?;
                write_args(f, items)?;
                write!(f, ")")
            }
            ValueKind::Cast { kind, value } => write!(f, "({} {})", kind.as_str(), value),
            ValueKind::Call { func, args } => {
                write!(f, "(call {}", func)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            ValueKind::ClosureCall { callee, args } => {
                write!(f, "(call_closure {}", callee)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            ValueKind::DynamicCall { callee, args } => {
                write!(f, "(call_dynamic {}", callee)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            ValueKind::ConstructorCall { desc, args, .. } => {
                write!(f, "(super_ctor {}", desc)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            ValueKind::New { desc, args, .. } => {
                write!(f, "(new {}", desc)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            ValueKind::NewArray { len, items, .. } => {
                write!(f, "(new_array")?;
                if let Some(len) = len {
                    write!(f, " len={}", len)?;
                }
                write_args(f, items)?;
                write!(f, ")")
            }
            ValueKind::NewLiteral { desc, fields } => {
                write!(f, "(new_literal {}", desc)?;
                write_args(f, fields)?;
                write!(f, ")")
            }
            ValueKind::MemberGet { object, access } => write!(f, "(get {} [{}])", object, access),
            ValueKind::MemberSet {
                object,
                access,
                value,
            } => write!(f, "(put {} [{}] {})", object, access, value),
            ValueKind::MemberCall {
                object,
                access,
                args,
            } => {
                write!(f, "(invoke {} [{}]", object, access)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            ValueKind::ElementGet { object, index, .. } => write!(f, "(elem {} {})", object, index),
            ValueKind::ElementSet {
                object,
                index,
                value,
                ..
            } => write!(f, "(elem_set {} {} {})", object, index, value),
            ValueKind::TypeOf(v) => write!(f, "(typeof {})", v),
            ValueKind::Spread(v) => write!(f, "(spread {})", v),
            ValueKind::EnumerateKeys(v) => write!(f, "(keys {})", v),
            ValueKind::IteratorNew { kind, iterable } => match kind {
                IterationKind::In => write!(f, "(iter_in {})", iterable),
                IterationKind::Of => write!(f, "(iter_of {})", iterable),
            },
            ValueKind::IteratorNext(v) => write!(f, "(iter_next {})", v),
            ValueKind::IteratorValue(v) => write!(f, "(iter_value {})", v),
            ValueKind::Rebinding(vars) => {
                write!(f, "(rebind")?;
                for v in vars {
                    write!(f, " {}", v)?;
                }
                write!(f, ")")
            }
            ValueKind::Block(block) => write!(f, "(block {})", block.label),
            ValueKind::BlockBranch { target } => write!(f, "(br {})", target),
            ValueKind::BlockBranchIf { target, cond, when } => {
                write!(f, "(br_if{} {} {})", if *when { "" } else { "_not" }, target, cond)
            }
            ValueKind::Return(Some(v)) => write!(f, "(return {})", v),
            ValueKind::Return(None) => write!(f, "(return)"),
            ValueKind::Throw(v) => write!(f, "(throw {})", v),
            ValueKind::Try(t) => write!(f, "(try {})", t.body.label),
        }
    }
}
