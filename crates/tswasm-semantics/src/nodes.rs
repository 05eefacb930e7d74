//! Semantic nodes
//!
//! Declarations (variables, functions, closure contexts), the structured
//! statement nodes produced by the builder before flattening, and the
//! assembled [`ModuleNode`] handed to code generation.

use std::fmt;

use tswasm_frontend::{ScopeId, Span, VarKey};

use crate::object_model::{DescId, ObjectModel};
use crate::types::{ValueTypeId, ValueTypeTable};
use crate::value::{BlockValue, ClosureInit, SemanticsValue};

// ============================================================================
// Identifiers
// ============================================================================

/// Variable declaration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Function declaration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub(crate) u32);

impl FuncId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Closure context record id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) u32);

impl ContextId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

// ============================================================================
// Variables
// ============================================================================

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    LocalVar,
    LocalConst,
    GlobalVar,
    GlobalConst,
    ParamVar,
    /// Copy of an outer variable in a function's closure context
    ClosureVar,
    ClosureConst,
}

impl StorageKind {
    pub fn is_const(self) -> bool {
        matches!(
            self,
            StorageKind::LocalConst | StorageKind::GlobalConst | StorageKind::ClosureConst
        )
    }

    pub fn is_global(self) -> bool {
        matches!(self, StorageKind::GlobalVar | StorageKind::GlobalConst)
    }

    pub fn is_closure(self) -> bool {
        matches!(self, StorageKind::ClosureVar | StorageKind::ClosureConst)
    }

    fn as_str(self) -> &'static str {
        match self {
            StorageKind::LocalVar => "local var",
            StorageKind::LocalConst => "local const",
            StorageKind::GlobalVar => "global var",
            StorageKind::GlobalConst => "global const",
            StorageKind::ParamVar => "param",
            StorageKind::ClosureVar => "closure var",
            StorageKind::ClosureConst => "closure const",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a nested function captures a variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    #[default]
    NotCaptured,
    ByRef,
    ByValue,
}

/// A declared variable, parameter, or closure copy
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclareNode {
    pub id: VarId,
    pub name: String,
    pub storage: StorageKind,
    pub ty: ValueTypeId,
    /// Local or global slot; context slot for closure copies
    pub index: u32,
    pub capture: CaptureMode,
    /// Function whose frame holds the variable; `None` for globals
    pub owner: Option<FuncId>,
    /// The outer variable a closure copy was taken from
    pub origin: Option<VarId>,
    /// Context record a closure copy belongs to
    pub belong_ctx: Option<ContextId>,
    /// Context record a captured variable is stored in
    pub init_ctx: Option<ContextId>,
    /// Slot inside `belong_ctx` or `init_ctx`
    pub closure_index: Option<u32>,
    /// Constant initializer of a global
    pub init: Option<SemanticsValue>,
    pub is_export: bool,
    pub location: Option<Span>,
}

impl VarDeclareNode {
    pub fn new(id: VarId, name: impl Into<String>, storage: StorageKind, ty: ValueTypeId) -> Self {
        Self {
            id,
            name: name.into(),
            storage,
            ty,
            index: 0,
            capture: CaptureMode::NotCaptured,
            owner: None,
            origin: None,
            belong_ctx: None,
            init_ctx: None,
            closure_index: None,
            init: None,
            is_export: false,
            location: None,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.capture != CaptureMode::NotCaptured
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Role of a function declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Default,
    /// Module initialization function
    Start,
    Method,
    Getter,
    Setter,
    Constructor,
    Static,
}

/// Function modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FunctionFlags {
    pub is_static: bool,
    pub is_method: bool,
    pub is_declare: bool,
    pub is_decorator: bool,
    pub is_export: bool,
    pub is_start: bool,
    /// Created at its definition site as a closure value
    pub is_closure: bool,
}

/// A lowered function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclareNode {
    pub id: FuncId,
    pub name: String,
    pub kind: FunctionKind,
    pub flags: FunctionFlags,
    pub ty: ValueTypeId,
    pub params: Vec<VarId>,
    pub locals: Vec<VarId>,
    /// Closure copies of outer variables, in context-slot order
    pub closure_vars: Vec<VarId>,
    /// Values copied into the context record when the closure is created
    pub closure_init: Vec<ClosureInit>,
    /// Own context record, allocated on first capture
    pub context: Option<ContextId>,
    /// Enclosing function
    pub parent: Option<FuncId>,
    /// Owning class description for methods and constructors
    pub class: Option<DescId>,
    /// Receiver type of methods
    pub this_type: Option<ValueTypeId>,
    pub type_params: Vec<ValueTypeId>,
    /// Template of a generic specialization
    pub generic: Option<FuncId>,
    pub type_args: Vec<ValueTypeId>,
    /// Source scope
    pub scope: Option<ScopeId>,
    /// Source variables and the declarations standing for them
    pub var_keys: Vec<(VarKey, VarId)>,
    pub body: Option<BlockValue>,
    pub(crate) slots_finalized: bool,
}

impl FunctionDeclareNode {
    pub fn new(id: FuncId, name: impl Into<String>, kind: FunctionKind, ty: ValueTypeId) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            flags: FunctionFlags::default(),
            ty,
            params: Vec::new(),
            locals: Vec::new(),
            closure_vars: Vec::new(),
            closure_init: Vec::new(),
            context: None,
            parent: None,
            class: None,
            this_type: None,
            type_params: Vec::new(),
            generic: None,
            type_args: Vec::new(),
            scope: None,
            var_keys: Vec::new(),
            body: None,
            slots_finalized: false,
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty() && self.type_args.is_empty()
    }
}

// ============================================================================
// Closure contexts
// ============================================================================

/// Heap record holding the captured variables of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRecord {
    pub id: ContextId,
    pub owner: FuncId,
    /// Record of the enclosing function
    pub parent: Option<ContextId>,
    pub slots: Vec<VarId>,
}

/// Arena of context records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextArena {
    records: Vec<ContextRecord>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, owner: FuncId, parent: Option<ContextId>) -> ContextId {
        let id = ContextId(self.records.len() as u32);
        self.records.push(ContextRecord {
            id,
            owner,
            parent,
            slots: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ContextId) -> Option<&ContextRecord> {
        self.records.get(id.0 as usize)
    }

    /// Append a slot, returning its index
    pub fn push_slot(&mut self, id: ContextId, var: VarId) -> Option<u32> {
        let record = self.records.get_mut(id.0 as usize)?;
        record.slots.push(var);
        Some(record.slots.len() as u32 - 1)
    }

    pub fn records(&self) -> &[ContextRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Parent hops from `from` up to `to`; `None` when `to` is not an ancestor
    pub fn chain_length(&self, from: ContextId, to: ContextId) -> Option<usize> {
        let mut hops = 0;
        let mut current = Some(from);
        while let Some(id) = current {
            if id == to {
                return Some(hops);
            }
            current = self.get(id)?.parent;
            hops += 1;
        }
        None
    }
}

// ============================================================================
// Structured statements
// ============================================================================

/// One `case`/`default` clause
#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    /// Condition selecting this clause; `None` for `default`
    pub test: Option<SemanticsValue>,
    pub body: Vec<SemanticsNode>,
}

/// Structured statement produced by the builder
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticsNode {
    /// Straight-line values
    Basic(Vec<SemanticsValue>),
    Block {
        vars: Vec<VarId>,
        body: Vec<SemanticsNode>,
    },
    If {
        cond: SemanticsValue,
        then_branch: Box<SemanticsNode>,
        else_branch: Option<Box<SemanticsNode>>,
    },
    While {
        cond: SemanticsValue,
        body: Box<SemanticsNode>,
    },
    DoWhile {
        body: Box<SemanticsNode>,
        cond: SemanticsValue,
    },
    For {
        vars: Vec<VarId>,
        init: Vec<SemanticsNode>,
        cond: Option<SemanticsValue>,
        next: Option<SemanticsValue>,
        body: Box<SemanticsNode>,
        /// By-reference loop variables renewed each iteration
        rebinding: Vec<VarId>,
    },
    /// `for-in` and `for-of`
    ForEach {
        vars: Vec<VarId>,
        iterator: VarId,
        init: SemanticsValue,
        var: VarId,
        var_type: ValueTypeId,
        body: Box<SemanticsNode>,
    },
    Switch {
        /// Evaluates the discriminant into a temporary
        init: SemanticsValue,
        clauses: Vec<CaseClause>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Labeled {
        label: String,
        body: Box<SemanticsNode>,
    },
    Try {
        block: Box<SemanticsNode>,
        catch_var: Option<VarId>,
        catch: Option<Box<SemanticsNode>>,
        finally: Option<Box<SemanticsNode>>,
    },
    Throw(SemanticsValue),
    Return(Option<SemanticsValue>),
}

impl SemanticsNode {
    /// Short source-like form for diagnostics
    pub fn describe(&self) -> String {
        match self {
            SemanticsNode::Break(Some(l)) => format!("break {};", l),
            SemanticsNode::Break(None) => "break;".to_string(),
            SemanticsNode::Continue(Some(l)) => format!("continue {};", l),
            SemanticsNode::Continue(None) => "continue;".to_string(),
            SemanticsNode::Basic(values) => format!("<{} values>", values.len()),
            SemanticsNode::Block { .. } => "{ ... }".to_string(),
            SemanticsNode::If { cond, .. } => format!("if ({}) ...", cond),
            SemanticsNode::While { cond, .. } => format!("while ({}) ...", cond),
            SemanticsNode::DoWhile { cond, .. } => format!("do ... while ({})", cond),
            SemanticsNode::For { .. } => "for (...) ...".to_string(),
            SemanticsNode::ForEach { .. } => "for (... of ...) ...".to_string(),
            SemanticsNode::Switch { .. } => "switch (...) ...".to_string(),
            SemanticsNode::Labeled { label, .. } => format!("{}: ...", label),
            SemanticsNode::Try { .. } => "try ...".to_string(),
            SemanticsNode::Throw(v) => format!("throw {};", v),
            SemanticsNode::Return(_) => "return ...;".to_string(),
        }
    }
}

// ============================================================================
// Module
// ============================================================================

/// Kind of an imported or exported item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternKind {
    Function,
    Class,
    Var,
    Enum,
}

/// Internal declaration an external name maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternTarget {
    Function(FuncId),
    Class(DescId),
    Var(VarId),
    Enum(ValueTypeId),
}

impl ExternTarget {
    pub fn kind(&self) -> ExternKind {
        match self {
            ExternTarget::Function(_) => ExternKind::Function,
            ExternTarget::Class(_) => ExternKind::Class,
            ExternTarget::Var(_) => ExternKind::Var,
            ExternTarget::Enum(_) => ExternKind::Enum,
        }
    }
}

/// One externally visible name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternItem {
    pub name: String,
    pub target: ExternTarget,
}

/// Import or export table of one source module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternModule {
    pub name: String,
    pub items: Vec<ExternItem>,
}

/// The assembled module graph
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Entry module name
    pub name: String,
    pub types: ValueTypeTable,
    pub objects: ObjectModel,
    pub vars: Vec<VarDeclareNode>,
    pub functions: Vec<FunctionDeclareNode>,
    pub contexts: ContextArena,
    pub globals: Vec<VarId>,
    pub enums: Vec<ValueTypeId>,
    pub imports: Vec<ExternModule>,
    pub exports: Vec<ExternModule>,
    /// Start function of the entry module
    pub entry: Option<FuncId>,
    pub entry_name: String,
}

impl ModuleNode {
    pub fn var(&self, id: VarId) -> Option<&VarDeclareNode> {
        self.vars.get(id.0 as usize)
    }

    pub fn function(&self, id: FuncId) -> Option<&FunctionDeclareNode> {
        self.functions.get(id.0 as usize)
    }

    /// First function with the given name
    pub fn function_by_name(&self, name: &str) -> Option<&FunctionDeclareNode> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// First global with the given name
    pub fn global_by_name(&self, name: &str) -> Option<&VarDeclareNode> {
        self.globals
            .iter()
            .filter_map(|g| self.var(*g))
            .find(|v| v.name == name)
    }

    /// Description by name
    pub fn description_by_name(&self, name: &str) -> Option<DescId> {
        self.objects
            .descriptions()
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.id)
    }

    /// Export table of a source module
    pub fn exports_of(&self, module: &str) -> Option<&ExternModule> {
        self.exports.iter().find(|e| e.name == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_length() {
        let mut arena = ContextArena::new();
        let outer = arena.alloc(FuncId(0), None);
        let middle = arena.alloc(FuncId(1), Some(outer));
        let inner = arena.alloc(FuncId(2), Some(middle));
        assert_eq!(arena.chain_length(inner, outer), Some(2));
        assert_eq!(arena.chain_length(inner, inner), Some(0));
        assert_eq!(arena.chain_length(outer, inner), None);
        assert_eq!(arena.push_slot(middle, VarId(5)), Some(0));
        assert_eq!(arena.push_slot(middle, VarId(6)), Some(1));
    }

    #[test]
    fn test_storage_flags() {
        assert!(StorageKind::ClosureConst.is_const());
        assert!(StorageKind::ClosureConst.is_closure());
        assert!(StorageKind::GlobalVar.is_global());
        assert!(!StorageKind::ParamVar.is_const());
    }
}
