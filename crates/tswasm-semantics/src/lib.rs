//! tswasm semantic tree builder
//!
//! Turns the front end's scope trees and typed syntax trees into a module
//! graph ready for Wasm code generation:
//! - **Types**: the value-type lattice every source type maps onto (`types`, `type_registry`)
//! - **Object model**: member-slot layouts, shapes and member dispatch (`object_model`)
//! - **Resolution**: symbol lookup and closure promotion (`context`)
//! - **Builder**: typed values and structured statement nodes (`build`)
//! - **Flattener**: structured control flow as blocks and branches (`flatten`)
//! - **Assembler**: the phased pass producing a [`ModuleNode`] (`assemble`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tswasm_frontend::ProgramBuilder;
//! use tswasm_semantics::{build_module, BuildConfig, PrettyPrint};
//!
//! let mut b = ProgramBuilder::new();
//! let main = b.global("main");
//! // ... declare variables, functions, classes and statements
//! let program = b.finish();
//!
//! let module = build_module(&program, &BuildConfig::default())?;
//! println!("{}", module.pretty_print());
//! ```

#![warn(rust_2018_idioms)]

mod build;
mod context;

pub mod assemble;
pub mod config;
pub mod error;
pub mod flatten;
pub mod nodes;
pub mod object_model;
pub mod pretty;
pub mod type_registry;
pub mod types;
pub mod value;

pub use assemble::build_module;
pub use config::BuildConfig;
pub use context::{SymbolKey, SymbolValue};
pub use error::{LookupKind, SemanticError, SemanticResult};
pub use flatten::{flatten_condition, flatten_function, LocalAllocator};
pub use nodes::{
    CaptureMode, ExternItem, ExternModule, ExternTarget, FuncId, FunctionDeclareNode, FunctionKind,
    ModuleNode, SemanticsNode, StorageKind, VarDeclareNode, VarId,
};
pub use object_model::{
    AccessMode, DescId, DispatchKind, MemberAccess, ObjectDescription, ObjectModel, ShapeId,
};
pub use pretty::PrettyPrint;
pub use types::{ValueTypeId, ValueTypeKind, ValueTypeTable};
pub use value::{BlockId, BlockValue, SemanticsValue, ValueKind};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=tswasm_semantics=debug`;
/// layout and shape construction log at `trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
