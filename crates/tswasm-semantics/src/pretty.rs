//! Pretty-printing for the semantic tree
//!
//! Human-readable dump of a module graph, used by `dump_semantic_tree` and
//! in test failure output.

use std::fmt::{self, Write};

use crate::nodes::{FunctionDeclareNode, ModuleNode, VarDeclareNode};
use crate::object_model::ObjectDescription;
use crate::value::{BlockValue, SemanticsValue, ValueKind};

/// Trait for pretty-printing semantic tree constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for ModuleNode {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        let _ = write_module(&mut output, self);
        output
    }
}

impl PrettyPrint for BlockValue {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        let _ = write_block(&mut output, self, 0);
        output
    }
}

fn write_module(out: &mut String, module: &ModuleNode) -> fmt::Result {
    writeln!(out, "; module {}", module.name)?;
    writeln!(out)?;

    for desc in module.objects.descriptions() {
        write_description(out, module, desc)?;
    }
    for shape in module.objects.shapes() {
        write!(out, "; {} of {}", shape.id, shape.desc)?;
        if let Some(source) = shape.source {
            write!(out, " from {}", source)?;
        }
        writeln!(out)?;
        for (i, member) in shape.members.iter().enumerate() {
            match member {
                Some(m) => writeln!(out, ";   [{}] {}", i, m)?,
                None => writeln!(out, ";   [{}] dynamic", i)?,
            }
        }
    }
    if !module.objects.shapes().is_empty() {
        writeln!(out)?;
    }

    for var in module.globals.iter().filter_map(|g| module.var(*g)) {
        write_var(out, module, var, "global")?;
    }
    if !module.globals.is_empty() {
        writeln!(out)?;
    }

    for table in &module.imports {
        for item in &table.items {
            writeln!(out, "; import {}.{} -> {:?}", table.name, item.name, item.target)?;
        }
    }
    for table in &module.exports {
        for item in &table.items {
            writeln!(out, "; export {}.{} -> {:?}", table.name, item.name, item.target)?;
        }
    }

    for func in &module.functions {
        write_function(out, module, func)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_description(out: &mut String, module: &ModuleNode, desc: &ObjectDescription) -> fmt::Result {
    write!(out, "; {} {} `{}`", desc.kind, desc.id, desc.name)?;
    if let Some(base) = desc.base {
        write!(out, " extends {}", base)?;
    }
    if let Some(generic) = desc.generic {
        write!(out, " of {}", generic)?;
    }
    writeln!(out)?;
    for member in desc.members() {
        write!(
            out,
            ";   [{}] {:?} {}: {}",
            member.index,
            member.kind,
            member.name,
            module.types.display(member.value_type)
        )?;
        if let Some(m) = member.method {
            write!(out, " = {}", m)?;
        }
        if !member.is_own {
            write!(out, " (inherited)")?;
        }
        if member.overridden {
            write!(out, " (overridden)")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_var(out: &mut String, module: &ModuleNode, var: &VarDeclareNode, what: &str) -> fmt::Result {
    write!(
        out,
        "; {} {} {}: {} ({} #{})",
        what,
        var.id,
        var.name,
        module.types.display(var.ty),
        var.storage,
        var.index
    )?;
    if var.is_captured() {
        write!(out, " captured {:?}", var.capture)?;
    }
    if let Some(slot) = var.closure_index {
        write!(out, " slot {}", slot)?;
    }
    if let Some(init) = &var.init {
        write!(out, " = {}", init)?;
    }
    writeln!(out)
}

fn write_function(out: &mut String, module: &ModuleNode, func: &FunctionDeclareNode) -> fmt::Result {
    writeln!(
        out,
        "fn {} {} {:?}: {} {{",
        func.id,
        func.name,
        func.kind,
        module.types.display(func.ty)
    )?;
    for var in func.params.iter().filter_map(|p| module.var(*p)) {
        write!(out, "  ")?;
        write_var(out, module, var, "param")?;
    }
    for var in func.closure_vars.iter().filter_map(|p| module.var(*p)) {
        write!(out, "  ")?;
        write_var(out, module, var, "closure")?;
    }
    if let Some(ctx) = func.context {
        writeln!(out, "  ; context {}", ctx)?;
    }
    match &func.body {
        Some(body) => write_block(out, body, 2)?,
        None => writeln!(out, "  ; declared")?,
    }
    writeln!(out, "}}")
}

fn write_block(out: &mut String, block: &BlockValue, indent: usize) -> fmt::Result {
    let prefix = " ".repeat(indent);
    write!(
        out,
        "{}{} {}: {}",
        prefix,
        if block.is_loop { "loop" } else { "block" },
        block.id,
        block.label
    )?;
    if !block.var_list.is_empty() {
        let vars: Vec<String> = block.var_list.iter().map(|v| v.to_string()).collect();
        write!(out, " [{}]", vars.join(", "))?;
    }
    if !block.ref_list.is_empty() {
        let refs: Vec<String> = block.ref_list.iter().map(|v| v.to_string()).collect();
        write!(out, " ref [{}]", refs.join(", "))?;
    }
    writeln!(out)?;
    for value in &block.values {
        write_value(out, value, indent + 2)?;
    }
    Ok(())
}

fn write_value(out: &mut String, value: &SemanticsValue, indent: usize) -> fmt::Result {
    match &value.kind {
        ValueKind::Block(inner) => write_block(out, inner, indent),
        ValueKind::Try(t) => {
            let prefix = " ".repeat(indent);
            writeln!(out, "{}try (rethrow {})", prefix, t.rethrow_flag)?;
            write_block(out, &t.body, indent + 2)?;
            if let Some(catch) = &t.catch {
                match t.catch_var {
                    Some(var) => writeln!(out, "{}catch {}", prefix, var)?,
                    None => writeln!(out, "{}catch", prefix)?,
                }
                write_block(out, catch, indent + 2)?;
            }
            if let Some(finally) = &t.finally {
                writeln!(out, "{}finally", prefix)?;
                write_block(out, finally, indent + 2)?;
            }
            Ok(())
        }
        _ => writeln!(out, "{}{}", " ".repeat(indent), value),
    }
}
