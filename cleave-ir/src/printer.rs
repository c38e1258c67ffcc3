//! Implements a formatter for the in-memory representation of a program.
//! Printing clones inner handles and performs no mutation.
use crate::{
    AttrValue, Attributes, Block, Context, Function, Operation, ValueId, RRC,
};
use itertools::Itertools;
use std::collections::HashMap;
use std::io;

/// Printer for the IR.
pub struct Printer;

/// Names assigned to values while printing a function.
#[derive(Default)]
struct ValueNames {
    names: HashMap<ValueId, String>,
    next: usize,
}

impl ValueNames {
    fn param(&mut self, id: ValueId, index: usize) {
        self.names.insert(id, format!("%arg{index}"));
    }

    fn fresh(&mut self, id: ValueId) -> String {
        let name = format!("%{}", self.next);
        self.next += 1;
        self.names.insert(id, name.clone());
        name
    }

    fn get(&self, id: ValueId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| "%?".to_string())
    }
}

impl Printer {
    /// Format attributes of the form `{key = val, ...}`.
    /// Returns the empty string if `attrs` is empty.
    pub fn format_attributes(attrs: &Attributes) -> String {
        if attrs.is_empty() {
            return String::new();
        }
        format!(
            " {{{}}}",
            attrs.to_string_with(", ", |key, val| match val {
                AttrValue::Unit => format!("{key}"),
                AttrValue::Num(n) => format!("{key} = {n}"),
                AttrValue::Str(s) => format!("{key} = \"{s}\""),
                AttrValue::NumList(ns) =>
                    format!("{key} = [{}]", ns.iter().join(", ")),
            })
        )
    }

    /// Write the whole context.
    pub fn write_context<W: io::Write>(
        ctx: &Context,
        out: &mut W,
    ) -> io::Result<()> {
        for func in &ctx.functions {
            Self::write_function(func, out)?;
            writeln!(out)?;
        }
        Ok(())
    }

    /// Write a single function.
    pub fn write_function<W: io::Write>(
        func: &Function,
        out: &mut W,
    ) -> io::Result<()> {
        let mut names = ValueNames::default();
        for param in func.body.params() {
            let param = param.borrow();
            names.param(param.id(), param.index());
        }
        let params = func
            .body
            .params()
            .iter()
            .map(|p| {
                let p = p.borrow();
                format!("{}: {}", names.get(p.id()), p.ty())
            })
            .join(", ");
        let results = func.signature.results.iter().join(", ");
        writeln!(
            out,
            "{}func @{}({params}) -> ({results}){} {{",
            if func.public { "pub " } else { "" },
            func.name,
            Self::format_attributes(&func.attributes),
        )?;
        Self::write_block(&func.body, &mut names, 2, out)?;
        writeln!(out, "}}")
    }

    fn write_block<W: io::Write>(
        block: &Block,
        names: &mut ValueNames,
        indent: usize,
        out: &mut W,
    ) -> io::Result<()> {
        for op in block.ops() {
            Self::write_op(op, names, indent, out)?;
        }
        Ok(())
    }

    fn write_op<W: io::Write>(
        op: &RRC<Operation>,
        names: &mut ValueNames,
        indent: usize,
        out: &mut W,
    ) -> io::Result<()> {
        let o = op.borrow();
        let results = o
            .results()
            .iter()
            .map(|r| names.fresh(r.borrow().id()))
            .join(", ");
        let operands = o
            .operands()
            .iter()
            .map(|v| names.get(v.borrow().id()))
            .join(", ");
        write!(out, "{:indent$}", "")?;
        if !o.results().is_empty() {
            write!(out, "{results} = ")?;
        }
        write!(
            out,
            "\"{}\"({operands}){}",
            o.opcode(),
            Self::format_attributes(&o.attributes)
        )?;
        if o.regions.is_empty() {
            writeln!(out)?;
        } else {
            for region in &o.regions {
                writeln!(out, " {{")?;
                for block in &region.blocks {
                    Self::write_block(block, names, indent + 2, out)?;
                }
                write!(out, "{:indent$}}}", "")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Render a function to a string, for logs and test failures.
    pub fn function_to_str(func: &Function) -> String {
        let mut buf = Vec::new();
        Self::write_function(func, &mut buf)
            .expect("writing to a vector cannot fail");
        String::from_utf8_lossy(&buf).to_string()
    }
}
