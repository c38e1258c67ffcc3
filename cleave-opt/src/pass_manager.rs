//! Registration and execution of compiler passes.
use crate::traversal::{
    ConstructVisitor, DiagnosticPass, Named, PassOpt, Visitor,
};
use cleave_ir::{self as ir, Printer};
use cleave_utils::{Error, MultiError};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::time::Instant;

pub type PassResult<T> = std::result::Result<T, MultiError>;

/// Top-level type for all passes that transform an [ir::Context].
pub type PassClosure = Box<dyn Fn(&mut ir::Context) -> PassResult<()>>;

/// A registered pass: the closure that runs it and the help text
/// describing it.
struct RegisteredPass {
    runner: PassClosure,
    help: String,
}

/// Tracks the passes and pass aliases known to the compiler and runs pass
/// pipelines over a program.
#[derive(Default)]
pub struct PassManager {
    /// Registered passes. The map is ordered so help output lists passes
    /// alphabetically without further bookkeeping.
    passes: BTreeMap<String, RegisteredPass>,
    /// Aliases, already expanded to the pass sequences they stand for.
    aliases: BTreeMap<String, Vec<String>>,
}

impl PassManager {
    /// Register a pass. The pass fails the pipeline by returning an error
    /// from one of its visitor hooks.
    pub fn register_pass<P>(&mut self) -> PassResult<()>
    where
        P: Visitor + ConstructVisitor + Named,
    {
        self.insert::<P>(Box::new(|ctx| {
            P::do_pass_default(ctx)?;
            Ok(())
        }))
    }

    /// Register a diagnostic pass. The pass runs to completion collecting
    /// problems; recorded errors fail the pipeline afterwards, and
    /// warnings are logged when there is no error.
    pub fn register_diagnostic<P>(&mut self) -> PassResult<()>
    where
        P: Visitor + ConstructVisitor + Named + DiagnosticPass,
    {
        self.insert::<P>(Box::new(|ctx| {
            let mut pass = P::from(ctx)?;
            pass.do_pass(ctx)?;
            let diag = pass.diagnostics();
            if diag.has_errors() {
                return Err(diag.errors().cloned().collect::<Vec<_>>().into());
            }
            diag.warnings()
                .for_each(|w| log::warn!(target: P::name(), "{w:?}"));
            Ok(())
        }))
    }

    fn insert<P: Named>(&mut self, runner: PassClosure) -> PassResult<()> {
        let name = P::name();
        if self.passes.contains_key(name) {
            return Err(Error::misc(format!(
                "a pass named `{name}' is already registered"
            ))
            .into());
        }
        let entry = RegisteredPass {
            runner,
            help: Self::help_entry(name, P::description(), &P::opts()),
        };
        self.passes.insert(name.to_string(), entry);
        Ok(())
    }

    fn help_entry(name: &str, description: &str, opts: &[PassOpt]) -> String {
        let mut help = format!("- {name}: {description}");
        for opt in opts {
            write!(
                &mut help,
                "\n  * {}: {} (default: {})",
                opt.name(),
                opt.description(),
                opt.default()
            )
            .unwrap();
        }
        help
    }

    /// Define `alias` as shorthand for a sequence of passes or previously
    /// defined aliases. Unknown names are rejected here, not at run time.
    pub fn add_alias(
        &mut self,
        alias: &str,
        passes: &[&str],
    ) -> PassResult<()> {
        if self.aliases.contains_key(alias) {
            return Err(Error::misc(format!(
                "an alias named `{alias}' is already registered"
            ))
            .into());
        }
        let mut expanded = Vec::new();
        for pass in passes {
            if let Some(seq) = self.aliases.get(*pass) {
                expanded.extend(seq.iter().cloned());
            } else if self.passes.contains_key(*pass) {
                expanded.push(pass.to_string());
            } else {
                return Err(Error::misc(format!(
                    "alias `{alias}' refers to unknown pass `{pass}'"
                ))
                .into());
            }
        }
        self.aliases.insert(alias.to_string(), expanded);
        Ok(())
    }

    /// Expand a name that may be an alias into the passes it stands for.
    fn expand(&self, name: &str) -> Vec<String> {
        match self.aliases.get(name) {
            Some(seq) => seq.clone(),
            None => vec![name.to_string()],
        }
    }

    /// Help text for one pass or alias, if the name is known.
    pub fn specific_help(&self, name: &str) -> Option<String> {
        if let Some(pass) = self.passes.get(name) {
            return Some(pass.help.clone());
        }
        self.aliases.get(name).map(|seq| {
            let lines: Vec<String> =
                seq.iter().map(|p| format!("- {p}")).collect();
            format!(
                "`{name}' is shorthand for the pass pipeline:\n{}",
                lines.join("\n")
            )
        })
    }

    /// Help text covering every registered pass and alias.
    pub fn complete_help(&self) -> String {
        let mut out = String::from("Passes:\n");
        for pass in self.passes.values() {
            writeln!(out, "{}", pass.help).unwrap();
        }
        out.push_str("\nAliases:\n");
        for (alias, seq) in &self.aliases {
            writeln!(out, "- {alias}: {}", seq.join(", ")).unwrap();
        }
        out
    }

    /// Run the passes selected by `incl` (aliases allowed) over `ctx`,
    /// skipping any selected by `excl`.
    pub fn execute_plan(
        &self,
        ctx: &mut ir::Context,
        incl: &[String],
        excl: &[String],
        dump_ir: bool,
    ) -> PassResult<()> {
        let plan: Vec<String> =
            incl.iter().flat_map(|name| self.expand(name)).collect();
        let skip: HashSet<String> =
            excl.iter().flat_map(|name| self.expand(name)).collect();

        if let Some(unknown) = plan
            .iter()
            .chain(skip.iter())
            .find(|name| !self.passes.contains_key(*name))
        {
            return Err(Error::misc(format!(
                "unknown pass: {unknown}. Known passes and aliases:\n{}",
                self.complete_help()
            ))
            .into());
        }

        for name in plan {
            if skip.contains(&name) {
                log::info!("{name}: Ignored");
                continue;
            }
            let start = Instant::now();
            (self.passes[&name].runner)(ctx)?;
            if dump_ir {
                Printer::write_context(ctx, &mut std::io::stdout())
                    .map_err(Error::from)?;
            }
            let elapsed = start.elapsed();
            // Surface slow passes more prominently.
            if elapsed.as_secs() > 5 {
                log::warn!("{name}: {}ms", elapsed.as_millis());
            } else {
                log::info!("{name}: {}ms", elapsed.as_millis());
            }
        }

        Ok(())
    }
}
