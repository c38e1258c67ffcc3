//! An IR context: the top-level object holding every function in a
//! program. Passes transform the functions in the context.
use crate::Function;
use cleave_utils::Id;
use std::collections::HashSet;

/// A compiled module: an ordered list of functions plus the options passed
/// through to individual passes.
#[derive(Default)]
pub struct Context {
    /// The functions in this module, in definition order.
    pub functions: Vec<Function>,
    /// Extra options provided on the command line, interpreted by
    /// individual passes (`pass:opt=val`).
    pub extra_opts: Vec<String>,
}

impl Context {
    pub fn new(functions: Vec<Function>) -> Self {
        Context {
            functions,
            extra_opts: Vec::new(),
        }
    }

    /// Position of the function named `name`.
    pub fn position<S: Into<Id>>(&self, name: S) -> Option<usize> {
        let name = name.into();
        self.functions.iter().position(|f| f.name == name)
    }

    /// The function named `name`, if present.
    pub fn find_function<S: Into<Id>>(&self, name: S) -> Option<&Function> {
        let name = name.into();
        self.functions.iter().find(|f| f.name == name)
    }

    /// All symbol names defined in the module.
    pub fn defined_names(&self) -> HashSet<Id> {
        self.functions.iter().map(|f| f.name).collect()
    }

    /// Insert `func` at `index`, shifting later functions down.
    pub fn insert(&mut self, index: usize, func: Function) {
        self.functions.insert(index, func);
    }
}
