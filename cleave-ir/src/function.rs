use crate::{Attributes, Block, Operation, Type, RRC};
use cleave_utils::Id;

/// The parameter and result types of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl Signature {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        Signature { params, results }
    }
}

/// A function: a symbol name, a signature, and a single entry block whose
/// final operation is the terminator carrying the return values.
#[derive(Debug)]
pub struct Function {
    /// The symbol name of the function.
    pub name: Id,
    /// Parameter and result types.
    pub signature: Signature,
    /// The entry (and only) block.
    pub body: Block,
    /// Attributes attached to the function itself.
    pub attributes: Attributes,
    /// Whether the symbol is visible outside the module.
    pub public: bool,
}

impl Function {
    /// Construct a function with an empty body. Block parameters are
    /// created from the signature's parameter types.
    pub fn new<S: Into<Id>>(name: S, signature: Signature) -> Self {
        let body = Block::new(signature.params.clone());
        Function {
            name: name.into(),
            signature,
            body,
            attributes: Attributes::default(),
            public: false,
        }
    }

    /// The function's terminator. Panics if the body is not yet
    /// terminated.
    pub fn terminator(&self) -> RRC<Operation> {
        self.body
            .terminator()
            .unwrap_or_else(|| panic!("function `{}' has no terminator", self.name))
    }
}
