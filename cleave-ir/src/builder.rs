//! A builder for constructing operations inside a function.
use crate::{
    clone_operation, AttrValue, Attributes, Function, Operation, Rewriter,
    Type, Value, RRC,
};
use crate::{CALL, CALLEE_ATTR, CONSTANT, RETURN, VALUE_ATTR};
use cleave_utils::Id;

/// IR builder for a function. New operations land at the end of the entry
/// block, or just before the terminator once one exists, so a fully built
/// function always ends in its `return`.
pub struct Builder<'a> {
    /// The function being modified.
    pub func: &'a mut Function,
}

impl<'a> Builder<'a> {
    pub fn new(func: &'a mut Function) -> Self {
        Builder { func }
    }

    /// The `index`-th parameter of the function being built.
    pub fn param(&self, index: usize) -> RRC<Value> {
        self.func.body.param(index)
    }

    /// Add a generic operation.
    pub fn add_op<N: Into<Id>>(
        &mut self,
        name: N,
        operands: Vec<RRC<Value>>,
        result_types: Vec<Type>,
        attributes: Attributes,
    ) -> RRC<Operation> {
        let op = Operation::build(name, operands, result_types, attributes);
        self.insert(op.clone());
        op
    }

    /// Add a `constant` operation carrying `value`.
    pub fn add_constant(&mut self, value: AttrValue, ty: Type) -> RRC<Operation> {
        let attributes =
            std::iter::once((VALUE_ATTR, value)).collect::<Attributes>();
        self.add_op(CONSTANT, vec![], vec![ty], attributes)
    }

    /// Add a `call` to the symbol `callee`.
    pub fn add_call<S: Into<Id>>(
        &mut self,
        callee: S,
        args: Vec<RRC<Value>>,
        result_types: Vec<Type>,
    ) -> RRC<Operation> {
        let attributes =
            std::iter::once((CALLEE_ATTR, AttrValue::Str(callee.into())))
                .collect::<Attributes>();
        self.add_op(CALL, args, result_types, attributes)
    }

    /// Add a `call` immediately before `anchor`.
    pub fn add_call_before<S: Into<Id>>(
        &mut self,
        anchor: &RRC<Operation>,
        callee: S,
        args: Vec<RRC<Value>>,
        result_types: Vec<Type>,
    ) -> RRC<Operation> {
        let attributes =
            std::iter::once((CALLEE_ATTR, AttrValue::Str(callee.into())))
                .collect::<Attributes>();
        let op = Operation::build(CALL, args, result_types, attributes);
        self.func.body.insert_before(op.clone(), anchor);
        op
    }

    /// Terminate the function, returning `values`.
    pub fn add_return(&mut self, values: Vec<RRC<Value>>) -> RRC<Operation> {
        debug_assert!(
            self.func.body.terminator().is_none(),
            "function `{}' already has a terminator",
            self.func.name
        );
        let op = Operation::build(
            RETURN,
            values,
            vec![],
            Attributes::default(),
        );
        self.func.body.push(op.clone());
        op
    }

    /// Clone `op` into this function, rewriting operands through
    /// `rewriter` and recording the cloned results in it.
    pub fn clone_op(
        &mut self,
        op: &RRC<Operation>,
        rewriter: &mut Rewriter,
    ) -> RRC<Operation> {
        let cloned = clone_operation(op, rewriter);
        self.insert(cloned.clone());
        cloned
    }

    /// Clone `op` to immediately before `anchor`.
    pub fn clone_op_before(
        &mut self,
        anchor: &RRC<Operation>,
        op: &RRC<Operation>,
        rewriter: &mut Rewriter,
    ) -> RRC<Operation> {
        let cloned = clone_operation(op, rewriter);
        self.func.body.insert_before(cloned.clone(), anchor);
        cloned
    }

    fn insert(&mut self, op: RRC<Operation>) {
        match self.func.body.terminator() {
            Some(term) => self.func.body.insert_before(op, &term),
            None => self.func.body.push(op),
        }
    }
}
