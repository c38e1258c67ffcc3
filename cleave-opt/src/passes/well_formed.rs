use crate::traversal::{
    Action, ConstructVisitor, DiagnosticContext, DiagnosticPass, Named,
    VisResult, Visitor,
};
use cleave_ir::{self as ir, Function};
use cleave_utils::{CleaveResult, Error};

/// Checks the structural invariants the rest of the compiler assumes:
/// every function ends in exactly one terminator, definitions dominate
/// their uses, and the value use lists agree with the operand lists.
pub struct WellFormed {
    diag: DiagnosticContext,
}

impl ConstructVisitor for WellFormed {
    fn from(_ctx: &ir::Context) -> CleaveResult<Self> {
        Ok(WellFormed {
            diag: DiagnosticContext::default(),
        })
    }

    // The diagnostics are the product of the pass; they survive the run
    // so the caller can report them.
    fn clear_data(&mut self) {}
}

impl Named for WellFormed {
    fn name() -> &'static str {
        "well-formed"
    }

    fn description() -> &'static str {
        "checks the structural invariants of the program"
    }
}

impl DiagnosticPass for WellFormed {
    fn diagnostics(&self) -> &DiagnosticContext {
        &self.diag
    }
}

impl WellFormed {
    fn check_terminator(&mut self, func: &Function) {
        let terminators = func
            .body
            .ops()
            .iter()
            .filter(|op| op.borrow().is_terminator())
            .count();
        match func.body.terminator() {
            None => self.diag.err(Error::malformed_structure(format!(
                "function `{}' does not end in a terminator",
                func.name
            ))),
            Some(ret_op) => {
                if terminators != 1 {
                    self.diag.err(Error::malformed_structure(format!(
                        "function `{}' contains {terminators} terminators",
                        func.name
                    )));
                }
                let ret_types: Vec<_> = ret_op
                    .borrow()
                    .operands()
                    .iter()
                    .map(|v| v.borrow().ty().clone())
                    .collect();
                if ret_types != func.signature.results {
                    self.diag.err(Error::malformed_structure(format!(
                        "function `{}' returns {} values but its signature declares {}",
                        func.name,
                        ret_types.len(),
                        func.signature.results.len()
                    )));
                }
            }
        }
    }

    fn check_dominance(&mut self, func: &Function) {
        for op in func.body.ops() {
            for operand in op.borrow().operands() {
                let operand = operand.borrow();
                if let Some(def) = operand.defining_op() {
                    if func.body.contains(&def) {
                        if !func.body.is_before(&def, op) {
                            self.diag.err(Error::malformed_structure(
                                format!(
                                    "in function `{}': `{}' uses a value defined below it by `{}'",
                                    func.name,
                                    op.borrow().opcode(),
                                    def.borrow().opcode()
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_use_lists(&mut self, func: &Function) {
        for op in func.body.ops() {
            let op_id = op.borrow().id();
            for (index, operand) in op.borrow().operands().iter().enumerate()
            {
                let registered = operand
                    .borrow()
                    .uses()
                    .iter()
                    .any(|u| u.user_id == op_id && u.index == index);
                if !registered {
                    self.diag.err(Error::malformed_structure(format!(
                        "in function `{}': operand {index} of `{}' is missing from the value's use list",
                        func.name,
                        op.borrow().opcode()
                    )));
                }
            }
            for result in op.borrow().results() {
                let result_id = result.borrow().id();
                for u in result.borrow().uses() {
                    let user = u.user.upgrade();
                    let holds = user
                        .borrow()
                        .operands()
                        .get(u.index)
                        .is_some_and(|v| v.borrow().id() == result_id);
                    if !holds {
                        self.diag.err(Error::malformed_structure(format!(
                            "in function `{}': stale use recorded on a result of `{}'",
                            func.name,
                            op.borrow().opcode()
                        )));
                    }
                }
            }
        }
    }
}

impl Visitor for WellFormed {
    fn start(&mut self, func: &mut Function, _funcs: &[Function]) -> VisResult {
        self.check_terminator(func);
        self.check_dominance(func);
        self.check_use_lists(func);
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::ConstructVisitor;
    use cleave_ir::{
        Attributes, Builder, Context, Function, Signature, Type,
    };

    fn check(ctx: &mut Context) -> usize {
        let mut pass = <WellFormed as ConstructVisitor>::from(ctx).unwrap();
        pass.do_pass(ctx).unwrap();
        pass.diagnostics().errors().count()
    }

    #[test]
    fn accepts_well_formed_functions() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![Type::F32], vec![Type::F32]),
        );
        let mut builder = Builder::new(&mut func);
        let arg = builder.param(0);
        let neg = builder.add_op(
            "neg",
            vec![arg],
            vec![Type::F32],
            Attributes::default(),
        );
        builder.add_return(vec![neg.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);
        assert_eq!(check(&mut ctx), 0);
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![]));
        let mut builder = Builder::new(&mut func);
        builder.add_op("nop", vec![], vec![], Attributes::default());
        let mut ctx = Context::new(vec![func]);
        assert_eq!(check(&mut ctx), 1);
    }

    #[test]
    fn rejects_signature_mismatch() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        builder.add_return(vec![]);
        let mut ctx = Context::new(vec![func]);
        assert_eq!(check(&mut ctx), 1);
    }
}
