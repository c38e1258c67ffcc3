//! Implements the visitor interface for passes over a program.
//! Passes implemented as a [Visitor] are invoked on a [ir::Context] and
//! visit every [ir::Function] in it.
use super::{Action, ConstructVisitor, FuncTraversal, Named, Order, VisResult};
use cleave_ir::{self as ir, Context, Function};
use cleave_utils::CleaveResult;

/// The visiting interface for a program.
///
/// A pass usually overrides [Visitor::start] (per function) and, when it
/// needs to restructure the module itself — say, to insert functions it
/// produced — [Visitor::finish_context].
pub trait Visitor {
    /// Precondition for this pass to run on the program. If this function
    /// returns None, the pass triggers. Otherwise it aborts and logs the
    /// string as the reason.
    fn precondition(_ctx: &ir::Context) -> Option<String>
    where
        Self: Sized,
    {
        None
    }

    /// Define the iteration order in which functions should be visited.
    #[inline(always)]
    fn iteration_order() -> Order
    where
        Self: Sized,
    {
        Order::No
    }

    /// Run the visitor on a given program [Context]. The functions are
    /// temporarily taken out of the context and visited in the order
    /// defined by [Visitor::iteration_order]; afterwards
    /// [Visitor::finish_context] runs with the reassembled context.
    ///
    /// After the pass completes, [ConstructVisitor::clear_data] resets the
    /// visitor's state.
    fn do_pass(&mut self, context: &mut Context) -> CleaveResult<()>
    where
        Self: Sized + ConstructVisitor + Named,
    {
        if let Some(msg) = Self::precondition(&*context) {
            log::info!("Skipping `{}': {msg}", Self::name());
            return Ok(());
        }

        let funcs = std::mem::take(&mut context.functions);
        let mut traversal = FuncTraversal::new(funcs, Self::iteration_order());
        traversal.apply_update(|func, funcs| {
            self.start(func, funcs)?
                .and_then(|| self.finish(func, funcs))?;
            Ok(())
        })?;
        context.functions = traversal.take();

        self.finish_context(context)?;
        self.clear_data();

        Ok(())
    }

    /// Build a [Default] implementation of this pass and call
    /// [Visitor::do_pass] using it.
    #[inline(always)]
    fn do_pass_default(context: &mut Context) -> CleaveResult<Self>
    where
        Self: ConstructVisitor + Sized + Named,
    {
        let mut visitor = Self::from(&*context)?;
        visitor.do_pass(context)?;
        Ok(visitor)
    }

    /// Executed when the traversal reaches a function. `funcs` holds the
    /// remaining functions of the module, in module order.
    fn start(&mut self, _func: &mut Function, _funcs: &[Function]) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed after [Visitor::start] for each function.
    fn finish(
        &mut self,
        _func: &mut Function,
        _funcs: &[Function],
    ) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed once after every function has been visited. This is the
    /// place for module-level restructuring, e.g. inserting newly created
    /// functions.
    fn finish_context(&mut self, _ctx: &mut Context) -> CleaveResult<()> {
        Ok(())
    }
}
