//! Defines the default passes available to the pass manager.
use crate::pass_manager::{PassManager, PassResult};
use crate::passes::{DeviceClustering, WellFormed};
use crate::traversal::Named;

impl PassManager {
    pub fn default_passes() -> PassResult<Self> {
        // Construct the pass manager and register all passes.
        let mut pm = PassManager::default();

        // Validation passes
        pm.register_diagnostic::<WellFormed>()?;

        // Partitioning passes
        pm.register_pass::<DeviceClustering>()?;

        pm.add_alias("none", &[])?;
        pm.add_alias("all", &[WellFormed::name(), DeviceClustering::name()])?;

        Ok(pm)
    }
}

#[cfg(test)]
mod tests {
    use crate::pass_manager::PassManager;
    use cleave_ir::{Attributes, Builder, Context, Function, Signature, Type};

    #[test]
    fn the_default_pipeline_partitions_a_module() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::F32]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op(
            "iota",
            vec![],
            vec![Type::F32],
            Attributes::default(),
        );
        builder.add_return(vec![a.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);

        let pm = PassManager::default_passes().unwrap();
        pm.execute_plan(&mut ctx, &["all".to_string()], &[], false)
            .unwrap();

        assert_eq!(ctx.functions.len(), 2);
        assert!(ctx.find_function("f_gpu").is_some());
    }

    #[test]
    fn unknown_passes_are_rejected() {
        let pm = PassManager::default_passes().unwrap();
        let mut ctx = Context::default();
        assert!(pm
            .execute_plan(&mut ctx, &["no-such-pass".to_string()], &[], false)
            .is_err());
    }

    #[test]
    fn aliases_may_not_point_at_nothing() {
        let mut pm = PassManager::default_passes().unwrap();
        assert!(pm.add_alias("broken", &["no-such-pass"]).is_err());
        assert!(pm.specific_help("all").is_some());
        assert!(pm.specific_help("no-such-pass").is_none());
    }
}
