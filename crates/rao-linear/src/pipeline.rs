//! Ordered execution of problem fillers against one model.

use crate::fillers::ProblemFiller;
use crate::inputs::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::linear_problem::LinearProblem;
use rao_core::RaoResult;
use tracing::debug;

/// Fillers run in insertion order; later fillers may read what earlier ones created.
#[derive(Default)]
pub struct FillerPipeline<'a> {
    fillers: Vec<Box<dyn ProblemFiller + 'a>>,
}

impl<'a> FillerPipeline<'a> {
    pub fn new() -> Self {
        Self { fillers: Vec::new() }
    }

    pub fn push(&mut self, filler: impl ProblemFiller + 'a) {
        self.fillers.push(Box::new(filler));
    }

    pub fn with(mut self, filler: impl ProblemFiller + 'a) -> Self {
        self.push(filler);
        self
    }

    pub fn len(&self) -> usize {
        self.fillers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fillers.is_empty()
    }

    /// Filler names, in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.fillers.iter().map(|f| f.name()).collect()
    }

    pub fn fill(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for filler in &mut self.fillers {
            debug!(filler = filler.name(), "Filling");
            filler.fill(lp, flows, sensitivities, activation)?;
        }
        Ok(())
    }

    pub fn update_between_sensi_iteration(
        &mut self,
        lp: &mut LinearProblem,
        flows: &dyn FlowResult,
        sensitivities: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for filler in &mut self.fillers {
            filler.update_between_sensi_iteration(lp, flows, sensitivities, activation)?;
        }
        Ok(())
    }

    pub fn update_between_mip_iteration(
        &mut self,
        lp: &mut LinearProblem,
        activation: &dyn RangeActionActivationResult,
    ) -> RaoResult<()> {
        for filler in &mut self.fillers {
            filler.update_between_mip_iteration(lp, activation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_utils::*;
    use crate::fillers::{CoreProblemFiller, MaxMinMarginFiller};
    use crate::parameters::RangeActionsOptimizationParameters;
    use rao_core::{RaoError, Unit};

    #[test]
    fn test_fillers_run_in_order() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);

        let mut pipeline = FillerPipeline::new()
            .with(CoreProblemFiller::new(
                &perimeter,
                &pre,
                RangeActionsOptimizationParameters::default(),
            ))
            .with(MaxMinMarginFiller::new(&perimeter, Unit::Megawatt));
        assert_eq!(pipeline.names(), vec!["core", "max min margin"]);

        let mut lp = LinearProblem::default();
        pipeline.fill(&mut lp, &flows, &sensi, &pre).expect("fill");
        assert!(lp.constraint_count() > 0);
    }

    #[test]
    fn test_out_of_order_fails() {
        let perimeter = simple_perimeter();
        let pre = initial_setpoints(&perimeter);
        let (flows, sensi) = simple_inputs(500.0, -50.0);

        let mut pipeline = FillerPipeline::new()
            .with(MaxMinMarginFiller::new(&perimeter, Unit::Megawatt))
            .with(CoreProblemFiller::new(
                &perimeter,
                &pre,
                RangeActionsOptimizationParameters::default(),
            ));
        let mut lp = LinearProblem::default();
        let err = pipeline.fill(&mut lp, &flows, &sensi, &pre).unwrap_err();
        assert!(matches!(err, RaoError::UndefinedHandle(_)));
    }
}
