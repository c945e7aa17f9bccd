use crate::utils::OptimizerFactory;
use scatter::optimizer::{OptimizerConfig, OptimizerContext};
use scatter::plan::Plan;
use scatter::properties::RequiredPropertySet;
use scatter::search::SearchDriver;

pub struct SearchDriverFactory;

impl OptimizerFactory for SearchDriverFactory {
    type O = SearchDriver;

    fn create(
        &self,
        plan: Plan,
        required: RequiredPropertySet,
        config: OptimizerConfig,
    ) -> Self::O {
        SearchDriver::new(required, plan, OptimizerContext::new(config))
    }
}
