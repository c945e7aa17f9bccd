pub mod search_driver;

use anyhow::Context;
use scatter::optimizer::{Optimizer, OptimizerConfig};
use scatter::plan::{explain_to_string, Plan};
use scatter::properties::RequiredPropertySet;
use scatter_integration::catalog::Catalog;
use scatter_integration::conversion::{to_physical_plan, to_required_props};
use scatter_integration::scenario::{from_yaml_reader, Scenario, ScenarioSuite};
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};

pub trait OptimizerFactory {
    type O: Optimizer;
    fn create(&self, plan: Plan, required: RequiredPropertySet, config: OptimizerConfig)
        -> Self::O;
}

pub struct TestCaseRunner<F> {
    /// Input file path.
    pub paths: Vec<PathBuf>,
    pub optimizer_factory: F,
}

impl<F: OptimizerFactory> TestCaseRunner<F> {
    pub fn run(self) {
        for path in &self.paths {
            let file = File::options()
                .read(true)
                .open(path)
                .with_context(|| format!("Failed to open test case file: {:?}", &path))
                .unwrap();

            let suite: ScenarioSuite = from_yaml_reader(file)
                .with_context(|| format!("Failed to load test cases from file: {:?}", &path))
                .unwrap();

            let catalog = Catalog::try_new(&suite.tables)
                .with_context(|| format!("Failed to build catalog of file: {:?}", &path))
                .unwrap();

            for scenario in suite.cases {
                self.run_case(path, &catalog, scenario);
            }
        }
    }

    fn run_case<P: AsRef<Path> + Debug>(&self, path: &P, catalog: &Catalog, scenario: Scenario) {
        let required = to_required_props(&scenario.required).unwrap();
        let result = to_physical_plan(&scenario.plan, catalog).and_then(|plan| {
            self.optimizer_factory
                .create(plan, required, scenario.config.clone())
                .find_best_plan()
        });

        match (&scenario.expected_optimized_plan, &scenario.expected_error) {
            (Some(expected), None) => {
                let optimized_plan = result
                    .with_context(|| format!("Failed to optimize {} in {:?}", scenario.name, path))
                    .unwrap();
                assert_eq!(
                    expected,
                    &explain_to_string(&optimized_plan).unwrap(),
                    "Optimized plan for {} in {:?} is different.",
                    scenario.name,
                    path
                );
            }
            (None, Some(expected)) => {
                let err = result.expect_err(&format!(
                    "Converting or optimizing {} in {:?} should fail",
                    scenario.name, path
                ));
                assert!(
                    err.to_string().contains(expected.as_str()),
                    "Error of {} in {:?} is different: {}",
                    scenario.name,
                    path,
                    err
                );
            }
            _ => panic!(
                "Scenario {} in {:?} needs exactly one of expected_optimized_plan and expected_error",
                scenario.name, path
            ),
        }
    }
}
