use crate::utils::search_driver::SearchDriverFactory;
use crate::utils::TestCaseRunner;
use std::path::PathBuf;

mod utils;

#[test]
fn test_motion_scenarios() {
    let runner = TestCaseRunner {
        paths: vec![PathBuf::from("resources/motion.yaml")],
        optimizer_factory: SearchDriverFactory,
    };

    runner.run()
}
