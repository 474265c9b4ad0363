//! Host lifecycle callbacks
//!
//! The host test runner reports every example's lifecycle through this
//! trait. Calls for one example arrive in order: started, then any number
//! of traced files, then exactly one of passed/failed/pending, then
//! finished. An example that never reaches finished is interrupted.

use testtrace_core::{ExampleId, ExecutionResult, Result};

/// Observer of example lifecycle events
pub trait ExampleListener {
    /// The example body is about to run
    fn on_example_started(&mut self, example_id: &ExampleId);

    /// A file under the project root was entered while the example ran
    fn on_file_traced(&mut self, file_path: &str);

    /// The example passed
    fn on_example_passed(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()>;

    /// The example failed
    fn on_example_failed(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()>;

    /// The example is pending
    fn on_example_pending(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()>;

    /// The example finished, whatever its status
    fn on_example_finished(&mut self, example_id: &ExampleId);
}
