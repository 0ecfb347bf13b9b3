// Execution state machine for declared tasks
//
// One TaskRunner drives a task instance through its attempts within a single flow
// run. States, records and the explicit run context live alongside it.

pub mod errors;
pub mod record;
pub mod run_context;
pub mod states;
pub mod task_runner;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use record::{AttemptOutcome, ExecutionRecord, TaskRunReport};
pub use run_context::RunContext;
pub use states::TaskState;
pub use task_runner::TaskRunner;
