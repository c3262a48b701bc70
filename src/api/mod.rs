pub mod sequential;
pub mod staged;

pub use sequential::{process_frame, run_sequential, SequentialReport};
pub use staged::{run_staged, StagedReport};
