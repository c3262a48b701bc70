pub mod cancel;
pub mod executor;
pub mod handoff;
pub mod stages;
pub mod timing;

pub use cancel::CancelToken;
pub use executor::{InlineExecutor, RunSummary, StageChain, StageItem, StagedExecutor, ThreadedExecutor};
pub use handoff::{handoff_queue, HandoffQueue, HandoffSender, Popped, PushOutcome};
pub use stages::{build_chain, STAGE_NAMES};
pub use timing::{StageSummary, StageTiming, StageTimings};
