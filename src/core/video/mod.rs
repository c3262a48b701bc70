pub mod annotate;
pub mod frame;
pub mod smile;
pub mod state_machine;

pub use annotate::{AnnotationSummary, FaceAnnotator, FaceMarker};
pub use frame::{FrameRecord, Rect};
pub use smile::SmileIntensityTracker;
pub use state_machine::FrameState;
