//! 人脸/微笑流水线的七个阶段

use log::{debug, error, info};

use crate::core::detector::{Detector, FaceFinder};
use crate::core::error::SmileFaceError;
use crate::core::media::FrameSource;
use crate::core::video::annotate::FaceAnnotator;
use crate::core::video::frame::FrameRecord;
use crate::frame_pipeline::cancel::CancelToken;
use crate::frame_pipeline::executor::{StageChain, StageItem};
use crate::frame_pipeline::handoff::{HandoffSender, PushOutcome};

pub const STAGE_ACQUIRE: &str = "acquire";
pub const STAGE_GRAYSCALE: &str = "grayscale";
pub const STAGE_RESIZE: &str = "resize";
pub const STAGE_EQUALIZE: &str = "equalize";
pub const STAGE_DETECT_FACES: &str = "detect-faces";
pub const STAGE_ANNOTATE: &str = "annotate";
pub const STAGE_HANDOFF: &str = "hand-off";

pub const STAGE_NAMES: [&str; 7] = [
    STAGE_ACQUIRE,
    STAGE_GRAYSCALE,
    STAGE_RESIZE,
    STAGE_EQUALIZE,
    STAGE_DETECT_FACES,
    STAGE_ANNOTATE,
    STAGE_HANDOFF,
];

impl StageItem for FrameRecord {
    fn on_dropped(&mut self, stage: &'static str) {
        self.mark_dropped();
        debug!("🗑️ frame {} dropped at '{}'", self.index, stage);
    }
}

/// Wire the per-frame work into a chain ending at the hand-off queue.
///
/// Acquisition stops at end of stream, on a source error or once `cancel`
/// is set. The last stage blocks while the queue is full and drops the
/// frame once the run is cancelled; a vanished consumer cancels the run.
/// Dropped frames are reported to the executor as not accepted.
pub fn build_chain<'a, S, F, A>(
    source: &'a mut S,
    finder: &'a mut FaceFinder<F>,
    annotator: &'a mut FaceAnnotator<A>,
    scale: f64,
    queue: HandoffSender<FrameRecord>,
    cancel: &'a CancelToken,
) -> StageChain<'a, FrameRecord>
where
    S: FrameSource,
    F: Detector,
    A: Detector,
{
    let mut next_index = 0u64;

    StageChain::<FrameRecord>::source(STAGE_ACQUIRE, move || {
        if cancel.is_cancelled() {
            return None;
        }
        match source.next_frame() {
            Ok(Some(image)) => {
                let record = FrameRecord::acquired(next_index, image);
                next_index += 1;
                Some(record)
            }
            Ok(None) => {
                info!("📭 end of stream after {} frames", next_index);
                None
            }
            Err(e) => {
                error!("❌ frame acquisition failed after {} frames: {}", next_index, e);
                None
            }
        }
    })
    .filter(STAGE_GRAYSCALE, |mut record: FrameRecord| {
        record.to_grayscale();
        record
    })
    .filter(STAGE_RESIZE, move |mut record: FrameRecord| {
        record.downscale(scale);
        record
    })
    .filter(STAGE_EQUALIZE, |mut record: FrameRecord| {
        record.equalize();
        record
    })
    .filter(STAGE_DETECT_FACES, move |mut record: FrameRecord| {
        let faces = finder.find_or_empty(&record.small);
        record.set_faces(faces);
        record
    })
    .filter(STAGE_ANNOTATE, move |mut record: FrameRecord| {
        annotator.annotate_record(&mut record);
        record
    })
    .sink(STAGE_HANDOFF, move |record: FrameRecord| {
        match queue.push(record, cancel) {
            PushOutcome::Delivered => true,
            PushOutcome::Cancelled(mut record) => {
                record.on_dropped(STAGE_HANDOFF);
                false
            }
            PushOutcome::Disconnected(mut record) => {
                error!(
                    "Pipeline caught an exception on the queue: {}",
                    SmileFaceError::QueueDisconnected
                );
                cancel.cancel();
                record.on_dropped(STAGE_HANDOFF);
                false
            }
        }
    })
}
