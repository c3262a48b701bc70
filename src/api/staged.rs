//! 七阶段流水线 + 主线程显示

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::api::sequential::KEY_POLL_DELAY_MS;
use crate::core::config::AppConfig;
use crate::core::detector::{Detector, FaceFinder};
use crate::core::error::{Result, SmileFaceError};
use crate::core::media::{is_quit_key, FrameDisplay, FrameSource};
use crate::core::video::annotate::FaceAnnotator;
use crate::core::video::frame::FrameRecord;
use crate::frame_pipeline::cancel::CancelToken;
use crate::frame_pipeline::executor::{StageItem, StagedExecutor};
use crate::frame_pipeline::handoff::{handoff_queue, HandoffQueue, Popped};
use crate::frame_pipeline::stages::build_chain;
use crate::frame_pipeline::timing::StageTimings;

/// How long the display loop waits for a finished frame before re-checking
/// the cancel token.
pub const DISPLAY_POP_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct StagedReport {
    pub produced: u64,
    pub displayed: u64,
    /// Frames that made it into the hand-off queue.
    pub handed_off: u64,
    /// Queued frames thrown away after the display loop ended.
    pub drained: u64,
    /// Frames produced but never shown.
    pub discarded: u64,
    pub peak_queue_depth: usize,
    pub quit_by_key: bool,
    pub elapsed: Duration,
    pub timings: StageTimings,
}

#[derive(Debug, Default)]
struct DisplayOutcome {
    displayed: u64,
    peak_depth: usize,
    quit_by_key: bool,
}

/// Runs the seven-stage chain on a scoped thread and shows finished frames
/// on the calling thread until the stream ends or a quit key is pressed.
pub fn run_staged<E, S, F, A, W>(
    config: &AppConfig,
    executor: &E,
    source: &mut S,
    finder: &mut FaceFinder<F>,
    annotator: &mut FaceAnnotator<A>,
    display: &mut W,
) -> Result<StagedReport>
where
    E: StagedExecutor + Sync,
    S: FrameSource,
    F: Detector,
    A: Detector,
    W: FrameDisplay,
{
    let cancel_token = CancelToken::new();
    let timings = StageTimings::new();
    let (sender, queue) = handoff_queue::<FrameRecord>(config.queue_capacity);
    let started = Instant::now();

    let cancel = &cancel_token;
    let stage_timings = &timings;

    let (summary, outcome, drained) = thread::scope(|scope| -> Result<_> {
        let pipeline = thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn_scoped(scope, move || {
                let chain = build_chain(source, finder, annotator, config.scale, sender, cancel);
                executor.run(chain, cancel, stage_timings)
            })?;

        let shown = display_loop(&config.window_title, &queue, cancel, display);
        if shown.is_err() {
            cancel.cancel();
        }

        let joined = pipeline.join();
        let drained = queue.drain_with(|mut record| record.on_dropped("display"));
        if drained > 0 {
            debug!("🧹 discarded {} queued frames", drained);
        }

        let outcome = shown?;
        let summary = joined
            .map_err(|_| SmileFaceError::StagePanicked("pipeline".to_string()))??;
        Ok((summary, outcome, drained as u64))
    })?;

    let report = StagedReport {
        produced: summary.produced,
        displayed: outcome.displayed,
        handed_off: summary.completed,
        drained,
        discarded: summary.produced.saturating_sub(outcome.displayed),
        peak_queue_depth: outcome.peak_depth,
        quit_by_key: outcome.quit_by_key,
        elapsed: started.elapsed(),
        timings,
    };
    info!(
        "✅ staged run finished: {} produced, {} displayed, {} discarded",
        report.produced, report.displayed, report.discarded
    );
    Ok(report)
}

/// Ends on a quit key, on cancellation, or once the pipeline hung up and
/// the queue is empty.
fn display_loop<W: FrameDisplay>(
    title: &str,
    queue: &HandoffQueue<FrameRecord>,
    cancel: &CancelToken,
    display: &mut W,
) -> Result<DisplayOutcome> {
    let mut outcome = DisplayOutcome::default();

    while !cancel.is_cancelled() {
        outcome.peak_depth = outcome.peak_depth.max(queue.len());

        let mut record = match queue.pop_timeout(DISPLAY_POP_TIMEOUT) {
            Popped::Item(record) => record,
            Popped::Empty => continue,
            Popped::Closed => break,
        };

        if let Some(key) = display.poll_key(KEY_POLL_DELAY_MS)? {
            if is_quit_key(key) {
                info!("⏹️ quit key pressed, stopping pipeline");
                outcome.quit_by_key = true;
                cancel.cancel();
            }
        }

        display.show(title, &record.image)?;
        record.mark_delivered();
        outcome.displayed += 1;
    }

    Ok(outcome)
}
