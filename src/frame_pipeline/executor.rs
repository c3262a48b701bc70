use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, SendError, Sender};
use log::{debug, error};

use crate::core::error::{Result, SmileFaceError};
use crate::frame_pipeline::cancel::CancelToken;
use crate::frame_pipeline::timing::StageTimings;

/// Item type flowing through a [`StageChain`].
pub trait StageItem: Send {
    /// Called when a cancelled run discards the item at `stage`.
    fn on_dropped(&mut self, _stage: &'static str) {}
}

pub type SourceFn<'a, T> = Box<dyn FnMut() -> Option<T> + Send + 'a>;
pub type FilterFn<'a, T> = Box<dyn FnMut(T) -> T + Send + 'a>;
/// Returns `false` when the sink had to discard the item.
pub type SinkFn<'a, T> = Box<dyn FnMut(T) -> bool + Send + 'a>;

struct Named<S> {
    name: &'static str,
    stage: S,
}

/// Ordered stages: one source, any number of filters, one sink.
/// Every stage is serial and in-order.
pub struct StageChain<'a, T> {
    source: Named<SourceFn<'a, T>>,
    filters: Vec<Named<FilterFn<'a, T>>>,
    sink: Named<SinkFn<'a, T>>,
}

pub struct ChainBuilder<'a, T> {
    source: Named<SourceFn<'a, T>>,
    filters: Vec<Named<FilterFn<'a, T>>>,
}

impl<'a, T> StageChain<'a, T> {
    /// Start a chain. The source returns `None` to stop the pipeline.
    pub fn source<F>(name: &'static str, source: F) -> ChainBuilder<'a, T>
    where
        F: FnMut() -> Option<T> + Send + 'a,
    {
        ChainBuilder {
            source: Named {
                name,
                stage: Box::new(source),
            },
            filters: Vec::new(),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        std::iter::once(self.source.name)
            .chain(self.filters.iter().map(|f| f.name))
            .chain(std::iter::once(self.sink.name))
            .collect()
    }

    /// Number of stages, source and sink included.
    pub fn len(&self) -> usize {
        self.filters.len() + 2
    }
}

impl<'a, T> ChainBuilder<'a, T> {
    pub fn filter<F>(mut self, name: &'static str, filter: F) -> Self
    where
        F: FnMut(T) -> T + Send + 'a,
    {
        self.filters.push(Named {
            name,
            stage: Box::new(filter),
        });
        self
    }

    pub fn sink<F>(self, name: &'static str, sink: F) -> StageChain<'a, T>
    where
        F: FnMut(T) -> bool + Send + 'a,
    {
        StageChain {
            source: self.source,
            filters: self.filters,
            sink: Named {
                name,
                stage: Box::new(sink),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items emitted by the source.
    pub produced: u64,
    /// Items the sink accepted.
    pub completed: u64,
    /// Items discarded in flight, by a cancelled run or by the sink.
    pub dropped: u64,
}

/// Runs a [`StageChain`] to completion. Returns once the source stopped and
/// every in-flight item was completed or dropped.
pub trait StagedExecutor {
    fn run<'a, T: StageItem + 'a>(
        &self,
        chain: StageChain<'a, T>,
        cancel: &CancelToken,
        timings: &StageTimings,
    ) -> Result<RunSummary>;
}

#[derive(Default)]
struct Counters {
    produced: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn summary(&self) -> RunSummary {
        RunSummary {
            produced: self.produced.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }
}

/// 每个阶段一个工作线程（rayon 线程池），阶段之间用有界通道连接
#[derive(Debug, Clone)]
pub struct ThreadedExecutor {
    link_capacity: usize,
}

impl ThreadedExecutor {
    pub fn new(link_capacity: usize) -> Self {
        Self {
            link_capacity: link_capacity.max(1),
        }
    }
}

impl Default for ThreadedExecutor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl StagedExecutor for ThreadedExecutor {
    fn run<'a, T: StageItem + 'a>(
        &self,
        chain: StageChain<'a, T>,
        cancel: &CancelToken,
        timings: &StageTimings,
    ) -> Result<RunSummary> {
        let StageChain {
            source,
            filters,
            sink,
        } = chain;

        // one thread per stage plus the one that enters the scope
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(filters.len() + 3)
            .thread_name(|i| format!("pipeline-stage-{}", i))
            .build()
            .map_err(|e| SmileFaceError::Executor(e.to_string()))?;

        let counters = Counters::default();
        let failed_stage: Mutex<Option<&'static str>> = Mutex::new(None);
        let link_capacity = self.link_capacity;

        {
            let counters = &counters;
            let failed_stage = &failed_stage;

            pool.scope(move |scope| {
                let (tx, mut rx) = bounded::<T>(link_capacity);
                scope.spawn(move |_| {
                    guarded(source.name, cancel, failed_stage, || {
                        source_worker(source, tx, cancel, timings, counters)
                    })
                });

                for filter in filters {
                    let (tx, next_rx) = bounded::<T>(link_capacity);
                    let input = rx;
                    rx = next_rx;
                    scope.spawn(move |_| {
                        guarded(filter.name, cancel, failed_stage, || {
                            filter_worker(filter, input, tx, cancel, timings, counters)
                        })
                    });
                }

                scope.spawn(move |_| {
                    guarded(sink.name, cancel, failed_stage, || {
                        sink_worker(sink, rx, cancel, timings, counters)
                    })
                });
            });
        }

        let failed = failed_stage.lock().map(|stage| *stage).unwrap_or(None);
        if let Some(stage) = failed {
            return Err(SmileFaceError::StagePanicked(stage.to_string()));
        }

        let summary = counters.summary();
        debug!("🏁 pipeline finished: {:?}", summary);
        Ok(summary)
    }
}

/// A panicking stage cancels the run instead of tearing down the pool.
fn guarded<F: FnOnce()>(
    name: &'static str,
    cancel: &CancelToken,
    failed_stage: &Mutex<Option<&'static str>>,
    work: F,
) {
    if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
        error!("❌ stage '{}' panicked, cancelling pipeline", name);
        cancel.cancel();
        if let Ok(mut failed) = failed_stage.lock() {
            if failed.is_none() {
                *failed = Some(name);
            }
        }
    }
}

fn forward<T: StageItem>(
    out: &Sender<T>,
    item: T,
    stage: &'static str,
    counters: &Counters,
) -> bool {
    match out.send(item) {
        Ok(()) => true,
        Err(SendError(mut item)) => {
            item.on_dropped(stage);
            counters.dropped.fetch_add(1, Ordering::SeqCst);
            false
        }
    }
}

fn source_worker<T: StageItem>(
    mut source: Named<SourceFn<'_, T>>,
    out: Sender<T>,
    cancel: &CancelToken,
    timings: &StageTimings,
    counters: &Counters,
) {
    while !cancel.is_cancelled() {
        let started = Instant::now();
        let Some(item) = (source.stage)() else {
            break;
        };
        timings.record(source.name, started.elapsed());
        counters.produced.fetch_add(1, Ordering::SeqCst);

        if !forward(&out, item, source.name, counters) {
            break;
        }
    }
    debug!("stage '{}' stopped", source.name);
}

fn filter_worker<T: StageItem>(
    mut filter: Named<FilterFn<'_, T>>,
    input: Receiver<T>,
    out: Sender<T>,
    cancel: &CancelToken,
    timings: &StageTimings,
    counters: &Counters,
) {
    for mut item in input.iter() {
        if cancel.is_cancelled() {
            item.on_dropped(filter.name);
            counters.dropped.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        let started = Instant::now();
        let item = (filter.stage)(item);
        timings.record(filter.name, started.elapsed());

        if !forward(&out, item, filter.name, counters) {
            break;
        }
    }
    debug!("stage '{}' stopped", filter.name);
}

fn sink_worker<T: StageItem>(
    mut sink: Named<SinkFn<'_, T>>,
    input: Receiver<T>,
    cancel: &CancelToken,
    timings: &StageTimings,
    counters: &Counters,
) {
    for mut item in input.iter() {
        if cancel.is_cancelled() {
            item.on_dropped(sink.name);
            counters.dropped.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        let started = Instant::now();
        let accepted = (sink.stage)(item);
        timings.record(sink.name, started.elapsed());
        if accepted {
            counters.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
    debug!("stage '{}' stopped", sink.name);
}

/// Pushes each item through every stage on the calling thread before
/// pulling the next one. Panics propagate to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl StagedExecutor for InlineExecutor {
    fn run<'a, T: StageItem + 'a>(
        &self,
        chain: StageChain<'a, T>,
        cancel: &CancelToken,
        timings: &StageTimings,
    ) -> Result<RunSummary> {
        let StageChain {
            mut source,
            mut filters,
            mut sink,
        } = chain;
        let mut summary = RunSummary::default();

        'items: while !cancel.is_cancelled() {
            let started = Instant::now();
            let Some(mut item) = (source.stage)() else {
                break;
            };
            timings.record(source.name, started.elapsed());
            summary.produced += 1;

            for filter in filters.iter_mut() {
                if cancel.is_cancelled() {
                    item.on_dropped(filter.name);
                    summary.dropped += 1;
                    continue 'items;
                }
                let started = Instant::now();
                item = (filter.stage)(item);
                timings.record(filter.name, started.elapsed());
            }

            if cancel.is_cancelled() {
                item.on_dropped(sink.name);
                summary.dropped += 1;
                continue;
            }
            let started = Instant::now();
            let accepted = (sink.stage)(item);
            timings.record(sink.name, started.elapsed());
            if accepted {
                summary.completed += 1;
            } else {
                summary.dropped += 1;
            }
        }

        Ok(summary)
    }
}
