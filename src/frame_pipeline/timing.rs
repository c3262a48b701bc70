use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::core::error::Result;

/// One timed stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed: Duration,
}

/// Aggregate of all invocations of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: &'static str,
    pub count: u64,
    pub total_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
}

/// 各阶段耗时记录（多线程写入，加锁）
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    entries: Arc<Mutex<Vec<StageTiming>>>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: &'static str, elapsed: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(StageTiming { stage, elapsed });
        }
    }

    pub fn snapshot(&self) -> Vec<StageTiming> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// One summary per stage, in order of first appearance.
    pub fn summaries(&self) -> Vec<StageSummary> {
        let mut summaries: Vec<StageSummary> = Vec::new();

        for timing in self.snapshot() {
            let micros = timing.elapsed.as_micros() as u64;
            match summaries.iter_mut().find(|s| s.stage == timing.stage) {
                Some(summary) => {
                    summary.count += 1;
                    summary.total_us += micros;
                    summary.min_us = summary.min_us.min(micros);
                    summary.max_us = summary.max_us.max(micros);
                }
                None => summaries.push(StageSummary {
                    stage: timing.stage,
                    count: 1,
                    total_us: micros,
                    min_us: micros,
                    max_us: micros,
                    mean_us: 0.0,
                }),
            }
        }

        for summary in &mut summaries {
            summary.mean_us = summary.total_us as f64 / summary.count as f64;
        }
        summaries
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.summaries())?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_from_many_threads() {
        let timings = StageTimings::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let timings = timings.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        timings.record("grayscale", Duration::from_micros(3));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(timings.snapshot().len(), 1000);
    }

    #[test]
    fn test_summaries_keep_first_seen_order() {
        let timings = StageTimings::new();
        timings.record("acquire", Duration::from_micros(10));
        timings.record("resize", Duration::from_micros(4));
        timings.record("acquire", Duration::from_micros(30));

        let summaries = timings.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].stage, "acquire");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].min_us, 10);
        assert_eq!(summaries[0].max_us, 30);
        assert_eq!(summaries[0].mean_us, 20.0);
        assert_eq!(summaries[1].stage, "resize");
    }

    #[test]
    fn test_write_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timings.json");
        let timings = StageTimings::new();
        timings.record("hand-off", Duration::from_micros(7));

        timings.write_json(&path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["stage"], "hand-off");
        assert_eq!(parsed[0]["total_us"], 7);
    }
}
