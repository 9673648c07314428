//! Progress reporting contract between the workflow and its observers.
//!
//! The workflow never talks to a UI. It emits [`StatusUpdate`] events into a
//! [`ProgressSink`], and whoever owns the sink (a terminal progress bar, a
//! channel feeding a GUI thread, a test collecting events) decides how and
//! when to render them.
//!
//! Each stage owns a sub-range of the overall 0-100 bar. A [`StageReporter`]
//! rescales the stage's own `done / total` counter into that sub-range and
//! never lets the reported percentage go backwards.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use crate::upgrade::session::WorkflowStage;

/// A single status event emitted by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Stage that produced the update
    pub stage: WorkflowStage,
    /// Overall workflow progress, 0 to 100
    pub percent: u8,
    /// Human readable status line
    pub message: String,
}

/// Receiver of workflow status updates.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// download loop and from the blocking extraction thread.
pub trait ProgressSink: Send + Sync {
    /// Deliver one status update.
    fn emit(&self, update: StatusUpdate);
}

/// Shared handle to a sink, cloneable into blocking tasks.
pub type SharedSink = Arc<dyn ProgressSink>;

impl ProgressSink for UnboundedSender<StatusUpdate> {
    fn emit(&self, update: StatusUpdate) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.send(update);
    }
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _update: StatusUpdate) {}
}

/// Sink adapter for closures.
///
/// ```rust
/// use randpicker_updater::upgrade::progress::{FnSink, ProgressSink, StatusUpdate};
/// use randpicker_updater::upgrade::WorkflowStage;
///
/// let sink = FnSink(|update: StatusUpdate| println!("{}% {}", update.percent, update.message));
/// sink.emit(StatusUpdate {
///     stage: WorkflowStage::Downloading,
///     percent: 40,
///     message: "Downloading".to_string(),
/// });
/// ```
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(StatusUpdate) + Send + Sync,
{
    fn emit(&self, update: StatusUpdate) {
        (self.0)(update);
    }
}

/// Forwards updates to an inner sink and remembers the most recent one.
///
/// The orchestrator hands a tap to its stages so the session can pick up the
/// last percentage and message a stage reported.
pub struct StatusTap {
    inner: SharedSink,
    latest: Mutex<Option<StatusUpdate>>,
}

impl StatusTap {
    /// Wrap `inner`.
    pub fn new(inner: SharedSink) -> Self {
        Self {
            inner,
            latest: Mutex::new(None),
        }
    }

    /// Take the most recent update, if any arrived since the last call.
    pub fn take_latest(&self) -> Option<StatusUpdate> {
        self.latest.lock().map(|mut latest| latest.take()).unwrap_or(None)
    }
}

impl ProgressSink for StatusTap {
    fn emit(&self, update: StatusUpdate) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(update.clone());
        }
        self.inner.emit(update);
    }
}

/// A slice of the overall 0-100 progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRange {
    /// Percentage reported before any work is done
    pub start: u8,
    /// Percentage reported once the stage completes
    pub end: u8,
}

impl ProgressRange {
    /// Create a range. `start` must not exceed `end`, and `end` must not exceed 100.
    pub const fn new(start: u8, end: u8) -> Self {
        Self {
            start,
            end,
        }
    }

    /// Map `done / total` into this range.
    ///
    /// A `total` of zero means the amount of work is unknown; the start of the
    /// range is returned until the stage finishes. `done` beyond `total` is
    /// clamped to the end of the range.
    pub fn scale(&self, done: u64, total: u64) -> u8 {
        if total == 0 {
            return self.start;
        }
        let span = u64::from(self.end.saturating_sub(self.start));
        let offset = done.min(total) * span / total;
        // offset <= span <= 100
        self.start + offset as u8
    }
}

/// Reports progress for one stage into a sink.
///
/// The reporter only emits when the percentage changes or the message is
/// replaced, and keeps a high-water mark so retries (for example falling back
/// to a mirror after a partial download) never move the bar backwards.
pub struct StageReporter {
    sink: SharedSink,
    stage: WorkflowStage,
    range: ProgressRange,
    message: String,
    high_water: Option<u8>,
}

impl StageReporter {
    /// Create a reporter for `stage` covering `range`.
    pub fn new(sink: SharedSink, stage: WorkflowStage, range: ProgressRange) -> Self {
        Self {
            sink,
            stage,
            range,
            message: String::new(),
            high_water: None,
        }
    }

    /// Replace the status message and emit it at the current percentage.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        let percent = self.high_water.unwrap_or(self.range.start);
        self.high_water = Some(percent);
        self.send(percent);
    }

    /// Report `done` units out of `total`.
    pub fn report(&mut self, done: u64, total: u64) {
        let percent = self.range.scale(done, total);
        self.advance_to(percent);
    }

    /// Report completion: emits exactly the end of the range.
    pub fn finish(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.high_water = Some(self.range.end);
        self.send(self.range.end);
    }

    /// Highest percentage emitted so far.
    pub fn percent(&self) -> u8 {
        self.high_water.unwrap_or(self.range.start)
    }

    fn advance_to(&mut self, percent: u8) {
        match self.high_water {
            Some(previous) if percent <= previous => {}
            _ => {
                self.high_water = Some(percent);
                self.send(percent);
            }
        }
    }

    fn send(&self, percent: u8) {
        self.sink.emit(StatusUpdate {
            stage: self.stage,
            percent,
            message: self.message.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn collecting_reporter(
        range: ProgressRange,
    ) -> (StageReporter, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StageReporter::new(Arc::new(tx), WorkflowStage::Downloading, range), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StatusUpdate>) -> Vec<u8> {
        let mut percents = Vec::new();
        while let Ok(update) = rx.try_recv() {
            percents.push(update.percent);
        }
        percents
    }

    #[test]
    fn test_scale_maps_into_range() {
        let range = ProgressRange::new(15, 75);
        assert_eq!(range.scale(0, 100), 15);
        assert_eq!(range.scale(50, 100), 45);
        assert_eq!(range.scale(100, 100), 75);
        assert_eq!(range.scale(250, 100), 75);
    }

    #[test]
    fn test_scale_unknown_total_stays_at_start() {
        let range = ProgressRange::new(15, 75);
        assert_eq!(range.scale(12_345, 0), 15);
    }

    #[test]
    fn test_reporter_is_non_decreasing_and_ends_at_upper_bound() {
        let (mut reporter, mut rx) = collecting_reporter(ProgressRange::new(15, 75));
        for done in (0..=4096).step_by(1024) {
            reporter.report(done, 4096);
        }
        // A second attempt restarting from zero must not move the bar back.
        reporter.report(0, 4096);
        reporter.report(1024, 4096);
        reporter.finish("done");

        let percents = drain(&mut rx);
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]), "{percents:?}");
        assert_eq!(percents.last(), Some(&75));
    }

    #[test]
    fn test_reporter_skips_duplicate_percentages() {
        let (mut reporter, mut rx) = collecting_reporter(ProgressRange::new(0, 10));
        for done in 0..1000 {
            reporter.report(done, 1000);
        }
        let percents = drain(&mut rx);
        assert_eq!(percents, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_status_tap_records_latest() {
        let tap = StatusTap::new(Arc::new(NoopSink));
        assert!(tap.take_latest().is_none());
        tap.emit(StatusUpdate {
            stage: WorkflowStage::Extracting,
            percent: 80,
            message: "Extracting".to_string(),
        });
        let latest = tap.take_latest().unwrap();
        assert_eq!(latest.percent, 80);
        assert!(tap.take_latest().is_none());
    }
}
