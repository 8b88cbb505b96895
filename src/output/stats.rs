//! Live progress aggregation and console report
//!
//! Every collection crawl owns a [`StatsHandle`] into one shared [`Stats`].
//! Counters move by signed deltas; the global total is the pointwise sum of
//! the per-collection counters. The report is one indicatif line per
//! collection plus three footer lines, redrawn in place on stdout, which is
//! why logging goes to stderr. When stdout is not a terminal indicatif draws
//! nothing.

use crate::output::rate::{WindowedRate, DEFAULT_WINDOW};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Adjustable progress counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    DoneIds,
    TotalIds,
    DonePages,
    TotalPages,
    Queue,
}

/// Progress counters for one collection, or the sum over all of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub done_ids: i64,
    pub total_ids: i64,
    pub done_pages: i64,
    pub total_pages: i64,
    pub queue: i64,
}

impl ProgressCounters {
    pub fn apply(&mut self, counter: Counter, delta: i64) {
        let slot = match counter {
            Counter::DoneIds => &mut self.done_ids,
            Counter::TotalIds => &mut self.total_ids,
            Counter::DonePages => &mut self.done_pages,
            Counter::TotalPages => &mut self.total_pages,
            Counter::Queue => &mut self.queue,
        };
        *slot += delta;
    }

    pub fn remaining_pages(&self) -> i64 {
        self.total_pages - self.done_pages
    }
}

/// Downloader figures shown on the last report line
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkSnapshot {
    pub inflight: usize,
    pub avg_latency_ms: f64,
}

/// A bar that only shows its message
fn report_line() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}

struct Tracked {
    name: String,
    counters: ProgressCounters,
    done_ids: WindowedRate,
    done_pages: WindowedRate,
    bar: ProgressBar,
}

impl Tracked {
    fn new(name: impl Into<String>, bar: ProgressBar) -> Self {
        Self {
            name: name.into(),
            counters: ProgressCounters::default(),
            done_ids: WindowedRate::new(DEFAULT_WINDOW),
            done_pages: WindowedRate::new(DEFAULT_WINDOW),
            bar,
        }
    }

    fn apply(&mut self, counter: Counter, delta: i64, now: Instant) {
        self.counters.apply(counter, delta);
        match counter {
            Counter::DoneIds => self.done_ids.record_at(now, delta as f64),
            Counter::DonePages => self.done_pages.record_at(now, delta as f64),
            _ => {}
        }
    }

    fn line(&mut self, now: Instant) -> String {
        let c = self.counters;
        format!(
            "[{}]: Ids: {}/{} ({:.1}/s), Pages: {}/{} ({:.1}/s), Queue: {}",
            self.name,
            c.done_ids,
            c.total_ids,
            self.done_ids.rate_at(now),
            c.done_pages,
            c.total_pages,
            self.done_pages.rate_at(now),
            c.queue
        )
    }
}

struct Inner {
    collections: Vec<Tracked>,
    total: Tracked,
    /// Signed deltas of `total_pages - done_pages`
    remaining: WindowedRate,
    remaining_bar: ProgressBar,
    network_bar: ProgressBar,
    last_report: Option<Instant>,
}

impl Inner {
    fn lines(&mut self, network: &NetworkSnapshot, now: Instant) -> Vec<String> {
        let mut lines: Vec<String> = self
            .collections
            .iter_mut()
            .map(|collection| collection.line(now))
            .collect();
        lines.push(self.total.line(now));

        let remaining = self.total.counters.remaining_pages();
        let falling = -self.remaining.rate_at(now);
        let eta = if remaining <= 0 || falling <= 0.0 {
            "N/A".to_string()
        } else {
            format_eta(Duration::from_secs_f64(remaining as f64 / falling))
        };
        lines.push(format!("Remaining: {}, ETA: {}", remaining, eta));
        lines.push(format!(
            "Inflight: {}, Avg latency: {:.0}ms",
            network.inflight, network.avg_latency_ms
        ));

        lines
    }

    /// Bars in report order, one per line of [`Inner::lines`]
    fn bars(&self) -> impl Iterator<Item = &ProgressBar> {
        self.collections
            .iter()
            .map(|collection| &collection.bar)
            .chain([&self.total.bar, &self.remaining_bar, &self.network_bar])
    }
}

/// Shared progress aggregator
pub struct Stats {
    inner: Mutex<Inner>,
    report_interval: Duration,
    multi: MultiProgress,
}

impl Stats {
    /// Creates an aggregator that redraws at most once per `report_interval`
    pub fn new(report_interval: Duration) -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stdout());
        let total = multi.add(report_line());
        let remaining_bar = multi.add(report_line());
        let network_bar = multi.add(report_line());

        Self {
            inner: Mutex::new(Inner {
                collections: Vec::new(),
                total: Tracked::new("Total", total),
                remaining: WindowedRate::new(DEFAULT_WINDOW),
                remaining_bar,
                network_bar,
                last_report: None,
            }),
            report_interval,
            multi,
        }
    }

    /// Disables console output; counters still update
    pub fn without_console(self) -> Self {
        self.multi.set_draw_target(ProgressDrawTarget::hidden());
        self
    }

    /// Adds a collection to the report and returns its handle
    ///
    /// Its line is drawn above the total.
    pub fn register(self: &Arc<Self>, name: &str) -> StatsHandle {
        let mut inner = self.lock();
        let bar = self.multi.insert_before(&inner.total.bar, report_line());
        inner.collections.push(Tracked::new(name, bar));
        StatsHandle {
            stats: Arc::clone(self),
            index: inner.collections.len() - 1,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_at(&self, index: usize, counter: Counter, delta: i64, now: Instant) {
        let mut inner = self.lock();
        if let Some(collection) = inner.collections.get_mut(index) {
            collection.apply(counter, delta, now);
        }
        inner.total.apply(counter, delta, now);
        match counter {
            Counter::TotalPages => inner.remaining.record_at(now, delta as f64),
            Counter::DonePages => inner.remaining.record_at(now, -(delta as f64)),
            _ => {}
        }
    }

    /// Counters of the collection registered at `index`
    pub fn counters(&self, index: usize) -> ProgressCounters {
        self.lock()
            .collections
            .get(index)
            .map(|c| c.counters)
            .unwrap_or_default()
    }

    /// Sum over all collections
    pub fn totals(&self) -> ProgressCounters {
        self.lock().total.counters
    }

    /// Renders the report as plain text, one line per bar
    pub fn render(&self, network: &NetworkSnapshot) -> String {
        self.render_at(network, Instant::now())
    }

    fn render_at(&self, network: &NetworkSnapshot, now: Instant) -> String {
        self.lock().lines(network, now).join("\n")
    }

    /// Redraws the report unless one was drawn within the report interval
    pub fn refresh(&self, network: &NetworkSnapshot) {
        let now = Instant::now();
        {
            let mut inner = self.lock();
            if let Some(last) = inner.last_report {
                if now.duration_since(last) < self.report_interval {
                    return;
                }
            }
            inner.last_report = Some(now);
        }
        self.log(network);
    }

    /// Redraws the report now
    pub fn log(&self, network: &NetworkSnapshot) {
        let mut inner = self.lock();
        let lines = inner.lines(network, Instant::now());
        for (bar, line) in inner.bars().zip(lines) {
            bar.set_message(line);
        }
    }

    /// Draws the report one last time and leaves it on screen
    pub fn finish(&self, network: &NetworkSnapshot) {
        self.log(network);
        for bar in self.lock().bars() {
            bar.finish();
        }
    }

    /// Current line of every bar, in report order
    fn messages(&self) -> Vec<String> {
        self.lock().bars().map(|bar| bar.message().to_string()).collect()
    }
}

/// A collection's view of the shared aggregator
#[derive(Clone)]
pub struct StatsHandle {
    stats: Arc<Stats>,
    index: usize,
}

impl StatsHandle {
    /// Applies a signed delta to this collection and the global total
    pub fn set(&self, counter: Counter, delta: i64) {
        self.stats.set_at(self.index, counter, delta, Instant::now());
    }

    pub fn counters(&self) -> ProgressCounters {
        self.stats.counters(self.index)
    }

    pub fn refresh(&self, network: &NetworkSnapshot) {
        self.stats.refresh(network);
    }
}

/// Formats a duration as `1h 02m 03s`, `2m 05s` or `45s`
pub fn format_eta(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
