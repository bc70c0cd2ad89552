//! Traversal iterator and summary reporters.
//!
//! `summarize_messages` is a fold: every message matching the condition is
//! fed to a [`Reporter`], which then produces its report.

use std::collections::BTreeMap;

use fidget_core::TargetId;

use crate::queued::QueuedMessage;

/// Iterator over a snapshot of the queue, in insertion order.
///
/// The snapshot is taken when the iterator is created, so callbacks may add
/// or remove messages while iterating without affecting it.
#[derive(Debug)]
pub struct MessageIter {
    inner: std::vec::IntoIter<QueuedMessage>,
}

impl MessageIter {
    pub(crate) fn new(snapshot: Vec<QueuedMessage>) -> Self {
        Self {
            inner: snapshot.into_iter(),
        }
    }
}

impl Iterator for MessageIter {
    type Item = QueuedMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MessageIter {}

/// Accumulates matched messages into an aggregate report.
pub trait Reporter {
    type Report;

    fn record(&mut self, message: &QueuedMessage);

    fn finish(self) -> Self::Report;
}

/// Counts matching messages.
#[derive(Debug, Default)]
pub struct CountReporter {
    count: usize,
}

impl Reporter for CountReporter {
    type Report = usize;

    fn record(&mut self, _message: &QueuedMessage) {
        self.count += 1;
    }

    fn finish(self) -> usize {
        self.count
    }
}

/// Counts matching messages per target.
#[derive(Debug, Default)]
pub struct TargetCountReporter {
    counts: BTreeMap<TargetId, usize>,
}

impl Reporter for TargetCountReporter {
    type Report = BTreeMap<TargetId, usize>;

    fn record(&mut self, message: &QueuedMessage) {
        *self.counts.entry(message.target().clone()).or_insert(0) += 1;
    }

    fn finish(self) -> Self::Report {
        self.counts
    }
}

/// Sums the weights of matching messages.
#[derive(Debug, Default)]
pub struct WeightReporter {
    total: u64,
}

impl Reporter for WeightReporter {
    type Report = u64;

    fn record(&mut self, message: &QueuedMessage) {
        self.total += u64::from(message.weight());
    }

    fn finish(self) -> u64 {
        self.total
    }
}

/// Counts matching messages per label. Unlabelled messages are counted
/// under `None`.
#[derive(Debug, Default)]
pub struct LabelCountReporter {
    counts: BTreeMap<Option<String>, usize>,
}

impl Reporter for LabelCountReporter {
    type Report = BTreeMap<Option<String>, usize>;

    fn record(&mut self, message: &QueuedMessage) {
        let label = message.label().map(str::to_string);
        *self.counts.entry(label).or_insert(0) += 1;
    }

    fn finish(self) -> Self::Report {
        self.counts
    }
}
