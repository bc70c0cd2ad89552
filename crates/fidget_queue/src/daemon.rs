//! The message queue daemon.
//!
//! Owns every live message, keyed by target, plus the global filter registry.
//! A tick for one target runs gather → sense/visibility → filters → select →
//! dispatch. Messages are recurring candidates: the winner stays queued and is
//! re-evaluated from scratch on the next tick.
//!
//! The collection lock is held only to read or mutate the collection, never
//! while user callbacks run, so senses, filters and actions may queue or
//! remove messages themselves.
//!
//! A second, reentrant dispatch lock makes a whole tick atomic with respect
//! to queueing and removal from other threads. The ticking thread may
//! re-enter it from its own callbacks; other threads wait for the tick to
//! finish.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parking_lot::ReentrantMutex;

use fidget_core::{
    ConstructionError, FidgetConfig, Filter, Message, Perceiver, SelectionPolicy, TargetId,
    WeightPresets,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::{FailureStage, PredicateFailure, QueueError};
use crate::evaluator::{self, Eligibility};
use crate::filter::{FilterRegistry, FilterVerdict};
use crate::queued::{MessageHandle, QueuedMessage};
use crate::report::{MessageIter, Reporter};
use crate::selector::Selector;

/// Outcome of one tick for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub target: TargetId,
    pub tick: u64,
    /// Messages queued for the target when the tick started.
    pub considered: usize,
    /// Messages that passed their gates and every filter.
    pub eligible: usize,
    pub winner: Option<MessageHandle>,
    /// Sense, perception and filter failures seen during this tick.
    pub diagnostics: Vec<PredicateFailure>,
}

impl TickReport {
    pub fn dispatched(&self) -> bool {
        self.winner.is_some()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    entries: BTreeMap<MessageHandle, QueuedMessage>,
    by_target: HashMap<TargetId, BTreeSet<MessageHandle>>,
}

impl QueueState {
    fn insert(&mut self, message: Message) -> MessageHandle {
        self.next_id += 1;
        let handle = MessageHandle(self.next_id);
        self.by_target
            .entry(message.target().clone())
            .or_default()
            .insert(handle);
        self.entries.insert(handle, QueuedMessage::new(handle, message));
        handle
    }

    fn remove(&mut self, handle: MessageHandle) -> Option<QueuedMessage> {
        let entry = self.entries.remove(&handle)?;
        if let Some(handles) = self.by_target.get_mut(entry.target()) {
            handles.remove(&handle);
            if handles.is_empty() {
                self.by_target.remove(entry.target());
            }
        }
        Some(entry)
    }

    fn remove_target(&mut self, target: &TargetId) -> usize {
        let Some(handles) = self.by_target.remove(target) else {
            return 0;
        };
        for handle in &handles {
            self.entries.remove(handle);
        }
        handles.len()
    }

    fn for_target(&self, target: &TargetId) -> Vec<QueuedMessage> {
        self.by_target
            .get(target)
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(|h| self.entries.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Targets in order of their oldest live message.
    fn targets(&self) -> Vec<TargetId> {
        let mut seen = HashSet::new();
        self.entries
            .values()
            .filter(|m| seen.insert(m.target().clone()))
            .map(|m| m.target().clone())
            .collect()
    }
}

/// Weighted, sense-gated scheduler for ambient messages.
///
/// Construct one per simulation and share it by reference or `Arc`.
pub struct MessageQueueDaemon {
    state: Mutex<QueueState>,
    /// Held for a whole tick and by every enqueue / removal.
    dispatch: ReentrantMutex<()>,
    filters: FilterRegistry,
    selector: Selector,
    rng: Mutex<Box<dyn RngCore + Send>>,
    perceiver: Option<Arc<dyn Perceiver>>,
    presets: WeightPresets,
    debug: bool,
    tick: AtomicU64,
}

impl MessageQueueDaemon {
    pub fn new() -> Self {
        Self::with_config(&FidgetConfig::default())
    }

    pub fn with_config(config: &FidgetConfig) -> Self {
        let rng = match config.queue.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: Mutex::new(QueueState::default()),
            dispatch: ReentrantMutex::new(()),
            filters: FilterRegistry::new(),
            selector: Selector::new(config.queue.selection),
            rng: Mutex::new(Box::new(rng)),
            perceiver: None,
            presets: config.weights.clone(),
            debug: config.queue.debug,
            tick: AtomicU64::new(0),
        }
    }

    /// Default configuration with a fixed RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        let mut config = FidgetConfig::default();
        config.queue.seed = Some(seed);
        Self::with_config(&config)
    }

    /// Replace the random source used by weighted selection.
    pub fn with_rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn with_perceiver(mut self, perceiver: Arc<dyn Perceiver>) -> Self {
        self.perceiver = Some(perceiver);
        self
    }

    pub fn with_selection(mut self, policy: SelectionPolicy) -> Self {
        self.selector = Selector::new(policy);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Enqueue / remove
    // ------------------------------------------------------------------

    /// Queue a message. Nothing is evaluated until the next tick.
    pub fn add_msg(&self, message: Message) -> MessageHandle {
        let _dispatch = self.dispatch.lock();
        let target = message.target().clone();
        let label = message.label().map(str::to_string);
        let handle = self.lock_state().insert(message);
        match label {
            Some(label) => tracing::debug!("Queued {} ({}) for {}", handle, label, target),
            None => tracing::debug!("Queued {} for {}", handle, target),
        }
        handle
    }

    /// Alias of [`Self::add_msg`].
    pub fn queue_msg(&self, message: Message) -> MessageHandle {
        self.add_msg(message)
    }

    /// Queue a plain fidget at the configured default weight.
    pub fn default_fidget<F>(
        &self,
        target: impl Into<TargetId>,
        action: F,
    ) -> Result<MessageHandle, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.preset_fidget(target, self.presets.default, action)
    }

    /// Queue a plain fidget at the configured "before" weight.
    pub fn fidget_before<F>(
        &self,
        target: impl Into<TargetId>,
        action: F,
    ) -> Result<MessageHandle, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.preset_fidget(target, self.presets.before, action)
    }

    /// Queue a plain fidget at the configured "after" weight.
    pub fn fidget_after<F>(
        &self,
        target: impl Into<TargetId>,
        action: F,
    ) -> Result<MessageHandle, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.preset_fidget(target, self.presets.after, action)
    }

    fn preset_fidget<F>(
        &self,
        target: impl Into<TargetId>,
        weight: u32,
        action: F,
    ) -> Result<MessageHandle, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let message = Message::weighted(target, i64::from(weight), action)?;
        Ok(self.add_msg(message))
    }

    /// Remove a message. Returns `false` if the handle is not queued, in
    /// which case nothing else changes.
    pub fn remove_message(&self, handle: MessageHandle) -> bool {
        self.take_message(handle).is_ok()
    }

    /// Remove a message and hand it back.
    pub fn take_message(&self, handle: MessageHandle) -> Result<Arc<Message>, QueueError> {
        let _dispatch = self.dispatch.lock();
        let removed = self.lock_state().remove(handle);
        match removed {
            Some(entry) => {
                tracing::debug!("Removed {} from {}", entry, entry.target());
                Ok(entry.into_message())
            }
            None => {
                tracing::debug!("Remove of {} ignored: not queued", handle);
                Err(QueueError::NotFound(handle))
            }
        }
    }

    /// Drop every message owned by `target`, e.g. when the object is destroyed.
    pub fn remove_target(&self, target: &TargetId) -> usize {
        let _dispatch = self.dispatch.lock();
        let removed = self.lock_state().remove_target(target);
        if removed > 0 {
            tracing::debug!("Removed {} message(s) for destroyed target {}", removed, target);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    pub fn add_filter<F: Filter + 'static>(&self, filter: F) {
        self.filters.add(Arc::new(filter));
    }

    /// Alias of [`Self::add_filter`].
    pub fn add_msg_queue_filter<F: Filter + 'static>(&self, filter: F) {
        self.add_filter(filter);
    }

    /// Register a closure as a named filter.
    pub fn add_filter_fn<F>(&self, name: &str, check: F)
    where
        F: Fn(&Message) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.filters.add_fn(name, check);
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: MessageHandle) -> bool {
        self.lock_state().entries.contains_key(&handle)
    }

    pub fn get(&self, handle: MessageHandle) -> Option<QueuedMessage> {
        self.lock_state().entries.get(&handle).cloned()
    }

    /// Number of targets with at least one queued message.
    pub fn target_count(&self) -> usize {
        self.lock_state().by_target.len()
    }

    /// Targets with queued messages, oldest first.
    pub fn targets(&self) -> Vec<TargetId> {
        self.lock_state().targets()
    }

    /// Messages queued for one target, in insertion order.
    pub fn messages_for(&self, target: &TargetId) -> Vec<QueuedMessage> {
        self.lock_state().for_target(target)
    }

    /// Lazy iterator over a snapshot of every live message, all targets,
    /// in insertion order. Each call takes a fresh snapshot.
    pub fn messages(&self) -> MessageIter {
        let snapshot = self.lock_state().entries.values().cloned().collect();
        MessageIter::new(snapshot)
    }

    /// Call `visit` once per live message, in insertion order.
    pub fn traverse_messages<F>(&self, mut visit: F)
    where
        F: FnMut(&QueuedMessage),
    {
        for message in self.messages() {
            visit(&message);
        }
    }

    /// First message for which `matches` returns true.
    pub fn search_messages<F>(&self, mut matches: F) -> Option<QueuedMessage>
    where
        F: FnMut(&QueuedMessage) -> bool,
    {
        self.messages().find(|m| matches(m))
    }

    /// Fold every message satisfying `condition` through `reporter`.
    pub fn summarize_messages<C, R>(&self, mut condition: C, reporter: R) -> R::Report
    where
        C: FnMut(&QueuedMessage) -> bool,
        R: Reporter,
    {
        self.messages()
            .filter(|m| condition(m))
            .fold(reporter, |mut reporter, m| {
                reporter.record(&m);
                reporter
            })
            .finish()
    }

    // ------------------------------------------------------------------
    // Tick cycle
    // ------------------------------------------------------------------

    /// Number of ticks run so far. Advances once per [`Self::run_tick`].
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Run one scheduling period for `target`, dispatching at most one message.
    ///
    /// Callback failures in senses, perception or filters only make the
    /// affected message ineligible and are listed in the report. A failing
    /// action is returned as [`QueueError::ActionDispatch`], carrying those
    /// diagnostics; the queue is left as it was.
    pub fn run_tick(&self, target: &TargetId) -> Result<TickReport, QueueError> {
        let _dispatch = self.dispatch.lock();
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        let candidates = self.lock_state().for_target(target);
        let mut report = TickReport {
            target: target.clone(),
            tick,
            considered: candidates.len(),
            eligible: 0,
            winner: None,
            diagnostics: Vec::new(),
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let filters = self.filters.snapshot();
        let mut eligible = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.is_eligible(tick, &candidate, &filters, &mut report.diagnostics) {
                eligible.push(candidate);
            }
        }
        report.eligible = eligible.len();

        let weights: Vec<u32> = eligible.iter().map(QueuedMessage::weight).collect();
        let picked = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.selector.select(&weights, &mut **rng)
        };
        let Some(index) = picked else {
            if self.debug {
                tracing::debug!("tick {}: nothing eligible for {}", tick, target);
            }
            return Ok(report);
        };
        let winner = &eligible[index];

        let still_queued = self.contains(winner.handle());
        if !still_queued {
            tracing::debug!(
                "tick {}: {} was removed before dispatch, skipping",
                tick,
                winner
            );
            return Ok(report);
        }

        if self.debug {
            let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
            tracing::debug!(
                "tick {}: {} wins for {} (weight {} of {}, {:?})",
                tick,
                winner,
                target,
                winner.weight(),
                total,
                self.selector.policy()
            );
        }

        if let Err(source) = winner.message().perform() {
            tracing::error!(
                "tick {}: action for {} on {} failed: {:#}",
                tick,
                winner,
                target,
                source
            );
            return Err(QueueError::ActionDispatch {
                handle: winner.handle(),
                target: target.clone(),
                source,
                diagnostics: report.diagnostics,
            });
        }

        winner.record_dispatch(tick);
        report.winner = Some(winner.handle());
        Ok(report)
    }

    /// Tick every target that has queued messages, oldest target first.
    ///
    /// One target's failure never stops the others.
    pub fn run_all_ticks(&self) -> Vec<(TargetId, Result<TickReport, QueueError>)> {
        self.targets()
            .into_iter()
            .map(|target| {
                let result = self.run_tick(&target);
                (target, result)
            })
            .collect()
    }

    fn is_eligible(
        &self,
        tick: u64,
        candidate: &QueuedMessage,
        filters: &[Arc<dyn Filter>],
        diagnostics: &mut Vec<PredicateFailure>,
    ) -> bool {
        let message = candidate.message();
        match evaluator::evaluate(message, self.perceiver.as_deref()) {
            Eligibility::Eligible => {}
            Eligibility::Ineligible(reason) => {
                if self.debug {
                    tracing::debug!("tick {}: {} ineligible ({:?})", tick, candidate, reason);
                }
                return false;
            }
            Eligibility::Failed {
                stage,
                source,
                error,
            } => {
                diagnostics.push(self.failure(tick, candidate, stage, source, error));
                return false;
            }
        }

        match FilterRegistry::check(filters, message) {
            FilterVerdict::Pass => true,
            FilterVerdict::Rejected { filter } => {
                if self.debug {
                    tracing::debug!(
                        "tick {}: {} vetoed by filter '{}'",
                        tick,
                        candidate,
                        filter
                    );
                }
                false
            }
            FilterVerdict::Failed { filter, error } => {
                diagnostics.push(self.failure(tick, candidate, FailureStage::Filter, filter, error));
                false
            }
        }
    }

    fn failure(
        &self,
        tick: u64,
        candidate: &QueuedMessage,
        stage: FailureStage,
        source: String,
        error: anyhow::Error,
    ) -> PredicateFailure {
        let failure = PredicateFailure {
            handle: candidate.handle(),
            label: candidate.label().map(str::to_string),
            stage,
            source,
            error: format!("{:#}", error),
        };
        tracing::warn!("tick {}: {}", tick, failure);
        failure
    }
}

impl Default for MessageQueueDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageQueueDaemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueueDaemon")
            .field("messages", &self.len())
            .field("filters", &self.filters.len())
            .field("selection", &self.selector.policy())
            .field("tick", &self.current_tick())
            .field("debug", &self.debug)
            .finish()
    }
}
