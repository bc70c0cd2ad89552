//! Global filter registry.
//!
//! Filters are cross-cutting vetoes: every candidate that passed its own sense
//! gate is run through every registered filter in registration order, and
//! all of them must allow it.

use std::sync::{Arc, PoisonError, RwLock};

use fidget_core::{Filter, FnFilter, Message};

#[derive(Debug)]
pub enum FilterVerdict {
    Pass,
    Rejected { filter: String },
    Failed { filter: String, error: anyhow::Error },
}

/// Append-only list of global filters. There is no unregister.
#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<Vec<Arc<dyn Filter>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, filter: Arc<dyn Filter>) {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!("Registering queue filter '{}'", filter.name());
        filters.push(filter);
    }

    pub fn add_fn<F>(&self, name: &str, check: F)
    where
        F: Fn(&Message) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.add(Arc::new(FnFilter::new(name, check)));
    }

    pub fn len(&self) -> usize {
        self.filters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current filter list, so filters can run without the lock
    /// held (a filter may itself register another filter).
    pub fn snapshot(&self) -> Vec<Arc<dyn Filter>> {
        self.filters.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run `filters` against `message`, stopping at the first veto.
    pub fn check(filters: &[Arc<dyn Filter>], message: &Message) -> FilterVerdict {
        for filter in filters {
            match filter.allows(message) {
                Ok(true) => {}
                Ok(false) => {
                    return FilterVerdict::Rejected {
                        filter: filter.name().to_string(),
                    }
                }
                Err(error) => {
                    return FilterVerdict::Failed {
                        filter: filter.name().to_string(),
                        error,
                    }
                }
            }
        }
        FilterVerdict::Pass
    }
}
