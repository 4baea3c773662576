//! N+1 query detection.
//!
//! The N+1 pattern shows up when code loads N parents and then lazily loads a
//! collection for each of them, issuing N+1 statements where two would do.
//! Every lazy load performed by a [`Session`](crate::Session) is recorded
//! here, keyed by (parent entity, relationship).
//!
//! # Example
//!
//! ```ignore
//! // One statement per post: reported once the threshold is reached.
//! for post in blog.posts() {
//!     session.load(post, Post::COMMENTS)?;
//! }
//!
//! // The fix: one statement per level, whatever the number of posts.
//! session
//!     .query::<Blog>()
//!     .fetch(FetchMany::new(Blog::POSTS).then(FetchMany::new(Post::COMMENTS)))
//!     .list()?;
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Tracks lazy load queries for N+1 detection.
#[derive(Debug)]
pub struct N1QueryTracker {
    /// (parent entity, relationship) -> lazy loads
    counts: HashMap<(&'static str, &'static str), usize>,
    /// Loads per relationship at which the pattern is reported
    threshold: usize,
    enabled: bool,
    call_sites: Vec<CallSite>,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a lazy load was triggered.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub parent_type: &'static str,
    pub relationship: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub timestamp: Instant,
}

/// Aggregate counters over everything a tracker has recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct N1Stats {
    /// Total number of lazy loads recorded
    pub total_loads: usize,
    /// Number of distinct relationships loaded
    pub relationships_loaded: usize,
    /// Number of relationships that reached the threshold
    pub potential_n1: usize,
}

impl N1QueryTracker {
    /// Create a new tracker with the default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            call_sites: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one lazy load of `relationship` on a `parent_type` instance.
    ///
    /// Returns the new count when it has just reached the threshold, so the
    /// caller can raise its own alert exactly once per relationship.
    #[track_caller]
    pub fn record_load(
        &mut self,
        parent_type: &'static str,
        relationship: &'static str,
    ) -> Option<usize> {
        if !self.enabled {
            return None;
        }

        let count = self.counts.entry((parent_type, relationship)).or_insert(0);
        *count += 1;
        let count = *count;

        let caller = std::panic::Location::caller();
        self.call_sites.push(CallSite {
            parent_type,
            relationship,
            file: caller.file(),
            line: caller.line(),
            timestamp: Instant::now(),
        });

        if count == self.threshold {
            self.emit_warning(parent_type, relationship, count);
            return Some(count);
        }
        None
    }

    fn emit_warning(&self, parent_type: &'static str, relationship: &'static str, count: usize) {
        tracing::warn!(
            target: "ormlessons::n1",
            parent = parent_type,
            relationship = relationship,
            queries = count,
            threshold = self.threshold,
            "N+1 query pattern detected; fetch the collection eagerly instead"
        );

        let sites = self
            .call_sites
            .iter()
            .filter(|s| s.parent_type == parent_type && s.relationship == relationship)
            .take(5);
        for (i, site) in sites.enumerate() {
            tracing::debug!(
                target: "ormlessons::n1",
                index = i,
                "  [{}] {}:{}",
                i,
                site.file,
                site.line
            );
        }
    }

    /// Forget all counts and call sites.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.call_sites.clear();
    }

    #[must_use]
    pub fn count_for(&self, parent_type: &str, relationship: &str) -> usize {
        self.counts
            .iter()
            .find(|((p, r), _)| *p == parent_type && *r == relationship)
            .map_or(0, |(_, c)| *c)
    }

    #[must_use]
    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_loads: self.counts.values().sum(),
            relationships_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|c| **c >= self.threshold)
                .count(),
        }
    }

    #[must_use]
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }
}

/// Guard that reports the lazy loads performed while it was alive.
///
/// Obtained from [`Session::n1_scope`](crate::Session::n1_scope); the summary
/// is logged on drop (a warning when a relationship reached the threshold
/// inside the scope).
pub struct N1DetectionScope {
    tracker: Arc<Mutex<N1QueryTracker>>,
    initial_stats: N1Stats,
    threshold: usize,
    verbose: bool,
}

impl N1DetectionScope {
    pub(crate) fn new(tracker: Arc<Mutex<N1QueryTracker>>) -> Self {
        let (initial_stats, threshold) = match tracker.lock() {
            Ok(t) => (t.stats(), t.threshold()),
            Err(poisoned) => {
                let t = poisoned.into_inner();
                (t.stats(), t.threshold())
            }
        };
        tracing::debug!(
            target: "ormlessons::n1",
            threshold = threshold,
            "N+1 detection scope started"
        );
        Self {
            tracker,
            initial_stats,
            threshold,
            verbose: false,
        }
    }

    /// Log the summary even when nothing suspicious happened.
    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Loads recorded since the scope started.
    pub fn stats(&self) -> N1Stats {
        let current = self.current_stats();
        N1Stats {
            total_loads: current.total_loads.saturating_sub(self.initial_stats.total_loads),
            relationships_loaded: current
                .relationships_loaded
                .saturating_sub(self.initial_stats.relationships_loaded),
            potential_n1: current
                .potential_n1
                .saturating_sub(self.initial_stats.potential_n1),
        }
    }

    fn current_stats(&self) -> N1Stats {
        match self.tracker.lock() {
            Ok(t) => t.stats(),
            Err(poisoned) => poisoned.into_inner().stats(),
        }
    }

    fn log_summary(&self) {
        let delta = self.stats();
        if delta.potential_n1 > 0 {
            tracing::warn!(
                target: "ormlessons::n1",
                potential_n1 = delta.potential_n1,
                total_loads = delta.total_loads,
                relationships = delta.relationships_loaded,
                threshold = self.threshold,
                "N+1 issues detected in this scope"
            );
        } else if self.verbose {
            tracing::info!(
                target: "ormlessons::n1",
                total_loads = delta.total_loads,
                relationships = delta.relationships_loaded,
                "N+1 detection scope completed (no issues)"
            );
        } else {
            tracing::debug!(
                target: "ormlessons::n1",
                total_loads = delta.total_loads,
                relationships = delta.relationships_loaded,
                "N+1 detection scope completed (no issues)"
            );
        }
    }
}

impl Drop for N1DetectionScope {
    fn drop(&mut self) {
        self.log_summary();
    }
}
