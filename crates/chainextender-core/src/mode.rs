//! Chasing/live mode tracking for the ingestion loop.

use serde::{Deserialize, Serialize};

/// Whether the extender is catching up with the node or following its tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Far behind the node; its height is re-queried every iteration.
    Chasing,
    /// Within the threshold of the node tip.
    Live,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chasing => write!(f, "chasing"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Decides when the node height must be sampled and which mode a sample
/// puts the loop in.
#[derive(Debug, Clone)]
pub struct ModeTracker {
    mode: SyncMode,
    threshold: u64,
    recheck_interval: u64,
    node_height: Option<u64>,
    sampled_at: u64,
}

impl ModeTracker {
    pub fn new(threshold: u64, recheck_interval: u64) -> Self {
        Self {
            mode: SyncMode::Chasing,
            threshold,
            recheck_interval: recheck_interval.max(1),
            node_height: None,
            sampled_at: 0,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Last sampled node height.
    pub fn node_height(&self) -> Option<u64> {
        self.node_height
    }

    /// `true` if the node height should be re-queried before processing
    /// `height`.
    pub fn needs_sample(&self, height: u64) -> bool {
        match (self.mode, self.node_height) {
            (SyncMode::Chasing, _) | (_, None) => true,
            (SyncMode::Live, Some(node)) => {
                height > node || height.saturating_sub(self.sampled_at) >= self.recheck_interval
            }
        }
    }

    /// Record a node height sample taken while about to process `height`.
    pub fn observe(&mut self, height: u64, node_height: u64) -> SyncMode {
        let gap = node_height.saturating_sub(height);
        let next = if gap <= self.threshold {
            SyncMode::Live
        } else {
            SyncMode::Chasing
        };
        if next != self.mode {
            tracing::info!(height, node_height, gap, from = %self.mode, to = %next, "sync mode changed");
        }
        self.mode = next;
        self.node_height = Some(node_height);
        self.sampled_at = height;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_to_live_within_threshold() {
        let mut tracker = ModeTracker::new(2, 10);
        for height in 100..110 {
            assert!(tracker.needs_sample(height) || tracker.mode() == SyncMode::Live);
            let mode = tracker.observe(height, 110);
            if height >= 108 {
                assert_eq!(mode, SyncMode::Live, "height {height}");
            } else {
                assert_eq!(mode, SyncMode::Chasing, "height {height}");
            }
        }
    }

    #[test]
    fn live_mode_rechecks_periodically_and_past_the_tip() {
        let mut tracker = ModeTracker::new(2, 10);
        tracker.observe(200, 201);
        assert_eq!(tracker.mode(), SyncMode::Live);
        assert!(!tracker.needs_sample(201));
        // Passed the sampled node height.
        assert!(tracker.needs_sample(202));

        tracker.observe(202, 300);
        assert_eq!(tracker.mode(), SyncMode::Chasing);
        assert!(tracker.needs_sample(203));

        tracker.observe(299, 300);
        assert!(!tracker.needs_sample(300));
        assert!(tracker.needs_sample(309));
    }

    #[test]
    fn falls_back_to_chasing_when_node_races_ahead() {
        let mut tracker = ModeTracker::new(2, 10);
        tracker.observe(50, 50);
        assert_eq!(tracker.observe(51, 60), SyncMode::Chasing);
    }
}
