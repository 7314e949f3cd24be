/// Pipeline stage definitions for tracking a source run
///
/// Stages are strictly ordered and a run never re-enters a stage.
use crate::HarvestError;
use serde::Serialize;
use std::fmt;

/// A stage of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Run created, nothing executed yet
    Pending,

    // ===== Active Stages =====
    Discover,
    FetchListing,
    ExtractLinks,
    FetchDetail,
    Parse,
    Validate,
    QualityFilter,
    Dedupe,

    // ===== Terminal Stage =====
    /// Run finished, possibly early after cancellation
    Done,
}

impl Stage {
    /// Returns true if no further stage may follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if this stage performs network I/O
    pub fn does_io(&self) -> bool {
        matches!(self, Self::FetchListing | Self::FetchDetail)
    }

    /// Stable string form used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Discover => "discover",
            Self::FetchListing => "fetch_listing",
            Self::ExtractLinks => "extract_links",
            Self::FetchDetail => "fetch_detail",
            Self::Parse => "parse",
            Self::Validate => "validate",
            Self::QualityFilter => "quality_filter",
            Self::Dedupe => "dedupe",
            Self::Done => "done",
        }
    }

    /// All stages in execution order
    pub fn all_stages() -> [Self; 10] {
        [
            Self::Pending,
            Self::Discover,
            Self::FetchListing,
            Self::ExtractLinks,
            Self::FetchDetail,
            Self::Parse,
            Self::Validate,
            Self::QualityFilter,
            Self::Dedupe,
            Self::Done,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces forward-only stage transitions
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: Stage,
    visited: Vec<Stage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Stage::Pending,
            visited: vec![Stage::Pending],
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Stages entered so far, in order
    pub fn visited(&self) -> &[Stage] {
        &self.visited
    }

    /// Moves to a later stage
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Transition accepted
    /// * `Err(HarvestError::InvalidTransition)` - `to` is not after the current stage
    pub fn advance(&mut self, to: Stage) -> Result<(), HarvestError> {
        if to <= self.current {
            return Err(HarvestError::InvalidTransition {
                from: self.current,
                to,
            });
        }
        tracing::trace!(from = %self.current, to = %to, "Stage transition");
        self.current = to;
        self.visited.push(to);
        Ok(())
    }

    /// Jumps to [`Stage::Done`] unless already there
    pub fn finish(&mut self) {
        if !self.current.is_terminal() {
            self.current = Stage::Done;
            self.visited.push(Stage::Done);
        }
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
