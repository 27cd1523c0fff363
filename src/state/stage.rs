//! Pipeline stage definitions for tracking one extraction
//!
//! This module defines all stages an extraction can be in and which
//! transitions between them are legal.
use crate::CatalogError;
use std::fmt;

/// Represents the current stage of a single extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    // ===== Active Stages =====
    /// Extraction created, nothing has touched the page yet
    Init,

    /// Loading the scope's source location
    Navigate,

    /// Opening filter panels and locating the entity container
    Expand,

    /// Collecting entities from the current page (loops per page)
    CollectPage,

    // ===== Terminal Stages =====
    /// Snapshot complete (full or degraded confidence)
    Done,

    /// Extraction gave up after exhausting retries
    Failed,
}

impl PipelineStage {
    /// Returns true if this is a terminal stage (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if this stage is allowed to follow `self`
    ///
    /// Any active stage may fail. `CollectPage` loops onto itself while there
    /// are more pages to read.
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Init, Self::Navigate) => true,
            (Self::Navigate, Self::Expand) => true,
            (Self::Expand, Self::CollectPage) => true,
            (Self::CollectPage, Self::CollectPage) => true,
            (Self::CollectPage, Self::Done) => true,
            _ => false,
        }
    }

    /// Short lowercase name used in logs and failure reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Navigate => "navigate",
            Self::Expand => "expand",
            Self::CollectPage => "collect_page",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns all stages in pipeline order
    pub fn all_stages() -> Vec<Self> {
        vec![
            Self::Init,
            Self::Navigate,
            Self::Expand,
            Self::CollectPage,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the stage of one extraction and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct StageTracker {
    scope: String,
    current: PipelineStage,
    pages_collected: u32,
}

impl StageTracker {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            current: PipelineStage::Init,
            pages_collected: 0,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn pages_collected(&self) -> u32 {
        self.pages_collected
    }

    /// Moves to `next`, failing if the transition is not allowed
    pub fn advance(&mut self, next: PipelineStage) -> Result<(), CatalogError> {
        if !self.current.can_transition_to(next) {
            return Err(CatalogError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }

        tracing::trace!("{}: {} -> {}", self.scope, self.current, next);

        if next == PipelineStage::CollectPage {
            self.pages_collected += 1;
        }
        self.current = next;
        Ok(())
    }
}
