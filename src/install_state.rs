//! Lifecycle State Machine
//!
//! Authoritative source of truth for how far an install or uninstall run has
//! progressed. Transitions are validated so that a stage can never be
//! entered before the stages it depends on have completed.
//!
//! # Stage Flow
//!
//! ```text
//! Install                     Uninstall
//!
//! Init                        Init
//!   ↓                           ↓
//! GateChecked                 Resolved
//!   ↓                           ↓
//! Resolved                    OldCleanedUp
//!   ↓                           ↓
//! (OldCleanedUp)              Done
//!   ↓
//! Deployed
//!   ↓
//! Configured
//!   ↓
//! Integrated
//!   ↓
//! Recorded
//!   ↓
//! Done
//!
//! (Any non-terminal stage can transition to Failed)
//! ```
//!
//! `OldCleanedUp` is optional during installation (`--no-cleanup`).

use std::fmt;
use thiserror::Error;

/// Lifecycle stages in sequential order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    /// Nothing has happened yet
    Init = 0,

    /// Dependency gate passed
    GateChecked = 1,

    /// Natural and target layouts computed
    Resolved = 2,

    /// A previous installation at the target was removed
    OldCleanedUp = 3,

    /// Files copied, launchers written
    Deployed = 4,

    /// Configuration artifact written
    Configured = 5,

    /// Menu and desktop entries created
    Integrated = 6,

    /// Install record written (or skipped)
    Recorded = 7,

    /// Run completed successfully (terminal state)
    Done = 8,

    /// Run failed (terminal state)
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Done or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Init => "Starting",
            Self::GateChecked => "Dependencies checked",
            Self::Resolved => "Paths resolved",
            Self::OldCleanedUp => "Previous installation removed",
            Self::Deployed => "Files deployed",
            Self::Configured => "Configuration written",
            Self::Integrated => "Desktop integration created",
            Self::Recorded => "Install record written",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Which lifecycle a context drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleMode {
    Install,
    Uninstall,
}

impl LifecycleMode {
    /// Stages of this lifecycle in order, excluding Failed
    pub const fn stages(self) -> &'static [InstallStage] {
        match self {
            Self::Install => &[
                InstallStage::Init,
                InstallStage::GateChecked,
                InstallStage::Resolved,
                InstallStage::OldCleanedUp,
                InstallStage::Deployed,
                InstallStage::Configured,
                InstallStage::Integrated,
                InstallStage::Recorded,
                InstallStage::Done,
            ],
            Self::Uninstall => &[
                InstallStage::Init,
                InstallStage::Resolved,
                InstallStage::OldCleanedUp,
                InstallStage::Done,
            ],
        }
    }

    /// Stages that may be passed over
    pub const fn is_optional(self, stage: InstallStage) -> bool {
        matches!(
            (self, stage),
            (Self::Install, InstallStage::OldCleanedUp)
        )
    }

    fn position(self, stage: InstallStage) -> Option<usize> {
        self.stages().iter().position(|s| *s == stage)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: InstallStage,
        to: InstallStage,
    },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition {
        from: InstallStage,
        to: InstallStage,
    },

    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },

    #[error("Stage {stage} is not part of this run")]
    NotInLifecycle { stage: InstallStage },
}

/// Tracks the stage of one run.
///
/// # Example
///
/// ```
/// use app7_installer::install_state::{InstallStage, LifecycleContext, LifecycleMode};
///
/// let mut ctx = LifecycleContext::new(LifecycleMode::Install);
/// ctx.advance().unwrap();
/// assert_eq!(ctx.current_stage(), InstallStage::GateChecked);
///
/// // Cannot skip required stages
/// assert!(ctx.transition_to(InstallStage::Deployed).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    mode: LifecycleMode,
    current: InstallStage,
    failed_at: Option<InstallStage>,
    failure_reason: Option<String>,
    /// (stage, unix timestamp) for every stage entered
    stage_history: Vec<(InstallStage, u64)>,
}

impl LifecycleContext {
    pub fn new(mode: LifecycleMode) -> Self {
        Self {
            mode,
            current: InstallStage::Init,
            failed_at: None,
            failure_reason: None,
            stage_history: Vec::with_capacity(mode.stages().len()),
        }
    }

    #[inline]
    pub fn mode(&self) -> LifecycleMode {
        self.mode
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    /// Stage that was active when the run failed
    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.current == InstallStage::Done
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == InstallStage::Failed
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// Advance to the next stage of the lifecycle
    pub fn advance(&mut self) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        let stages = self.mode.stages();
        let next = self
            .mode
            .position(self.current)
            .and_then(|i| stages.get(i + 1))
            .copied()
            .ok_or(InstallTransitionError::FromTerminalState { from: self.current })?;
        self.enter(next);
        Ok(next)
    }

    /// Move to `target`, which must be the next stage or follow only
    /// optional stages.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if the run already finished
    /// - `AlreadyAtStage` if `target` is the current stage
    /// - `NotInLifecycle` if `target` is not a stage of this mode
    /// - `BackwardTransition` if `target` was already passed
    /// - `SkippedStage` if a required stage lies in between
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }

        let (Some(from), Some(to)) = (self.mode.position(self.current), self.mode.position(target))
        else {
            return Err(InstallTransitionError::NotInLifecycle { stage: target });
        };
        if to < from {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        let stages = self.mode.stages();
        if let Some(skipped) = stages[from + 1..to]
            .iter()
            .find(|s| !self.mode.is_optional(**s))
        {
            tracing::debug!("Transition to {} would skip {}", target, skipped);
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.enter(target);
        Ok(target)
    }

    /// Mark the run as failed at the current stage
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.failure_reason = Some(reason.into());
        self.enter(InstallStage::Failed);
        Ok(())
    }

    fn enter(&mut self, stage: InstallStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        tracing::debug!("Stage: {} -> {}", self.current, stage);
        self.stage_history.push((stage, timestamp));
        self.current = stage;
    }
}
