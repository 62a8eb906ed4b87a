use crate::{BuildError, CoreError, Stage};
use std::fmt;
use tracing::debug;

/// Where a single layer build is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    WorkspaceAcquired,
    Installed,
    Normalized,
    Packaged,
    Done,
    Failed(Stage),
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildState::Done | BuildState::Failed(_))
    }

    /// Stage that moves the build into this state.
    pub fn stage(self) -> Stage {
        match self {
            BuildState::Idle => Stage::Validate,
            BuildState::WorkspaceAcquired => Stage::Acquire,
            BuildState::Installed => Stage::Install,
            BuildState::Normalized => Stage::Normalize,
            BuildState::Packaged | BuildState::Done => Stage::Package,
            BuildState::Failed(stage) => stage,
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Idle => write!(f, "idle"),
            BuildState::WorkspaceAcquired => write!(f, "workspace-acquired"),
            BuildState::Installed => write!(f, "installed"),
            BuildState::Normalized => write!(f, "normalized"),
            BuildState::Packaged => write!(f, "packaged"),
            BuildState::Done => write!(f, "done"),
            BuildState::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

pub fn validate_transition(from: BuildState, to: BuildState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (BuildState::Idle, BuildState::WorkspaceAcquired)
            | (BuildState::WorkspaceAcquired, BuildState::Installed)
            | (BuildState::Installed, BuildState::Normalized)
            | (BuildState::Normalized, BuildState::Packaged)
            | (BuildState::Packaged, BuildState::Done)
    ) || (!from.is_terminal() && matches!(to, BuildState::Failed(_)));

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Drives one layer through [`BuildState`]s, rejecting out-of-order moves.
#[derive(Debug)]
pub struct BuildTracker {
    layer: String,
    state: BuildState,
}

impl BuildTracker {
    pub fn new(layer: &str) -> Self {
        Self {
            layer: layer.to_owned(),
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn advance(&mut self, to: BuildState) -> Result<(), BuildError> {
        if let Err(e) = validate_transition(self.state, to) {
            return Err(self.fail(to.stage(), e));
        }
        debug!("{}: {} -> {to}", self.layer, self.state);
        self.state = to;
        Ok(())
    }

    /// Enter `Failed(stage)` and wrap `source` for the caller. A tracker
    /// that already failed keeps its first failure stage.
    pub fn fail(&mut self, stage: Stage, source: impl Into<CoreError>) -> BuildError {
        if !self.state.is_terminal() {
            debug!("{}: {} -> failed({stage})", self.layer, self.state);
            self.state = BuildState::Failed(stage);
        }
        BuildError::new(&self.layer, stage, source)
    }
}
