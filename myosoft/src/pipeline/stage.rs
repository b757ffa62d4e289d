use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Per-image progress of a run.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
pub enum Stage {
    #[default]
    Init,
    Loaded,
    Preprocessed,
    Segmented,
    Detected,
    Measured,
    Classified,
    Exported,
    Aborted,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Exported | Stage::Aborted)
    }

    /// Whether `to` may directly follow `self`.
    pub fn allows(&self, to: Stage) -> bool {
        use Stage::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (_, Aborted)
                | (Init, Loaded)
                | (Loaded, Preprocessed)
                | (Preprocessed, Segmented)
                | (Segmented, Detected)
                | (Detected, Measured)
                | (Measured, Classified)
                | (Classified, Classified)
                | (Measured, Exported)
                | (Classified, Exported)
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct StageTracker {
    history: Vec<Stage>,
}

impl StageTracker {
    pub fn current(&self) -> Stage {
        self.history.last().copied().unwrap_or_default()
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Moves to `to`, returning the rejected `(from, to)` pair otherwise.
    pub fn advance(&mut self, to: Stage) -> Result<(), (Stage, Stage)> {
        let from = self.current();
        if !from.allows(to) {
            return Err((from, to));
        }
        if self.history.is_empty() {
            self.history.push(Stage::Init);
        }
        self.history.push(to);
        Ok(())
    }

    pub fn abort(&mut self) {
        if !self.current().is_terminal() {
            // a fresh tracker records where it started
            if self.history.is_empty() {
                self.history.push(Stage::Init);
            }
            self.history.push(Stage::Aborted);
        }
    }
}
