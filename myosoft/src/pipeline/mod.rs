//! The four pipeline variants and the per-image run they share.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::config::ConfigError;
use crate::raster::RasterError;
use crate::results::TableError;
use crate::roi::RoiError;

mod central_nuclei;
mod fiber_typing;
mod identify_fibers;
mod manual_rerun;
mod run;
mod stage;

pub use central_nuclei::central_nuclei;
pub use fiber_typing::fiber_typing;
pub use identify_fibers::identify_fibers;
pub use manual_rerun::manual_rerun;
pub use run::{RunLog, RunReport};
pub use stage::{Stage, StageTracker};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{service} failed during {stage}: {source:#}")]
    Adapter {
        stage: Stage,
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Roi(#[from] RoiError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("Stage {to} cannot follow {from}")]
    Transition { from: Stage, to: Stage },
    #[error("Fiber identification needs a pixel classifier and a particle detector")]
    MissingSegmentation,
    #[error("Failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    IdentifyFibers,
    CentralNuclei,
    FiberTyping,
    ManualRerun,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn variants_use_kebab_case_names() {
        assert_eq!(Variant::IdentifyFibers.to_string(), "identify-fibers");
        assert_eq!(Variant::from_str("manual-rerun").ok(), Some(Variant::ManualRerun));
    }

    #[test]
    fn adapter_errors_name_the_stage() {
        let err = PipelineError::Adapter {
            stage: Stage::Segmented,
            service: "pixel classifier",
            source: anyhow::anyhow!("model is corrupt"),
        };
        assert_eq!(
            err.to_string(),
            "pixel classifier failed during Segmented: model is corrupt"
        );
    }
}
