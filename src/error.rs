//! ==============================================================================
//! error.rs - error taxonomy for the bikesense runtime
//! ==============================================================================
//!
//! three kinds of failure matter to the unit:
//!     - Initialization: a component failed to come up. fatal, build() stops.
//!     - TransientNetwork: the trip api could not be reached or refused us.
//!       logged, the loop keeps going and retries on the next qualifying cycle.
//!     - Reuse: the board peripherals were already claimed in this process.
//!
//! ==============================================================================

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BikeSenseError {
    #[error("failed to initialize {component}: {source:#}")]
    Initialization {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("transient network failure: {0}")]
    TransientNetwork(#[from] NetworkError),

    #[error("board peripherals already claimed by an earlier build")]
    Reuse,
}

impl BikeSenseError {
    pub fn init(component: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Initialization { component: component.into(), source }
    }
}

/// which call to the trip api failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RegisterTrip,
    UploadData,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::RegisterTrip => write!(f, "trip registration"),
            Stage::UploadData => write!(f, "data upload"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{stage} rejected with status {status}: {body}")]
    Status { stage: Stage, status: u16, body: String },

    #[error("{stage} returned a malformed response: {reason}")]
    MalformedResponse { stage: Stage, reason: String },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
}
