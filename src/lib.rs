//! End-to-end verification harness for the FROST-T threshold signing demo.
//!
//! The harness observes a running signing service over HTTP: it checks that
//! the service is reachable, watches its status telemetry, submits one sign
//! request, validates the reply and inspects the transmission event log.

pub mod client;
pub mod config;
pub mod cycle;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod sampler;
pub mod types;
pub mod validator;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{HttpServiceClient, ServiceClient};
pub use config::VerifierConfig;
pub use cycle::{CycleDeltas, CycleResult, CycleSuccess, SigningCycleDriver};
pub use error::{ConfigError, RequestError, RequestResult, SamplerError, TransportError};
pub use events::{decode, DisplayEvent, Event, EventKind, EventTally};
pub use orchestrator::{Phase, RunOutcome, RunSummary, Verifier};
pub use sampler::{SampleWindow, StatusSampler};
pub use types::{HealthInfo, SignRequest, SignResponse, StatusSnapshot};
pub use validator::{validate, ValidationReport};
