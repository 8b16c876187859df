// ABOUTME: Live endpoint probing and the health verdict derived from it.
// ABOUTME: Probes run through the readiness poller; the gate folds results under a policy.

mod gate;
mod http;
mod probe;

pub use gate::{GatePolicy, HealthGate, ProbeRecord, Verdict};
pub use http::{HttpClient, HttpError, HyperClient, ProbeUrl};
pub use probe::{HttpProbe, run_probes};
