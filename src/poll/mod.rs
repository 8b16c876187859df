// ABOUTME: Bounded-retry readiness polling and cooperative cancellation.
// ABOUTME: Shared by provisioning, remote liveness checks and endpoint probing.

mod cancel;
mod poller;

pub use cancel::CancellationToken;
pub use poller::{PollOutcome, PollSettings, Polled, ProbeResult, ReadinessPoller};
