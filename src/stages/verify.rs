// ABOUTME: Verify stage: probes the deployed endpoints and records the run's health verdict.
// ABOUTME: An unhealthy verdict fails the stage; it is still recorded for the report.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ProbeConfig, VerifyConfig};
use crate::health::{GatePolicy, HealthGate, HttpClient, HttpProbe, ProbeUrl, run_probes};
use crate::outputs::OutputKey;
use crate::pipeline::{StageContext, StageError, StageRunner};
use crate::poll::{PollSettings, ReadinessPoller};
use crate::types::StageId;

pub struct VerifyStage {
    policy: GatePolicy,
    probes: Vec<ProbeConfig>,
    poll: PollSettings,
    address_from: StageId,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for VerifyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyStage")
            .field("policy", &self.policy)
            .field("probes", &self.probes)
            .field("poll", &self.poll)
            .finish()
    }
}

impl VerifyStage {
    pub fn new(config: &VerifyConfig, address_from: StageId, http: Arc<dyn HttpClient>) -> Self {
        Self {
            policy: config.policy,
            probes: config.probes.iter().cloned().collect(),
            poll: config.poll,
            address_from,
            http,
        }
    }

    fn http_probes(&self, address: &str) -> Result<Vec<HttpProbe>, StageError> {
        self.probes
            .iter()
            .map(|probe| {
                let url = format!("http://{address}:{}{}", probe.port, probe.path);
                let url = ProbeUrl::parse(&url)
                    .map_err(|e| StageError::Config(format!("probe '{}': {e}", probe.name)))?;
                Ok(HttpProbe::new(&probe.name, url))
            })
            .collect()
    }
}

#[async_trait]
impl StageRunner for VerifyStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        let address = ctx.require(&OutputKey::new(self.address_from.clone(), "address"))?;
        let probes = self.http_probes(&address)?;

        let poller = ReadinessPoller::new(self.poll, ctx.cancel_token().clone());
        let results = run_probes(self.http.as_ref(), &probes, &poller).await;
        if results.iter().any(|r| r.is_cancelled()) {
            return Err(StageError::Cancelled);
        }

        let verdict = HealthGate::evaluate(&results, self.policy);
        tracing::info!(%verdict, "health verdict");
        let healthy = verdict.healthy();
        let summary = verdict.to_string();
        ctx.publish("healthy", healthy.to_string())?;
        ctx.record_verdict(verdict)?;

        if healthy {
            Ok(())
        } else {
            Err(StageError::Unhealthy(summary))
        }
    }
}
