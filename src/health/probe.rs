// ABOUTME: HTTP endpoint probes driven by the readiness poller.
// ABOUTME: All probes of a verification run concurrently under the same budget.

use futures::future::join_all;

use super::http::{HttpClient, ProbeUrl};
use crate::poll::{ProbeResult, ReadinessPoller};

/// A named endpoint that counts as up on a 2xx or 3xx response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbe {
    pub name: String,
    pub url: ProbeUrl,
}

impl HttpProbe {
    pub fn new(name: impl Into<String>, url: ProbeUrl) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }

    async fn check(&self, client: &dyn HttpClient) -> Result<bool, String> {
        let status = client.get(&self.url).await.map_err(|e| e.to_string())?;
        if (200..400).contains(&status) {
            Ok(true)
        } else {
            Err(format!("{} answered HTTP {status}", self.url))
        }
    }
}

/// Poll every probe concurrently; results come back in probe order.
pub async fn run_probes(
    client: &dyn HttpClient,
    probes: &[HttpProbe],
    poller: &ReadinessPoller,
) -> Vec<ProbeResult> {
    join_all(probes.iter().map(|probe| async move {
        let result = poller.poll(&probe.name, || probe.check(client)).await;
        tracing::info!(probe = %probe.name, url = %probe.url, outcome = %result, "probe finished");
        result
    }))
    .await
}
