// ABOUTME: Scripted HTTP client for health probe tests.
// ABOUTME: Each port answers with a fixed status, or starts answering after some failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard::health::{HttpClient, HttpError, ProbeUrl};

#[derive(Debug, Clone, Copy)]
struct Script {
    status: u16,
    /// Requests refused before the endpoint comes up.
    refuse: u32,
}

/// HTTP client keyed by port. Unknown ports refuse connections.
#[derive(Debug, Clone, Default)]
pub struct FakeHttp {
    scripts: Arc<Mutex<HashMap<u16, Script>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(self, port: u16, status: u16) -> Self {
        self.scripts.lock().insert(port, Script { status, refuse: 0 });
        self
    }

    /// `port` refuses `n` requests, then answers 200.
    pub fn up_after(self, port: u16, n: u32) -> Self {
        self.scripts
            .lock()
            .insert(port, Script { status: 200, refuse: n });
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &ProbeUrl) -> Result<u16, HttpError> {
        self.requests.lock().push(url.to_string());
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&url.port()) {
            Some(script) if script.refuse > 0 => {
                script.refuse -= 1;
                Err(refused(url))
            }
            Some(script) => Ok(script.status),
            None => Err(refused(url)),
        }
    }
}

fn refused(url: &ProbeUrl) -> HttpError {
    HttpError::Connect(
        format!("{}:{}", url.host(), url.port()),
        "connection refused".to_string(),
    )
}
