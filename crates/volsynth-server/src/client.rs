use std::time::Duration;

use volsynth_synth::{
    ServiceError, SynthesisClient, SynthesisRequest, SynthesisResponse, TRANSFER_FUNCTIONS_ROUTE,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`SynthesisClient`] that posts to a remote synthesis service. Each
/// request blocks until the reply arrives.
#[derive(Debug, Clone)]
pub struct HttpSynthesisClient {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpSynthesisClient {
    /// `addr` is `host:port`; requests go to the transfer-function route.
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self::with_endpoint(format!("http://{}{TRANSFER_FUNCTIONS_ROUTE}", addr.as_ref()))
    }

    /// Post to a full URL instead of the default route.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self, request: &SynthesisRequest) -> Result<SynthesisResponse, ServiceError> {
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(request)
            .map_err(|err| match err {
                ureq::Error::Status(code, response) => {
                    let message = response
                        .into_json::<serde_json::Value>()
                        .ok()
                        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
                        .unwrap_or_default();
                    ServiceError::Transport(format!("service answered {code}: {message}"))
                }
                ureq::Error::Transport(transport) => ServiceError::Transport(transport.to_string()),
            })?;

        response
            .into_json::<SynthesisResponse>()
            .map_err(|e| ServiceError::Transport(format!("malformed synthesis response: {e}")))
    }
}

impl SynthesisClient for HttpSynthesisClient {
    async fn request(
        &mut self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResponse, ServiceError> {
        self.post(request)
    }
}
