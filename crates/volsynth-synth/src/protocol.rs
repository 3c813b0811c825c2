//! JSON wire protocol of the synthesis service.

use serde::{Deserialize, Serialize};
use volsynth_core::{ClusterFeature, TransferFunction};

/// A synthesis request: start a session for a new volume, or adapt the
/// current session toward one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RequestBody", into = "RequestBody")]
pub enum SynthesisRequest {
    NewSession { volume: Vec<ClusterFeature> },
    Adapt { tf_index: usize },
}

/// Flat body shape: `{"volume": [...]}` or `{"tfIndex": n}`. A body with
/// both fields starts a new session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<Vec<ClusterFeature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tf_index: Option<usize>,
}

impl TryFrom<RequestBody> for SynthesisRequest {
    type Error = String;

    fn try_from(body: RequestBody) -> Result<Self, Self::Error> {
        match (body.volume, body.tf_index) {
            (Some(volume), _) => Ok(SynthesisRequest::NewSession { volume }),
            (None, Some(tf_index)) => Ok(SynthesisRequest::Adapt { tf_index }),
            (None, None) => Err("expected a `volume` or `tfIndex` field".to_string()),
        }
    }
}

impl From<SynthesisRequest> for RequestBody {
    fn from(request: SynthesisRequest) -> Self {
        match request {
            SynthesisRequest::NewSession { volume } => RequestBody {
                volume: Some(volume),
                tf_index: None,
            },
            SynthesisRequest::Adapt { tf_index } => RequestBody {
                volume: None,
                tf_index: Some(tf_index),
            },
        }
    }
}

impl SynthesisRequest {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The candidate set produced by one request. Empty when the request was
/// a no-op (adaptation without a session).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResponse {
    #[serde(default)]
    pub transfer_functions: Vec<TransferFunction>,
}

impl SynthesisResponse {
    pub fn new(transfer_functions: Vec<TransferFunction>) -> Self {
        Self { transfer_functions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.transfer_functions.is_empty()
    }
}
