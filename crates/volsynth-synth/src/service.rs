//! Synthesis service: owns at most one [`Synthesizer`] session and answers
//! [`SynthesisRequest`]s, either in-process or behind the HTTP route.

use serde_json::json;

use crate::config::SynthesisConfig;
use crate::error::ServiceError;
use crate::protocol::{SynthesisRequest, SynthesisResponse};
use crate::session::Synthesizer;

pub const TRANSFER_FUNCTIONS_ROUTE: &str = "/api/get-transfer-functions";

/// Headers attached to every routed response.
pub const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Source of candidate sets for the rendering pipeline. The round trip is
/// the pipeline's only suspension point.
#[allow(async_fn_in_trait)]
pub trait SynthesisClient {
    async fn request(&mut self, request: &SynthesisRequest)
        -> Result<SynthesisResponse, ServiceError>;
}

/// Status and JSON body of a routed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponse {
    pub status: u16,
    pub body: String,
}

impl RouteResponse {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    /// A `{"message": ...}` body with the given status.
    pub fn message(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "message": message }).to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::message(404, "Route not found")
    }

    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            411 => "Length Required",
            413 => "Payload Too Large",
            431 => "Request Header Fields Too Large",
            501 => "Not Implemented",
            _ => "Internal Server Error",
        }
    }
}

pub struct SynthesisService {
    config: SynthesisConfig,
    session: Option<Synthesizer>,
    /// Sessions started so far; offsets the configured seed.
    sessions: u64,
}

impl SynthesisService {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            config,
            session: None,
            sessions: 0,
        }
    }

    /// Config for the next session: the base seed offset by the number of
    /// sessions already started.
    fn next_session_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            seed: self.config.seed.map(|seed| seed.wrapping_add(self.sessions)),
            ..self.config.clone()
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Synthesizer> {
        self.session.as_ref()
    }

    /// Handle a request, reporting adaptation without a session as
    /// [`ServiceError::NoActiveSession`]. A failed new-session request keeps
    /// the previous session.
    pub fn try_handle(
        &mut self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResponse, ServiceError> {
        match request {
            SynthesisRequest::NewSession { volume } => {
                let session = Synthesizer::new(volume.clone(), self.next_session_config())?;
                let response = SynthesisResponse::new(session.transfer_functions());
                self.session = Some(session);
                self.sessions += 1;
                Ok(response)
            }
            SynthesisRequest::Adapt { tf_index } => {
                let session = self.session.as_mut().ok_or(ServiceError::NoActiveSession)?;
                Ok(SynthesisResponse::new(session.adapt(*tf_index)?))
            }
        }
    }

    /// Like [`try_handle`](Self::try_handle), but adaptation without a
    /// session is a no-op answered with an empty response.
    pub fn handle(&mut self, request: &SynthesisRequest) -> Result<SynthesisResponse, ServiceError> {
        match self.try_handle(request) {
            Err(ServiceError::NoActiveSession) => {
                log::warn!("Adaptation requested without an active session; ignoring");
                Ok(SynthesisResponse::empty())
            }
            other => other,
        }
    }

    /// Dispatch one HTTP-style request. Only [`TRANSFER_FUNCTIONS_ROUTE`]
    /// exists; a trailing slash is ignored.
    pub fn route(&mut self, method: &str, path: &str, body: &str) -> RouteResponse {
        let path = path.split('?').next().unwrap_or(path);
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        if path != TRANSFER_FUNCTIONS_ROUTE {
            return RouteResponse::not_found();
        }

        match method {
            "OPTIONS" => RouteResponse::ok(String::new()),
            "POST" => self.route_post(body),
            _ => RouteResponse::not_found(),
        }
    }

    fn route_post(&mut self, body: &str) -> RouteResponse {
        let request = match SynthesisRequest::from_json(body) {
            Ok(request) => request,
            Err(e) => {
                let err = ServiceError::MalformedRequest(e.to_string());
                log::warn!("{err}");
                return RouteResponse::message(400, &err.to_string());
            }
        };

        match self.handle(&request) {
            Ok(response) => match serde_json::to_string(&response) {
                Ok(json) => RouteResponse::ok(json),
                Err(e) => RouteResponse::message(500, &e.to_string()),
            },
            Err(e) => {
                log::warn!("Synthesis request failed: {e}");
                RouteResponse::message(400, &e.to_string())
            }
        }
    }
}

impl SynthesisClient for SynthesisService {
    async fn request(
        &mut self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResponse, ServiceError> {
        self.handle(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthError;
    use volsynth_core::constants::CANDIDATE_COUNT;
    use volsynth_core::{Centroid, ClusterFeature};

    fn features() -> Vec<ClusterFeature> {
        [(50.0, 0.0), (200.0, 10.0)]
            .into_iter()
            .map(|(v, variance)| ClusterFeature {
                min_value: v,
                max_value: v,
                point_count: 3,
                centroid: Centroid {
                    x: 1.0,
                    y: 1.0,
                    z: 1.0,
                    v,
                },
                variance,
                distance_to_volume_center: variance / 2.0,
            })
            .collect()
    }

    fn service() -> SynthesisService {
        SynthesisService::new(SynthesisConfig::default().with_seed(17))
    }

    #[test]
    fn test_adapt_without_session_is_noop() {
        let mut svc = service();
        let request = SynthesisRequest::Adapt { tf_index: 0 };
        assert_eq!(svc.try_handle(&request), Err(ServiceError::NoActiveSession));
        let response = svc.handle(&request).expect("no-op");
        assert!(response.is_empty());
        assert!(!svc.has_session());
    }

    #[test]
    fn test_new_session_then_adapt() {
        let mut svc = service();
        let initial = svc
            .handle(&SynthesisRequest::NewSession { volume: features() })
            .expect("session");
        assert_eq!(initial.transfer_functions.len(), CANDIDATE_COUNT);

        let adapted = svc
            .handle(&SynthesisRequest::Adapt { tf_index: 4 })
            .expect("adapt");
        assert_eq!(adapted.transfer_functions.len(), CANDIDATE_COUNT);
        assert_eq!(svc.session().map(|s| s.round()), Some(1));
    }

    #[test]
    fn test_empty_volume_keeps_previous_session() {
        let mut svc = service();
        svc.handle(&SynthesisRequest::NewSession { volume: features() })
            .expect("session");
        let result = svc.handle(&SynthesisRequest::NewSession { volume: Vec::new() });
        assert_eq!(result, Err(ServiceError::Synthesis(SynthError::EmptyVolume)));
        assert!(svc.has_session());
    }

    #[test]
    fn test_new_session_resets_rates() {
        let mut svc = service();
        svc.handle(&SynthesisRequest::NewSession { volume: features() })
            .expect("session");
        svc.handle(&SynthesisRequest::Adapt { tf_index: 1 }).expect("adapt");
        svc.handle(&SynthesisRequest::NewSession { volume: features() })
            .expect("session");
        let rates = svc.session().map(|s| s.rates()).expect("rates");
        assert_eq!(rates.saturation, 30.0);
        assert_eq!(rates.value, 4.0);
    }

    #[test]
    fn test_consecutive_sessions_draw_fresh_candidates() {
        let mut svc = service();
        let new_session = SynthesisRequest::NewSession { volume: features() };
        let first = svc.handle(&new_session).expect("first");
        let second = svc.handle(&new_session).expect("second");
        assert_ne!(first, second);

        let mut fresh = service();
        assert_eq!(fresh.handle(&new_session).expect("replay"), first);
    }

    #[test]
    fn test_failed_session_does_not_advance_seed() {
        let mut svc = service();
        let new_session = SynthesisRequest::NewSession { volume: features() };
        let _ = svc.handle(&SynthesisRequest::NewSession { volume: Vec::new() });
        let first = svc.handle(&new_session).expect("session");
        assert_eq!(service().handle(&new_session).expect("replay"), first);
    }

    #[test]
    fn test_route_options_and_unknown() {
        let mut svc = service();
        let preflight = svc.route("OPTIONS", TRANSFER_FUNCTIONS_ROUTE, "");
        assert_eq!(preflight.status, 200);
        assert!(preflight.body.is_empty());

        let missing = svc.route("POST", "/api/other", "{}");
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body, r#"{"message":"Route not found"}"#);

        let wrong_method = svc.route("GET", TRANSFER_FUNCTIONS_ROUTE, "");
        assert_eq!(wrong_method.status, 404);
    }

    #[test]
    fn test_route_post_round_trip() {
        let mut svc = service();
        let body = SynthesisRequest::NewSession { volume: features() }
            .to_json()
            .expect("serialize");
        let created = svc.route("POST", "/api/get-transfer-functions/", &body);
        assert_eq!(created.status, 200);
        let parsed: SynthesisResponse = serde_json::from_str(&created.body).expect("response");
        assert_eq!(parsed.transfer_functions.len(), CANDIDATE_COUNT);

        let adapted = svc.route("POST", TRANSFER_FUNCTIONS_ROUTE, r#"{"tfIndex": 2}"#);
        assert_eq!(adapted.status, 200);

        let out_of_range = svc.route("POST", TRANSFER_FUNCTIONS_ROUTE, r#"{"tfIndex": 99}"#);
        assert_eq!(out_of_range.status, 400);
    }

    #[test]
    fn test_route_malformed_body() {
        let mut svc = service();
        let response = svc.route("POST", TRANSFER_FUNCTIONS_ROUTE, "{");
        assert_eq!(response.status, 400);
        assert!(response.body.contains("malformed"));
    }

    #[test]
    fn test_route_adapt_without_session() {
        let mut svc = service();
        let response = svc.route("POST", TRANSFER_FUNCTIONS_ROUTE, r#"{"tfIndex": 0}"#);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"transferFunctions":[]}"#);
    }

    #[test]
    fn test_client_trait_in_process() {
        let mut svc = service();
        let response = pollster::block_on(
            svc.request(&SynthesisRequest::NewSession { volume: features() }),
        )
        .expect("response");
        assert_eq!(response.transfer_functions.len(), CANDIDATE_COUNT);
    }
}
