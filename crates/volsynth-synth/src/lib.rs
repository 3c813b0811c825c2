pub mod config;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;

pub use config::SynthesisConfig;
pub use error::{ServiceError, SynthError};
pub use protocol::{SynthesisRequest, SynthesisResponse};
pub use service::{
    RouteResponse, SynthesisClient, SynthesisService, RESPONSE_HEADERS, TRANSFER_FUNCTIONS_ROUTE,
};
pub use session::{AdaptationRates, ClusterColorSettings, Synthesizer};
