pub mod backend;
pub mod config;
pub mod error;
pub mod gpu;
pub mod null;
pub mod pipeline;
pub mod ramp;
pub mod target;
pub mod transform;

pub use backend::{Backend, GpuContext, Renderer, TextureOf, ToneMapper};
pub use config::PipelineConfig;
pub use error::{RampError, RenderError};
pub use gpu::{GpuBackend, WgpuContext};
pub use null::NullBackend;
pub use pipeline::{FrameStats, RenderingPipeline, SelectionTicket, TargetId};
pub use ramp::{interpolate, prepare_ramp, Ramp};
pub use target::{RenderTarget, TargetState};
pub use transform::{model_matrix, Filter, Transform};
