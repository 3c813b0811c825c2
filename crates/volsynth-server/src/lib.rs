//! Synthesis over HTTP/1.1: a blocking server around [`SynthesisService`]
//! and a matching [`SynthesisClient`].
//!
//! [`SynthesisService`]: volsynth_synth::SynthesisService
//! [`SynthesisClient`]: volsynth_synth::SynthesisClient

pub mod client;
pub mod http;

pub use client::HttpSynthesisClient;
pub use http::{read_request, serve, spawn_server, write_response, HttpError, HttpRequest};
