//! # Voice Transcript Backend
//!
//! Upload → normalize → transcribe pipeline behind an actix-web API. The
//! binary in `main.rs` only wires these modules together.

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod maintenance;
pub mod middleware;
pub mod pipeline;
pub mod state;
pub mod storage;
pub mod transcription;
