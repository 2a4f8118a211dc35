//! # posecast-client
//!
//! Headless client for a remote pose/keypoint inference service.
//! Generates camera-like frames, streams them through a
//! `posecast_core::TransportSession` and logs the overlays that come
//! back.
//!
//! ## Modules
//!
//! - **config**: TOML configuration and conversion to session settings.
//! - **camera**: `SyntheticCamera`, a stand-in for a device camera.
//! - **service**: the capture loop and a logging overlay sink.

pub mod camera;
pub mod config;
pub mod service;
