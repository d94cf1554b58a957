//! Trait definitions for the worker pool.
//!
//! These are the seams between the engine and its external collaborators:
//! decoding, inference and memory sampling.

pub mod capability;

pub use capability::{BufferDecoder, InferenceSession, MemorySampler, SessionFactory};
