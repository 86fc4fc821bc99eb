//! Message types shared by the compile service and the compile worker.
//!
//! This crate is protocol-only; it holds no runtime state:
//! * [`RequestId`] / [`RequestIdGen`]: correlation tokens
//! * [`CompileRequest`] / [`CompileResult`]: the two message payloads
//! * [`WorkerInbound`] / [`WorkerOutbound`]: tagged wire envelopes
//! * [`ResourceTier`]: capability flags of the compiler resource
//! * [`CompileStatus`]: service-side status machine states
//! * [`SourceSet`]: caller-facing project snapshot turned into requests

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod message;
pub mod sources;
pub mod status;
pub mod tier;

pub use error::{ProtocolError, Result};
pub use id::{RequestId, RequestIdGen};
pub use message::{CompileFailure, CompileRequest, CompileResponse, CompileResult, CompileSuccess, DEFAULT_MAIN_PATH, ShadowFiles, WorkerInbound, WorkerOutbound};
pub use sources::SourceSet;
pub use status::CompileStatus;
pub use tier::ResourceTier;
