//! Caller-facing side of the compile pipeline.
//!
//! * [`CompileService`]: status state machine, dispatch, reply correlation
//! * [`CompileListener`] / [`ListenerGuard`]: listener fan-out with disposers
//! * [`Coalescer`]: debounced forwarding with a compile-now bypass
//! * [`CompileConfig`]: TOML configuration for all of the above

pub mod coalescer;
pub mod config;
pub mod error;
pub mod listener;
mod service;

#[cfg(test)]
mod testing;

pub use coalescer::{Coalescer, CompileTarget};
pub use config::{CompileConfig, WorkerConfig};
pub use error::{ConfigError, ServiceError};
pub use listener::{CompileListener, ListenerGuard};
pub use service::{CompileService, Settled};
