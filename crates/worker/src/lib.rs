//! Serialized compile worker.
//!
//! The worker owns the only instance of the compiler resource and processes
//! compile requests strictly one at a time from a FIFO queue:
//! * [`CompileWorker`]: supervised worker task plus its submit/shutdown handle
//! * [`TierManager`]: lazily built, monotonically upgraded compiler resource
//! * [`TypesetEngine`], [`AssetLoader`], [`EngineBuilder`]: collaborator seams
//! * [`JobQueue`]: bounded FIFO queue with backpressure

pub mod engine;
pub mod error;
mod panic;
pub mod queue;
mod spawn;
pub mod tier;
mod worker;

#[cfg(test)]
mod testing;

pub use engine::{AssetBundle, AssetFile, AssetLoader, EngineBuilder, EngineFailure, EngineHandle, EngineInput, EngineOutput, Overlays, TypesetEngine, mount_overlays, virtual_path};
pub use error::{AssetError, BuildError, SubmitError, TierError};
pub use panic::join_error_panic_message;
pub use queue::{JobQueue, JobReceiver, JobSender, QueueError};
pub use spawn::{spawn, spawn_blocking};
pub use tier::{BundlePlan, TierManager};
pub use worker::{CompileWorker, ResultReceiver, RestartPolicy, ShutdownMode, ShutdownReport, WorkerSpec};
