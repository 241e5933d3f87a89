/// Process control for the upload worker
/// Spawning, liveness, descendant enumeration and signalling,
/// behind a trait so the supervisor can be driven without real processes

pub mod handle;
pub mod system;

#[cfg(test)]
pub(crate) mod fake;

pub use handle::{
    ProcessControl,
    ProcessDescriptor,
    ProcessHandle,
    WorkerCommand,
};
pub use system::SystemProcesses;
