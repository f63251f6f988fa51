//! Virtualization engine: uniformly create, start, stop, suspend, resume,
//! delete, snapshot, and query VMs across hypervisor backends.
//!

pub mod backend;
pub mod descriptor;
pub mod manager;
pub mod snapshot;
pub mod template;

pub use descriptor::{ByteSize, NetworkConfig, VmDescriptor, VmState};
pub use manager::VirtManager;
pub use snapshot::Snapshot;
