//! Concrete periodic tasks. Each implements `Task` and is constructed with
//! its own named config slice (`SPEC_FULL.md` §4.6); the scheduler doesn't
//! know or care which is which.

pub mod check_integrity;
pub mod create_local_clone;
pub mod duplicate_remote_instance_hypervisor;
pub mod incoming_hypervisor;
pub mod outgoing_hypervisor;
pub mod receive_clone;
pub mod rolling_deletion;
pub mod send_clone;

pub use check_integrity::CheckIntegrity;
pub use create_local_clone::CreateLocalClone;
pub use duplicate_remote_instance_hypervisor::DuplicateRemoteInstanceHypervisor;
pub use incoming_hypervisor::IncomingTransferHypervisor;
pub use outgoing_hypervisor::OutgoingTransferHypervisor;
pub use receive_clone::ReceiveClone;
pub use rolling_deletion::RollingDeletion;
pub use send_clone::SendClone;
