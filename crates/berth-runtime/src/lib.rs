//! Berth Runtime - Container runtime invocation and host port allocation

pub mod compose;
pub mod ports;
pub mod traits;

pub use compose::ComposeRuntime;
pub use ports::PortAllocator;
pub use traits::{CommandOutput, ContainerRuntime, PrepareResult, RuntimeCommand};
