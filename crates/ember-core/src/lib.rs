pub mod controller;
pub mod driver;
pub mod error;
pub mod infra;
pub mod preempt;
pub mod supervise;

pub mod prelude {
    pub use crate::controller::{Controller, Deps};
    pub use crate::driver::{CiDriver, DriverError};
    pub use crate::error::CoreError;
    pub use crate::infra::{InfraError, Provision, TemplateParams};
    pub use crate::preempt::{PreemptError, PreemptNotify};
    pub use crate::supervise::{AgentHandle, AgentSpec, Supervise, SuperviseError};
}
