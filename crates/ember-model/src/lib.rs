mod domain;
pub use domain::{Labels, Phase, RemoteRunner};

mod config;
pub use config::{CloudKind, CloudSpec, GpuKind, RunnerConfig};

mod driver;
pub use driver::DriverKind;

mod error;
pub use error::ModelError;

mod event;
pub use event::{AgentEvent, LifecycleEvent, LifecycleStatus};

mod infra;
pub use infra::{InfraInstance, InfraResource, InfraState, ProvisionedInfra};

mod job;
pub use job::{JobRecord, JobStatus, PolledJob};

mod reason;
pub use reason::{ShutdownReason, Sig};
