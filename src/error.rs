use thiserror::Error;

/// Errors raised by the core engine (resource model, defragmenters, monitor, executor).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot normalize snapshot: some host has zero total {0}")]
    CannotNormalize(&'static str),

    #[error("host '{0}' not found")]
    HostNotFound(String),

    #[error("vm {0} not found")]
    VmNotFound(u32),

    #[error("vm {0} already present on host '{1}'")]
    VmAlreadyPresent(u32, String),

    #[error("concurrency setting MAX_SIMULTANEOUS_MIGRATIONS={0} is not supported, only 1 is implemented")]
    UnsupportedConcurrency(u32),

    #[error("deployment port unavailable: {0}")]
    DeploymentUnavailable(String),

    #[error("migration of vm {0} refused by platform")]
    MigrationRefused(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
