use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Service(#[from] constellation_core::Error),

    #[error(transparent)]
    Fabric(#[from] constellation_fabric::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
