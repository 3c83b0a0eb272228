// SPDX-License-Identifier: MIT

//! Error types for the deployer crate

use smartrelay_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("git error: {0}")]
    Git(String),

    #[error("upload tool could not be run: {0}")]
    Upload(String),
}

pub type Result<T> = std::result::Result<T, DeployError>;
