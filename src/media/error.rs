//! Media error types

use thiserror::Error;

use super::launch::LaunchError;

/// Error returned when a media cannot be constructed
#[derive(Debug, Error)]
pub enum ConstructError {
    /// The factory has no launch description
    #[error("no launch description specified")]
    NoLaunch,

    /// The launch description could not be parsed
    #[error("could not parse launch description: {0}")]
    Launch(#[from] LaunchError),

    /// No `payN` or `dynpayN` element was found
    #[error("no payloaders found in pipeline")]
    NoStreams,

    /// The media has no element to put in a pipeline
    #[error("media has no element")]
    NoElement,

    /// A custom stage failed
    #[error("can't create pipeline: {0}")]
    Pipeline(String),
}

/// Error type for media lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The media was torn down and can't be used anymore
    #[error("media {0} was torn down")]
    TornDown(u64),

    /// The media has no pipeline container to run in
    #[error("media {0} has no pipeline")]
    NoPipeline(u64),
}
