//! Media construction
//!
//! This module provides:
//! - Launch description parsing into element graphs
//! - Pipeline containers that run one or more media bins
//! - The media factory with its overridable construction stages
//! - The shared media cache and its lifecycle hooks
//! - The path to factory mapping used by clients

pub mod cache;
pub mod error;
pub mod factory;
pub mod instance;
pub mod launch;
pub mod mapping;
pub mod pipeline;
pub mod stream;

pub use cache::MediaCache;
pub use error::{ConstructError, MediaError};
pub use factory::{
    default_collect_streams, default_configure, default_create_pipeline, default_gen_key,
    default_get_element, DefaultHooks, FactoryConfig, FactoryHooks, MediaFactory,
};
pub use instance::{BuildStage, Media, MediaStatus};
pub use launch::{parse_launch, LaunchError};
pub use mapping::MediaMapping;
pub use pipeline::{Bin, Element, PipelineContainer, PipelineState};
pub use stream::{LowerTransport, MediaStream};
