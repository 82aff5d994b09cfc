//! Core engine for courier: a bounded, fair, crash-safe download-and-delivery
//! job queue.
//!
//! The [`service::Courier`] facade ties the pieces together: durable
//! [`store::JobStore`] (append-only log plus compacted snapshot), admission
//! control in [`limiter`], a fixed worker pool in [`scheduler`], and the two
//! external capability seams in [`adapters`].

pub mod adapters;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod spool;
pub mod stats;
pub mod store;

pub use adapters::{Artifact, DeliveryGateway, Extractor, MediaKind};
pub use config::CourierConfig;
pub use error::{
    AdmitError, CancelError, DeliverError, ExtractError, FailureReason, StoreError, SubmitError,
};
pub use service::Courier;
pub use store::{JobId, JobRecord, JobState, QualitySpec, UserProfile};
