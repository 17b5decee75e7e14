//! Materialization backend for metric rules.
//!
//! [`MetricsBackend`] is the capability contract the lifecycle layer
//! drives. [`ElasticBackend`] implements it with one continuous
//! transform plus one retention-managed metrics index per rule, reaching
//! the cluster through the [`TransformApi`] seam so provisioning
//! failures and rollbacks can be exercised without a live cluster.

pub mod backend;
pub mod elastic;
pub mod http;
pub mod transform;

pub use backend::{BackendStatus, HealthState, MetricsBackend, ValidationReport};
pub use elastic::{ElasticBackend, TransformApi};
pub use http::HttpTransformApi;
