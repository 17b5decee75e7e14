//! Connectors to the log cluster and the dashboard system.
//!
//! [`EsClient`] covers the cluster's catalog surface: indices, field
//! mappings, cardinality probes, and index stats. [`KibanaClient`] reads
//! dashboards into [`CandidateDescriptor`]s and maintains the shared
//! metrics dashboard. [`analyzer`] joins the two into scored dashboard
//! analyses, and [`CandidateSource`] is the seam the lifecycle layer
//! depends on instead of concrete clients.
//!
//! [`CandidateDescriptor`]: l2m_core::candidate::CandidateDescriptor

pub mod analyzer;
pub mod es;
pub mod kibana;
mod metrics_dashboard;
pub mod models;
pub mod source;

pub use analyzer::{analyze_dashboard, DashboardAnalysis, ScoredCandidate};
pub use es::EsClient;
pub use kibana::KibanaClient;
pub use source::{CandidateSource, LiveSource};
