//! Charter Telemetry
//!
//! Audit event classification, quality filtering, PII scrubbing, and routing
//! for the Charter compliance engine.
//!
//! Provides:
//! - Deterministic classification of decision telemetry into fixed topics
//! - Quality filtering with sampling and a rolling dedup window
//! - Mandatory PII scrubbing before any event leaves the process
//! - Retrying audit routing with a durable spillover queue
//! - The background pipeline wiring the stages behind a non-blocking sink

pub mod classify;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod router;
pub mod scrub;

pub use classify::{ClassifiedEvent, EventCategory, EventClassifier, Priority};
pub use filter::{FilterConfig, QualityFilter};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use pipeline::{AuditConfig, AuditHandle, AuditPipeline};
pub use router::{AuditRouter, RetryPolicy, RouteResult, RouterConfig, Transport};
pub use scrub::PiiScrubber;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classify::{ClassifiedEvent, EventCategory, EventClassifier};
    pub use crate::filter::QualityFilter;
    pub use crate::pipeline::{AuditConfig, AuditHandle, AuditPipeline};
    pub use crate::router::{AuditRouter, Transport};
    pub use crate::scrub::PiiScrubber;
}
