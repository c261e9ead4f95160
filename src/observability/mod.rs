//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, cache, realtime produce:
//!     → logging.rs (structured log events, one span per dispatched call)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the dispatch span and the `x-request-id` header
//! - Metric updates go through the `metrics` facade and are no-ops until an
//!   exporter is installed

pub mod logging;
pub mod metrics;
