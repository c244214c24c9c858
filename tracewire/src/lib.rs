//! Wire-format context propagation for distributed tracing.
//!
//! A trace only stays one trace while every service on the request path can
//! read the identity its caller sent and hand the same identity to its own
//! callees. tracewire implements that handoff: encoding a trace identity
//! (trace id, span id, sampling decision, vendor trace state) and
//! application [baggage] into transport headers, and decoding them back,
//! across the header formats in production use today.
//!
//! # What this crate contains
//!
//! - **Data model** — [`trace::SpanContext`] (identity), [`baggage::Baggage`]
//!   (cross-cutting application context), and [`PropagationContext`] pairing
//!   the two for one extract/inject call.
//! - **Propagation contracts** — [`propagation::TextMapPropagator`] plus the
//!   [`propagation::Injector`]/[`propagation::Extractor`] carrier
//!   abstractions, so any key/value transport (HTTP headers, gRPC metadata,
//!   environment variables) can participate.
//! - **W3C codecs** — [`propagation::TraceContextPropagator`] for
//!   `traceparent`/`tracestate` and [`propagation::BaggagePropagator`] for
//!   `baggage` (with a legacy URL-encoded variant for older
//!   instrumentations).
//! - **Composition** — [`propagation::TextMapCompositePropagator`] chains
//!   formats so extraction takes the first that parses and injection writes
//!   them all, and [`global`] holds the one propagator the process is
//!   configured with.
//!
//! Vendor formats live in their own crates: `tracewire-b3`,
//! `tracewire-jaeger` and `tracewire-xray`.
//!
//! Everything here is synchronous, allocation-light string handling; there
//! is no I/O and no shared mutable state outside the global registry.
//! Extraction and injection never panic and never return errors to the
//! request path — a malformed inbound header degrades to "no propagated
//! identity", and failures surface only through the optional
//! `internal-logs` diagnostics.
//!
//! # Getting started
//!
//! ```
//! use std::collections::HashMap;
//! use tracewire::propagation::{TextMapPropagator, TraceContextPropagator};
//!
//! // An inbound request carries a traceparent header
//! let mut headers = HashMap::new();
//! headers.insert(
//!     "traceparent".to_string(),
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
//! );
//!
//! let propagator = TraceContextPropagator::new();
//! let cx = propagator.extract(&headers);
//! assert!(cx.span_context().is_valid());
//!
//! // ... and the same identity flows into the outbound request
//! let mut outbound = HashMap::new();
//! propagator.inject_context(&cx, &mut outbound);
//! assert!(outbound.contains_key("traceparent"));
//! ```
//!
//! [baggage]: https://w3c.github.io/baggage
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(test, deny(warnings))]

pub mod baggage;
mod context;
pub mod global;
pub mod propagation;
pub mod trace;
mod trace_context;

pub use context::PropagationContext;
pub use trace_context::{SpanId, TraceFlags, TraceId};

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
