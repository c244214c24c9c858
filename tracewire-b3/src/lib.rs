//! B3 propagation for tracewire.
//!
//! The [B3 format] predates W3C Trace Context and is still emitted by
//! Zipkin-lineage tracers. It exists in two encodings, selected at
//! construction time:
//!
//! 1. Multiple headers (the default):
//!    `x-b3-traceid`, `x-b3-spanid`, `x-b3-parentspanid`, `x-b3-sampled`,
//!    `x-b3-flags`
//! 2. A single combined `b3` header:
//!    `{trace_id}-{span_id}[-{sampling_state}[-{parent_span_id}]]`
//!
//! [B3 format]: https://github.com/openzipkin/b3-propagation
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

mod propagator;

pub use propagator::Propagator;
