//! AWS X-Ray propagation for tracewire.
//!
//! Converts between the `x-amzn-trace-id` [tracing header] and the
//! canonical trace identity: the X-Ray `Root` field splits the 128-bit
//! trace id into an epoch segment and a random segment
//! (`1-58406520-a006649127e371903a2de979`), `Parent` carries the span id
//! and `Sampled` the sampling decision.
//!
//! [tracing header]: https://docs.aws.amazon.com/xray/latest/devguide/xray-concepts.html#xray-concepts-tracingheader
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
