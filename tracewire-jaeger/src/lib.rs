//! Jaeger propagation for tracewire.
//!
//! Implements the [Jaeger header format]: a single `uber-trace-id` header
//! carrying `{trace-id}:{span-id}:{parent-span-id}:{flags}`, plus
//! `uberctx-`-prefixed carrier keys for Jaeger's baggage-in-header, which
//! are surfaced as vendor trace state.
//!
//! [Jaeger header format]: https://www.jaegertracing.io/docs/1.6/client-libraries/#propagation-format
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
