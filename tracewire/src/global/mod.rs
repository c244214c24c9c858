//! Process-wide propagation state.
//!
//! Instrumentation call sites read the configured propagator through
//! [`get_text_map_propagator`]; the surrounding application installs one at
//! startup with [`set_text_map_propagator`]. Installation is
//! single-assignment: the first successful call wins, and readers observe a
//! no-op propagator until it happens.
//!
//! # Examples
//!
//! ```
//! use tracewire::global;
//! use tracewire::propagation::{TextMapCompositePropagator, TraceContextPropagator, BaggagePropagator};
//!
//! global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
//!     Box::new(TraceContextPropagator::new()),
//!     Box::new(BaggagePropagator::new()),
//! ]));
//!
//! let mut headers = std::collections::HashMap::new();
//! headers.insert(
//!     "traceparent".to_string(),
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
//! );
//!
//! let cx = global::get_text_map_propagator(|propagator| propagator.extract(&headers));
//! assert!(cx.span_context().is_valid());
//! ```

mod internal_logging;
mod propagation;

pub use propagation::{get_text_map_propagator, set_text_map_propagator};
