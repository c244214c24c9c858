//! # Composite Propagator
//!
//! A utility over multiple propagators to group multiple propagators from
//! different cross-cutting concerns in order to leverage them as a single
//! entity.
//!
//! Each composite propagator will implement a specific propagator type, such
//! as [`TextMapPropagator`], as different propagator types will likely
//! operate on different data types.
use crate::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use crate::PropagationContext;

/// Composite propagator for [`TextMapPropagator`]s.
///
/// A propagator that chains multiple [`TextMapPropagator`] propagators
/// together, injecting or extracting by their respective HTTP header names.
///
/// Injection and extraction from this propagator preserve the order of the
/// propagators passed in during initialization: extraction folds the context
/// through every propagator in turn, and because each format no-ops once a
/// valid identity is present, the earliest format in the list that parses
/// wins. Injection fans out to every propagator unconditionally.
///
/// # Examples
///
/// ```
/// use tracewire::propagation::{
///     BaggagePropagator, TextMapCompositePropagator, TextMapPropagator, TraceContextPropagator,
/// };
/// use std::collections::HashMap;
///
/// // First create 1 or more propagators
/// let baggage_propagator = BaggagePropagator::new();
/// let trace_context_propagator = TraceContextPropagator::new();
///
/// // Then create a composite propagator
/// let composite_propagator = TextMapCompositePropagator::new(vec![
///     Box::new(baggage_propagator),
///     Box::new(trace_context_propagator),
/// ]);
///
/// // And a carrier holding both concerns
/// let mut carrier = HashMap::new();
/// carrier.insert(
///     "traceparent".to_string(),
///     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
/// );
/// carrier.insert("baggage".to_string(), "user_id=1".to_string());
///
/// // A single extract call decodes both
/// let cx = composite_propagator.extract(&carrier);
/// assert!(cx.span_context().is_valid());
/// assert_eq!(cx.baggage().get("user_id"), Some("1"));
/// ```
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
}

impl TextMapCompositePropagator {
    /// Constructs a new propagator out of instances of [`TextMapPropagator`].
    ///
    /// [`TextMapPropagator`]: TextMapPropagator
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        TextMapCompositePropagator { propagators }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    /// Encodes the values of the `PropagationContext` and injects them into
    /// every registered propagator's headers.
    fn inject_context(&self, context: &PropagationContext, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(context, injector)
        }
    }

    /// Retrieves encoded `PropagationContext` information using the
    /// `Extractor`. The context is folded through each propagator in
    /// configuration order; if no data was retrieved OR if the retrieved
    /// data is invalid, then the input context is returned.
    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        extractor: &dyn Extractor,
    ) -> PropagationContext {
        self.propagators
            .iter()
            .fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    /// Returns an empty iterator.
    ///
    /// The union of the component propagators' fields is deliberately not
    /// computed here; callers that need the exact header set must consult
    /// the component propagators directly. This is a documented limitation.
    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&[])
    }
}
