use crate::baggage::Baggage;
use crate::trace::SpanContext;

/// An immutable pairing of a trace identity and a [`Baggage`].
///
/// A `PropagationContext` is the value that travels through a
/// [`TextMapPropagator`]: extraction decodes one from an inbound carrier,
/// injection encodes one into an outbound carrier. Operations return a new
/// context rather than mutating in place, so a context can be shared freely
/// across propagators in a composite chain.
///
/// The default context carries no identity ([`SpanContext::NONE`]) and no
/// baggage; propagators treat it as "nothing extracted yet".
///
/// [`TextMapPropagator`]: crate::propagation::TextMapPropagator
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropagationContext {
    span_context: SpanContext,
    baggage: Baggage,
}

impl PropagationContext {
    /// Construct a context from its parts.
    pub fn new(span_context: SpanContext, baggage: Baggage) -> Self {
        PropagationContext {
            span_context,
            baggage,
        }
    }

    /// The trace identity carried by this context.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The baggage carried by this context.
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Returns a copy of this context with its identity replaced by the
    /// given remotely-propagated `SpanContext`.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        PropagationContext {
            span_context,
            baggage: self.baggage.clone(),
        }
    }

    /// Returns a copy of this context with its baggage replaced.
    pub fn with_baggage(&self, baggage: Baggage) -> Self {
        PropagationContext {
            span_context: self.span_context.clone(),
            baggage,
        }
    }
}
