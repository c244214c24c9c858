use tracewire::propagation::{
    text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator,
};
use tracewire::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use tracewire::PropagationContext;

const B3_SINGLE_HEADER: &str = "b3";
/// As per spec, the multiple header should be case sensitive. But different protocol will use
/// different formats. For example, HTTP will use X-B3-$name while gRPC will use x-b3-$name. So here
/// we leave it to be lower case since we cannot tell what kind of protocol will be used.
const B3_TRACE_ID_HEADER: &str = "x-b3-traceid";
const B3_SPAN_ID_HEADER: &str = "x-b3-spanid";
const B3_SAMPLED_HEADER: &str = "x-b3-sampled";
const B3_FLAGS_HEADER: &str = "x-b3-flags";
const B3_PARENT_SPAN_ID_HEADER: &str = "x-b3-parentspanid";

// B3-propagation used to send 8-byte trace ids; those are left-padded to the
// canonical 16-byte form.
const UPPER_TRACE_ID: &str = "0000000000000000";

const SAMPLED_VALUE: &str = "1";
// Some old zipkin implementations may send true/false for the sampled
// header. Only accepted on incoming values.
const LEGACY_SAMPLED_VALUE: &str = "true";
// "Debug" value of the x-b3-flags header, implies sampled.
const FLAGS_VALUE: &str = "1";

lazy_static::lazy_static! {
    static ref B3_SINGLE_FIELDS: [String; 1] = [B3_SINGLE_HEADER.to_string()];
    static ref B3_MULTI_FIELDS: [String; 4] = [B3_TRACE_ID_HEADER.to_string(), B3_SPAN_ID_HEADER.to_string(), B3_SAMPLED_HEADER.to_string(), B3_FLAGS_HEADER.to_string()];
}

/// Extracts and injects trace identity using the B3 header format.
///
/// The encoding is fixed at construction time: [`Propagator::new`] uses the
/// discrete `x-b3-*` headers, [`Propagator::with_single_header`] the
/// combined `b3` header. There is no cross-mode fallback.
///
/// Sampling: the identity is recorded when `x-b3-sampled` is `1` or the
/// legacy `true`, or when the debug header `x-b3-flags` is `1`. Injection
/// omits the sampled header entirely for unrecorded identities; on this
/// format absence means not-sampled, not an explicit `0`.
#[derive(Clone, Debug, Default)]
pub struct Propagator {
    single_header: bool,
}

impl Propagator {
    /// Create a B3 propagator using the multiple `x-b3-*` headers.
    pub fn new() -> Self {
        Propagator {
            single_header: false,
        }
    }

    /// Create a B3 propagator using the single combined `b3` header.
    pub fn with_single_header() -> Self {
        Propagator {
            single_header: true,
        }
    }

    /// Extract trace id from hex encoded &str value, left-padding 8-byte ids.
    fn extract_trace_id(&self, trace_id: &str) -> Result<TraceId, ()> {
        // Only allow lower case hex string
        if trace_id.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(());
        }

        match trace_id.len() {
            32 => TraceId::from_hex(trace_id).map_err(|_| ()),
            16 => TraceId::from_hex(&format!("{UPPER_TRACE_ID}{trace_id}")).map_err(|_| ()),
            _ => Err(()),
        }
    }

    /// Extract span id from hex encoded &str value.
    fn extract_span_id(&self, span_id: &str) -> Result<SpanId, ()> {
        // Only allow lower case hex string
        if span_id.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(());
        }

        SpanId::from_hex(span_id).map_err(|_| ())
    }

    /// The sampled/debug decision for the extracted identity.
    fn sampled_flags(sampled: Option<&str>, debug: Option<&str>) -> TraceFlags {
        let recorded = matches!(sampled, Some(SAMPLED_VALUE) | Some(LEGACY_SAMPLED_VALUE))
            || debug == Some(FLAGS_VALUE);
        if recorded {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        }
    }

    /// Extract a `SpanContext` from the single B3 header.
    fn extract_single_header(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(B3_SINGLE_HEADER).unwrap_or("").trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        // Ensure length is within range.
        if parts.len() > 4 || parts.len() < 2 {
            return Err(());
        }

        let trace_id = self.extract_trace_id(parts[0])?;
        let span_id = self.extract_span_id(parts[1])?;
        let trace_flags = if parts.len() > 2 {
            Propagator::sampled_flags(Some(parts[2]), None)
        } else {
            TraceFlags::default()
        };

        // Ensure parent id, if present, is well formed.
        if parts.len() == 4 {
            let _ = self.extract_span_id(parts[3])?;
        }

        let span_context =
            SpanContext::new(trace_id, span_id, trace_flags, true, TraceState::default());

        // Ensure span is valid
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }

    /// Extract a `SpanContext` from the multiple B3 headers.
    fn extract_multi_header(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let trace_id = self.extract_trace_id(extractor.get(B3_TRACE_ID_HEADER).unwrap_or(""))?;
        let span_id = self.extract_span_id(extractor.get(B3_SPAN_ID_HEADER).unwrap_or(""))?;

        // The parent span id plays no part in the extracted identity, but a
        // malformed one is worth a diagnostic.
        if let Some(parent) = extractor.get(B3_PARENT_SPAN_ID_HEADER) {
            if self.extract_span_id(parent).is_err() {
                tracewire::wire_debug!(
                    name: "B3Propagator.Extract.InvalidParentSpanId",
                    message = "ignoring malformed x-b3-parentspanid"
                );
            }
        }

        let trace_flags = Propagator::sampled_flags(
            extractor.get(B3_SAMPLED_HEADER),
            extractor.get(B3_FLAGS_HEADER),
        );

        let span_context =
            SpanContext::new(trace_id, span_id, trace_flags, true, TraceState::default());

        if span_context.is_valid() {
            Ok(span_context)
        } else {
            Err(())
        }
    }
}

impl TextMapPropagator for Propagator {
    /// Properly encodes the values of the context's trace identity and
    /// injects them into the `Injector`.
    fn inject_context(&self, context: &PropagationContext, injector: &mut dyn Injector) {
        let span_context = context.span_context();
        if !span_context.is_valid() {
            tracewire::wire_debug!(
                name: "B3Propagator.Inject.InvalidContext",
                message = "no valid trace identity to inject"
            );
            return;
        }

        if self.single_header {
            let mut value = format!(
                "{:032x}-{:016x}",
                span_context.trace_id().to_u128(),
                span_context.span_id().to_u64(),
            );
            if span_context.is_sampled() {
                value = format!("{value}-{SAMPLED_VALUE}");
            }

            injector.set(B3_SINGLE_HEADER, value);
        } else {
            injector.set(
                B3_TRACE_ID_HEADER,
                format!("{:032x}", span_context.trace_id().to_u128()),
            );
            injector.set(
                B3_SPAN_ID_HEADER,
                format!("{:016x}", span_context.span_id().to_u64()),
            );
            if span_context.is_sampled() {
                injector.set(B3_SAMPLED_HEADER, SAMPLED_VALUE.to_string());
            }
        }
    }

    /// Retrieves encoded data using the provided `Extractor`. If the context
    /// already holds a valid identity, or no data for this format was
    /// retrieved, or the retrieved data is invalid, then the input context
    /// is returned.
    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        extractor: &dyn Extractor,
    ) -> PropagationContext {
        if cx.span_context().is_valid() {
            // first extracted identity wins across a composite chain
            return cx.clone();
        }

        let extract_result = if self.single_header {
            self.extract_single_header(extractor)
        } else {
            self.extract_multi_header(extractor)
        };

        match extract_result {
            Ok(span_context) => cx.with_remote_span_context(span_context),
            Err(()) => {
                tracewire::wire_debug!(
                    name: "B3Propagator.Extract.Failed",
                    message = "no valid b3 identity in carrier"
                );
                cx.clone()
            }
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        if self.single_header {
            FieldIter::new(B3_SINGLE_FIELDS.as_ref())
        } else {
            FieldIter::new(B3_MULTI_FIELDS.as_ref())
        }
    }
}
