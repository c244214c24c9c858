//! # W3C Trace Context Propagator
//!

use crate::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use crate::PropagationContext;
use std::sync::OnceLock;

const SUPPORTED_VERSION: u8 = 0;
const INVALID_VERSION: u8 = 0xff;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

// Fixed layout of a version 00 traceparent:
// 00-0af7651916cd43dd8448eb211c80319c-00f067aa0ba902b7-01
const VERSION_DELIMITER: usize = 2;
const TRACE_ID_OFFSET: usize = 3;
const TRACE_ID_DELIMITER: usize = 35;
const SPAN_ID_OFFSET: usize = 36;
const SPAN_ID_DELIMITER: usize = 52;
const FLAGS_OFFSET: usize = 53;
const TRACEPARENT_LEN_V0: usize = 55;

static TRACE_CONTEXT_HEADER_FIELDS: OnceLock<[String; 2]> = OnceLock::new();

fn trace_context_header_fields() -> &'static [String; 2] {
    TRACE_CONTEXT_HEADER_FIELDS
        .get_or_init(|| [TRACEPARENT_HEADER.to_owned(), TRACESTATE_HEADER.to_owned()])
}

/// Propagates trace identity in [W3C TraceContext] format under the
/// `traceparent` and `tracestate` headers.
///
/// The `traceparent` header represents the incoming request in a
/// tracing system in a common format, understood by all vendors.
/// Here's an example of a `traceparent` header.
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// The `traceparent` HTTP header field identifies the incoming request in a
/// tracing system. It has four fields:
///
///    - version
///    - trace-id
///    - parent-id
///    - trace-flags
///
/// The `tracestate` header provides additional vendor-specific trace
/// identification information across different distributed tracing systems.
/// Here's an example of a `tracestate` header
///
/// `tracestate: vendorname1=opaqueValue1,vendorname2=opaqueValue2`
///
/// The version 00 grammar is enforced at its exact fixed offsets; higher
/// versions are parsed best-effort from the same offsets. `tracestate` is
/// only consulted once `traceparent` has parsed successfully, and a
/// malformed `tracestate` degrades to an empty one rather than failing the
/// extraction.
///
/// See the [w3c trace-context docs] for more details.
///
/// [w3c trace-context docs]: https://w3c.github.io/trace-context/
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Extract a span context from the w3c trace-context headers.
    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        // There must be a single traceparent header instance.
        let traceparents = extractor.get_all(TRACEPARENT_HEADER).ok_or(())?;
        if traceparents.len() != 1 {
            return Err(());
        }

        let header_value = traceparents[0].trim();
        if !header_value.is_ascii() || header_value.len() < TRACEPARENT_LEN_V0 {
            return Err(());
        }

        let bytes = header_value.as_bytes();
        if bytes[VERSION_DELIMITER] != b'-'
            || bytes[TRACE_ID_DELIMITER] != b'-'
            || bytes[SPAN_ID_DELIMITER] != b'-'
        {
            return Err(());
        }

        // All four fields must be lower-case hex.
        if bytes[..TRACEPARENT_LEN_V0]
            .iter()
            .any(|b| b.is_ascii_uppercase())
        {
            return Err(());
        }

        let version =
            u8::from_str_radix(&header_value[..VERSION_DELIMITER], 16).map_err(|_| ())?;
        if version == INVALID_VERSION {
            return Err(());
        }

        // Version 00 requires the header to be exactly 55 characters. Higher
        // versions are parsed best-effort from the fixed offsets, but any
        // trailing content must be set off by another delimiter.
        let best_attempt = version > SUPPORTED_VERSION;
        if !best_attempt && header_value.len() != TRACEPARENT_LEN_V0 {
            return Err(());
        }
        if best_attempt
            && header_value.len() > TRACEPARENT_LEN_V0
            && bytes[TRACEPARENT_LEN_V0] != b'-'
        {
            return Err(());
        }

        let trace_id = TraceId::from_hex(&header_value[TRACE_ID_OFFSET..TRACE_ID_DELIMITER])
            .map_err(|_| ())?;
        let span_id =
            SpanId::from_hex(&header_value[SPAN_ID_OFFSET..SPAN_ID_DELIMITER]).map_err(|_| ())?;

        // Build trace flags clearing all flags other than the trace-context
        // supported sampling bit.
        let opts = u8::from_str_radix(&header_value[FLAGS_OFFSET..TRACEPARENT_LEN_V0], 16)
            .map_err(|_| ())?;
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        // tracestate is only meaningful alongside a parsed traceparent. A
        // malformed tracestate drops to empty, the identity survives.
        let trace_state = match extractor.get_all(TRACESTATE_HEADER) {
            Some(trace_state_headers) if !trace_state_headers.is_empty() => {
                TraceState::from_header(&trace_state_headers).unwrap_or_else(|_| {
                    crate::wire_warn!(
                        name: "TraceContextPropagator.Extract.InvalidTracestate",
                        message = "malformed tracestate header dropped"
                    );
                    TraceState::default()
                })
            }
            _ => TraceState::default(),
        };

        // create context
        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);

        // Ensure span is valid
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Properly encodes the values of the trace identity and injects them
    /// into the `Injector`.
    fn inject_context(&self, cx: &PropagationContext, injector: &mut dyn Injector) {
        let span_context = cx.span_context();
        if !span_context.is_valid() {
            crate::wire_debug!(
                name: "TraceContextPropagator.Inject.InvalidContext",
                message = "no valid trace identity to inject"
            );
            return;
        }

        let header_value = format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags() & TraceFlags::SAMPLED
        );
        injector.set(TRACEPARENT_HEADER, header_value);

        let tracestate = span_context.trace_state().header();
        if !tracestate.is_empty() {
            injector.set(TRACESTATE_HEADER, tracestate);
        }
    }

    /// Retrieves encoded trace identity using the `Extractor`. If the
    /// context already holds a valid identity, or no identity was retrieved,
    /// or the retrieved identity is invalid, then the input context is
    /// returned unchanged.
    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        extractor: &dyn Extractor,
    ) -> PropagationContext {
        if cx.span_context().is_valid() {
            // first extracted identity wins across a composite chain
            return cx.clone();
        }

        self.extract_span_context(extractor)
            .map(|sc| cx.with_remote_span_context(sc))
            .unwrap_or_else(|_| cx.clone())
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(trace_context_header_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[rustfmt::skip]
    fn extract_data() -> Vec<(&'static str, &'static str, SpanContext)> {
        vec![
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::default(), true, "foo=bar".parse().unwrap())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, "foo=bar".parse().unwrap())),
            // unused flag bits are masked, not rejected
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, "foo=bar".parse().unwrap())),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, "foo=bar".parse().unwrap())),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-08", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::default(), true, "foo=bar".parse().unwrap())),
            // higher versions parse best-effort, trailing content allowed past a delimiter
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-xyzxsf09", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, "foo=bar".parse().unwrap())),
            ("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, "foo=bar".parse().unwrap())),
        ]
    }

    #[rustfmt::skip]
    fn extract_data_invalid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0000-00000000000000000000000000000000-0000000000000000-01", "wrong version length"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "wrong trace ID length"),
            ("00-ab000000000000000000000000000000-cd0000000000000000-01", "wrong span ID length"),
            ("00-ab000000000000000000000000000000-cd00000000000000-0100", "wrong trace flag length"),
            ("qw-00000000000000000000000000000000-0000000000000000-01",   "bogus version"),
            ("00-qw000000000000000000000000000000-cd00000000000000-01",   "bogus trace ID"),
            ("00-ab000000000000000000000000000000-qw00000000000000-01",   "bogus span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-qw",   "bogus trace flag"),
            ("A0-00000000000000000000000000000000-0000000000000000-01",   "upper case version"),
            ("00-AB000000000000000000000000000000-cd00000000000000-01",   "upper case trace ID"),
            ("00-ab000000000000000000000000000000-CD00000000000000-01",   "upper case span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-A1",   "upper case trace flag"),
            ("00-00000000000000000000000000000000-0000000000000000-01",   "zero trace ID and span ID"),
            ("ff-ab000000000000000000000000000000-cd00000000000000-01",   "version ff"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",      "missing options"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-",     "empty options"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-0",    "version 00 one char short"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01x",  "version 00 one char long"),
            ("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01x",  "best effort missing delimiter"),
            ("",                                                          "empty"),
            ("   ",                                                       "whitespace only"),
            ("00-4bf92f3577b34da6a3ce929d0e0e47\u{00e9}6-00f067aa0ba902b7-01", "non-ascii trace ID"),
        ]
    }

    #[rustfmt::skip]
    fn inject_data() -> Vec<(&'static str, &'static str, SpanContext)> {
        vec![
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, "foo=bar".parse().unwrap())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::default(), true, "foo=bar".parse().unwrap())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "foo=bar", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::new(0xff), true, "foo=bar".parse().unwrap())),
            ("", "", SpanContext::empty_context()),
        ]
    }

    #[test]
    fn extract_w3c() {
        let propagator = TraceContextPropagator::new();

        for (trace_parent, trace_state, expected_context) in extract_data() {
            let mut extractor = HashMap::new();
            extractor.insert(TRACEPARENT_HEADER.to_string(), trace_parent.to_string());
            extractor.insert(TRACESTATE_HEADER.to_string(), trace_state.to_string());

            assert_eq!(
                propagator.extract(&extractor).span_context(),
                &expected_context,
                "failed to extract {trace_parent}"
            )
        }
    }

    #[test]
    fn extract_w3c_tracestate() {
        let propagator = TraceContextPropagator::new();
        let state = "foo=bar".to_string();
        let parent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00".to_string();

        let mut extractor = HashMap::new();
        extractor.insert(TRACEPARENT_HEADER.to_string(), parent);
        extractor.insert(TRACESTATE_HEADER.to_string(), state.clone());

        assert_eq!(
            propagator
                .extract(&extractor)
                .span_context()
                .trace_state()
                .header(),
            state
        )
    }

    #[test]
    fn extract_w3c_tracestate_multiple_instances() {
        let propagator = TraceContextPropagator::new();

        let mut extractor: HashMap<String, Vec<String>> = HashMap::new();
        extractor.insert(
            TRACEPARENT_HEADER.to_string(),
            vec!["00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00".to_string()],
        );
        extractor.insert(
            TRACESTATE_HEADER.to_string(),
            vec!["foo=bar".to_string(), "apple=banana".to_string()],
        );

        assert_eq!(
            propagator
                .extract(&extractor)
                .span_context()
                .trace_state()
                .header(),
            "foo=bar,apple=banana"
        )
    }

    #[test]
    fn extract_w3c_malformed_tracestate_keeps_identity() {
        let propagator = TraceContextPropagator::new();

        let mut extractor = HashMap::new();
        extractor.insert(
            TRACEPARENT_HEADER.to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        extractor.insert(TRACESTATE_HEADER.to_string(), "UPPER=case".to_string());

        let cx = propagator.extract(&extractor);
        assert!(cx.span_context().is_valid());
        assert_eq!(cx.span_context().trace_state(), &TraceState::default());
    }

    #[test]
    fn extract_w3c_reject_invalid() {
        let propagator = TraceContextPropagator::new();

        for (invalid_header, reason) in extract_data_invalid() {
            let mut extractor = HashMap::new();
            extractor.insert(TRACEPARENT_HEADER.to_string(), invalid_header.to_string());

            assert_eq!(
                propagator.extract(&extractor).span_context(),
                &SpanContext::empty_context(),
                "{reason}"
            )
        }
    }

    #[test]
    fn extract_w3c_reject_repeated_traceparent() {
        let propagator = TraceContextPropagator::new();

        let mut extractor: HashMap<String, Vec<String>> = HashMap::new();
        extractor.insert(
            TRACEPARENT_HEADER.to_string(),
            vec![
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
                "00-ab000000000000000000000000000000-cd00000000000000-01".to_string(),
            ],
        );

        assert_eq!(
            propagator.extract(&extractor).span_context(),
            &SpanContext::empty_context()
        );
    }

    #[test]
    fn extract_w3c_noop_when_identity_present() {
        let propagator = TraceContextPropagator::new();

        let mut extractor = HashMap::new();
        extractor.insert(
            TRACEPARENT_HEADER.to_string(),
            "00-ab000000000000000000000000000000-cd00000000000000-01".to_string(),
        );

        let existing = PropagationContext::default().with_remote_span_context(SpanContext::new(
            TraceId::from(1),
            SpanId::from(1),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ));

        let extracted = propagator.extract_with_context(&existing, &extractor);
        assert_eq!(extracted, existing);

        // extracting twice is idempotent as well
        assert_eq!(
            propagator.extract_with_context(&extracted, &extractor),
            extracted
        );
    }

    #[test]
    fn inject_w3c() {
        let propagator = TraceContextPropagator::new();

        for (expected_trace_parent, expected_trace_state, context) in inject_data() {
            let mut injector = HashMap::new();
            propagator.inject_context(
                &PropagationContext::default().with_remote_span_context(context),
                &mut injector,
            );

            assert_eq!(
                Extractor::get(&injector, TRACEPARENT_HEADER).unwrap_or(""),
                expected_trace_parent
            );

            assert_eq!(
                Extractor::get(&injector, TRACESTATE_HEADER).unwrap_or(""),
                expected_trace_state
            );
        }
    }

    #[test]
    fn inject_w3c_empty_tracestate_omitted() {
        let propagator = TraceContextPropagator::new();

        let mut injector: HashMap<String, String> = HashMap::new();
        propagator.inject_context(
            &PropagationContext::default().with_remote_span_context(SpanContext::new(
                TraceId::from(1),
                SpanId::from(1),
                TraceFlags::SAMPLED,
                true,
                TraceState::default(),
            )),
            &mut injector,
        );

        assert!(Extractor::get(&injector, TRACEPARENT_HEADER).is_some());
        assert_eq!(Extractor::get(&injector, TRACESTATE_HEADER), None);
    }

    #[test]
    fn round_trip_w3c() {
        let propagator = TraceContextPropagator::new();

        for sampled in [TraceFlags::default(), TraceFlags::SAMPLED] {
            let cx = PropagationContext::default().with_remote_span_context(SpanContext::new(
                TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
                SpanId::from(0x00f0_67aa_0ba9_02b7),
                sampled,
                true,
                TraceState::default(),
            ));

            let mut carrier = HashMap::new();
            propagator.inject_context(&cx, &mut carrier);
            let extracted = propagator.extract(&carrier);

            assert_eq!(extracted.span_context().trace_id(), cx.span_context().trace_id());
            assert_eq!(extracted.span_context().span_id(), cx.span_context().span_id());
            assert_eq!(extracted.span_context().is_sampled(), cx.span_context().is_sampled());
        }
    }

    #[test]
    fn extract_w3c_memory_safety() {
        let propagator = TraceContextPropagator::new();

        // Very long inputs must be rejected, not sliced blindly.
        let very_long_traceparent = format!("00-{}-{}-01", "a".repeat(1_000), "b".repeat(1_000));
        let mut extractor = HashMap::new();
        extractor.insert(TRACEPARENT_HEADER.to_string(), very_long_traceparent);
        assert_eq!(
            propagator.extract(&extractor).span_context(),
            &SpanContext::empty_context()
        );

        let long_tracestate = format!("key={}", "x".repeat(100_000));
        let mut extractor = HashMap::new();
        extractor.insert(
            TRACEPARENT_HEADER.to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        extractor.insert(TRACESTATE_HEADER.to_string(), long_tracestate);
        assert!(propagator.extract(&extractor).span_context().is_valid());
    }
}
