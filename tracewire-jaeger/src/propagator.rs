use std::borrow::Cow;
use std::str::FromStr;
use tracewire::propagation::{
    text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator,
};
use tracewire::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use tracewire::PropagationContext;

const JAEGER_HEADER: &str = "uber-trace-id";
const JAEGER_BAGGAGE_PREFIX: &str = "uberctx-";
const DEPRECATED_PARENT_SPAN: &str = "0";

/// `Propagator` implements the [Jaeger propagation format].
///
/// The `uber-trace-id` header carries four colon-delimited fields:
/// `{trace-id}:{span-id}:{parent-span-id}:{flags}`. The parent span id is
/// deprecated and ignored on extraction; 64-bit trace ids and short span
/// ids are left-zero-padded to their canonical widths. The delimiter is
/// tolerated in its percent-encoded `%3A` form for carriers that
/// URL-encode header values.
///
/// Carrier keys starting with the baggage prefix (`uberctx-` by default)
/// are collected into the extracted identity's [`TraceState`].
///
/// [Jaeger propagation format]: https://www.jaegertracing.io/docs/1.6/client-libraries/#propagation-format
#[derive(Clone, Debug)]
pub struct Propagator {
    baggage_prefix: &'static str,
    header_name: &'static str,
    fields: [String; 1],
}

// Implement default using Propagator::new() to not break compatibility with previous versions
impl Default for Propagator {
    fn default() -> Self {
        Propagator::new()
    }
}

impl Propagator {
    /// Create a Jaeger propagator
    pub fn new() -> Self {
        Self::with_custom_header_and_baggage(JAEGER_HEADER, JAEGER_BAGGAGE_PREFIX)
    }

    /// Create a Jaeger propagator with custom header name
    pub fn with_custom_header(custom_header_name: &'static str) -> Self {
        Self::with_custom_header_and_baggage(custom_header_name, JAEGER_BAGGAGE_PREFIX)
    }

    /// Create a Jaeger propagator with custom header name and baggage prefix
    ///
    /// NOTE: it'll implicitly fallback to the default header names when the name of provided custom_* is empty
    /// Default header-name is `uber-trace-id` and baggage-prefix is `uberctx-`
    /// The format of serialized contexts and baggages stays unchanged and does not depend
    /// on provided header name and prefix.
    pub fn with_custom_header_and_baggage(
        custom_header_name: &'static str,
        custom_baggage_prefix: &'static str,
    ) -> Self {
        let custom_header_name = if custom_header_name.trim().is_empty() {
            JAEGER_HEADER
        } else {
            custom_header_name
        };

        let custom_baggage_prefix = if custom_baggage_prefix.trim().is_empty() {
            JAEGER_BAGGAGE_PREFIX
        } else {
            custom_baggage_prefix
        };

        Propagator {
            baggage_prefix: custom_baggage_prefix.trim(),
            header_name: custom_header_name.trim(),
            fields: [custom_header_name.to_owned()],
        }
    }

    /// Extract span context from header value
    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let mut header_value = Cow::from(extractor.get(self.header_name).unwrap_or(""));
        // if there is no :, it means header_value could be encoded as url, try decode first
        if !header_value.contains(':') {
            header_value = Cow::from(header_value.replace("%3A", ":"));
        }

        let parts = header_value
            .split(':')
            .filter(|part| !part.is_empty())
            .collect::<Vec<&str>>();
        if parts.len() != 4 {
            tracewire::wire_warn!(
                name: "JaegerPropagator.Extract.InvalidHeader",
                message = "invalid jaeger header format"
            );
            return None;
        }

        match (
            self.extract_trace_id(parts[0]),
            self.extract_span_id(parts[1]),
            // Ignore parent span id since it's deprecated.
            self.extract_trace_flags(parts[3]),
            self.extract_trace_state(extractor),
        ) {
            (Ok(trace_id), Ok(span_id), Ok(flags), Ok(state)) => {
                let span_context = SpanContext::new(trace_id, span_id, flags, true, state);
                span_context.is_valid().then_some(span_context)
            }
            _ => {
                tracewire::wire_warn!(
                    name: "JaegerPropagator.Extract.InvalidHeader",
                    message = "invalid jaeger header format"
                );
                None
            }
        }
    }

    /// Extract trace id from the header.
    ///
    /// A 64-bit trace id is left-zero-padded to the 128-bit canonical form.
    fn extract_trace_id(&self, trace_id: &str) -> Result<TraceId, ()> {
        if trace_id.len() > 32 {
            return Err(());
        }

        TraceId::from_hex(&format!("{trace_id:0>32}")).map_err(|_| ())
    }

    /// Extract span id from the header.
    ///
    /// Short span ids are left-zero-padded to 16 hex characters.
    fn extract_span_id(&self, span_id: &str) -> Result<SpanId, ()> {
        if span_id.len() > 16 {
            return Err(());
        }

        SpanId::from_hex(&format!("{span_id:0>16}")).map_err(|_| ())
    }

    /// Extract flags from the header.
    ///
    /// The first bit controls whether to sample. The remaining Jaeger flag
    /// bits (debug, firehose) have no counterpart in [`TraceFlags`] and are
    /// dropped.
    fn extract_trace_flags(&self, flag: &str) -> Result<TraceFlags, ()> {
        if flag.is_empty() || flag.len() > 2 {
            return Err(());
        }
        let flag = u8::from_str(flag).map_err(|_| ())?;
        if flag & 0x01 == 0x01 {
            Ok(TraceFlags::SAMPLED)
        } else {
            Ok(TraceFlags::default())
        }
    }

    fn extract_trace_state(&self, extractor: &dyn Extractor) -> Result<TraceState, ()> {
        let baggage_keys = extractor
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(self.baggage_prefix))
            .filter_map(|key| {
                extractor
                    .get(key)
                    .map(|value| (key.to_string(), value.to_string()))
            })
            .collect::<Vec<_>>();

        match TraceState::from_key_value(baggage_keys) {
            Ok(trace_state) => Ok(trace_state),
            Err(_) => {
                tracewire::wire_warn!(
                    name: "JaegerPropagator.Extract.InvalidBaggage",
                    message = "invalid baggage-in-header keys, dropping jaeger identity"
                );
                Err(())
            }
        }
    }
}

impl TextMapPropagator for Propagator {
    fn inject_context(&self, cx: &PropagationContext, injector: &mut dyn Injector) {
        let span_context = cx.span_context();
        if !span_context.is_valid() {
            tracewire::wire_debug!(
                name: "JaegerPropagator.Inject.InvalidContext",
                message = "no valid trace identity to inject"
            );
            return;
        }

        let flag: u8 = if span_context.is_sampled() { 0x01 } else { 0x00 };
        let header_value = format!(
            "{}:{}:{}:{:01x}",
            span_context.trace_id(),
            span_context.span_id(),
            DEPRECATED_PARENT_SPAN,
            flag,
        );
        injector.set(self.header_name, header_value);
    }

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
            .unwrap_or_else(|| cx.clone())
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const LONG_TRACE_ID_STR: &str = "000000000000004d0000000000000016";
    const SHORT_TRACE_ID_STR: &str = "4d0000000000000016";
    const TRACE_ID: u128 = 0x0000_0000_0000_004d_0000_0000_0000_0016;
    const SPAN_ID_STR: &str = "0000000000017c29";
    const SHORT_SPAN_ID_STR: &str = "17c29";
    const SPAN_ID: u64 = 0x0000_0000_0001_7c29;

    fn get_extract_data() -> Vec<(&'static str, &'static str, u8, SpanContext)> {
        vec![
            (
                LONG_TRACE_ID_STR,
                SPAN_ID_STR,
                1,
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::SAMPLED,
                    true,
                    TraceState::default(),
                ),
            ),
            (
                SHORT_TRACE_ID_STR,
                SPAN_ID_STR,
                1,
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::SAMPLED,
                    true,
                    TraceState::default(),
                ),
            ),
            (
                SHORT_TRACE_ID_STR,
                SHORT_SPAN_ID_STR,
                1,
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::SAMPLED,
                    true,
                    TraceState::default(),
                ),
            ),
            (
                // the debug bit has no counterpart, only sampled survives
                LONG_TRACE_ID_STR,
                SPAN_ID_STR,
                3,
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::SAMPLED,
                    true,
                    TraceState::default(),
                ),
            ),
            (
                LONG_TRACE_ID_STR,
                SPAN_ID_STR,
                0,
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::default(),
                    true,
                    TraceState::default(),
                ),
            ),
            (
                "invalidtractid",
                SPAN_ID_STR,
                0,
                SpanContext::empty_context(),
            ),
            (
                LONG_TRACE_ID_STR,
                "invalidspanID",
                0,
                SpanContext::empty_context(),
            ),
            (
                LONG_TRACE_ID_STR,
                SPAN_ID_STR,
                120,
                SpanContext::empty_context(),
            ),
        ]
    }

    fn get_inject_data() -> Vec<(SpanContext, String)> {
        vec![
            (
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::SAMPLED,
                    true,
                    TraceState::default(),
                ),
                format!("{LONG_TRACE_ID_STR}:{SPAN_ID_STR}:0:1"),
            ),
            (
                SpanContext::new(
                    TraceId::from(TRACE_ID),
                    SpanId::from(SPAN_ID),
                    TraceFlags::default(),
                    true,
                    TraceState::default(),
                ),
                format!("{LONG_TRACE_ID_STR}:{SPAN_ID_STR}:0:0"),
            ),
        ]
    }

    /// Try to extract the context using the created Propagator with custom header name
    /// from the Extractor under the `context_key` key.
    fn _test_extract_with_header(construct_header: &'static str, context_key: &'static str) {
        let propagator = Propagator::with_custom_header(construct_header);
        for (trace_id, span_id, flag, expected) in get_extract_data() {
            let mut map: HashMap<String, String> = HashMap::new();
            map.set(context_key, format!("{trace_id}:{span_id}:0:{flag}"));
            let context = propagator.extract(&map);
            assert_eq!(context.span_context(), &expected);
        }
    }

    /// Try to inject the context using the created Propagator with custom header name
    /// and expect the serialized context existence under `expect_header` key.
    fn _test_inject_with_header(construct_header: &'static str, expect_header: &'static str) {
        let propagator = Propagator::with_custom_header(construct_header);
        for (span_context, header_value) in get_inject_data() {
            let mut injector = HashMap::new();
            propagator.inject_context(
                &PropagationContext::default().with_remote_span_context(span_context),
                &mut injector,
            );
            assert_eq!(injector.get(expect_header), Some(&header_value));
        }
    }

    #[test]
    fn test_propagator_creation_methods() {
        // Without specifying any custom header or baggage prefix, the header and prefix wil be the default values
        let default_propagator = Propagator::new();
        assert_eq!(default_propagator.header_name, JAEGER_HEADER);
        assert_eq!(default_propagator.baggage_prefix, JAEGER_BAGGAGE_PREFIX);

        let custom_header_propagator = Propagator::with_custom_header("custom-header");
        assert_eq!(custom_header_propagator.header_name, "custom-header");
        assert_eq!(
            custom_header_propagator.baggage_prefix,
            JAEGER_BAGGAGE_PREFIX
        );

        // An empty custom header will result in the default header name
        let propagator_with_empty_custom_header = Propagator::with_custom_header("");
        assert_eq!(
            propagator_with_empty_custom_header.header_name,
            JAEGER_HEADER
        );

        let propagator_with_custom_header_and_baggage_prefixes =
            Propagator::with_custom_header_and_baggage("custom-header", "custom-baggage-prefix");
        assert_eq!(
            propagator_with_custom_header_and_baggage_prefixes.header_name,
            "custom-header"
        );
        assert_eq!(
            propagator_with_custom_header_and_baggage_prefixes.baggage_prefix,
            "custom-baggage-prefix"
        );

        let propagator_with_empty_prefix =
            Propagator::with_custom_header_and_baggage("custom-header", "");
        assert_eq!(propagator_with_empty_prefix.header_name, "custom-header");
        assert_eq!(
            propagator_with_empty_prefix.baggage_prefix,
            JAEGER_BAGGAGE_PREFIX
        );
    }

    #[test]
    fn test_extract_trace_id() {
        let propagator = Propagator::new();

        // short ids are left-zero-padded
        assert_eq!(
            propagator.extract_trace_id("12345"),
            Ok(TraceId::from(0x12345))
        );

        // A trace cannot be more than 32 characters
        assert_eq!(
            propagator.extract_trace_id("1".repeat(33).as_str()),
            Err(())
        );

        // A trace id must be a valid hex-string
        assert_eq!(propagator.extract_trace_id("invalid"), Err(()));
    }

    #[test]
    fn test_extract_span_id() {
        let propagator = Propagator::new();
        assert_eq!(
            propagator.extract_span_id("12345"),
            Ok(SpanId::from(74565))
        );

        // Fail to extract span id with an invalid hex-string
        assert_eq!(propagator.extract_span_id("invalid"), Err(()));

        // Fail to extract span id with a hex-string that is too long
        assert_eq!(propagator.extract_span_id("1".repeat(17).as_str()), Err(()));
    }

    #[test]
    fn test_extract_trace_flags() {
        let propagator = Propagator::new();

        assert_eq!(propagator.extract_trace_flags("1"), Ok(TraceFlags::SAMPLED));

        // The debug bit alone does not imply sampled
        assert_eq!(
            propagator.extract_trace_flags("2"),
            Ok(TraceFlags::default())
        );

        // Debug and sampled together reduce to sampled
        assert_eq!(propagator.extract_trace_flags("3"), Ok(TraceFlags::SAMPLED));

        assert_eq!(propagator.extract_trace_flags(""), Err(()));
        assert_eq!(propagator.extract_trace_flags("aa"), Err(()));
        assert_eq!(propagator.extract_trace_flags("120"), Err(()));
    }

    #[test]
    fn test_extract_trace_state() {
        let propagator = Propagator::with_custom_header_and_baggage("header", "baggage");

        // In this case, no keys start with the custom baggage prefix
        let mut map_without_prefixed_keys: HashMap<String, String> = HashMap::new();
        map_without_prefixed_keys.set("different_prefix_1", "value_1".to_string());
        let empty_trace_state = propagator
            .extract_trace_state(&map_without_prefixed_keys)
            .unwrap();
        assert_eq!(empty_trace_state, TraceState::NONE);

        // In this case, all keys start with the custom baggage prefix
        let mut map_with_prefixed_keys: HashMap<String, String> = HashMap::new();
        map_with_prefixed_keys.set("baggage_1", "value_1".to_string());

        let trace_state = propagator
            .extract_trace_state(&map_with_prefixed_keys)
            .unwrap();
        assert_eq!(
            trace_state,
            TraceState::from_key_value(vec![("baggage_1", "value_1")]).unwrap()
        );

        // A key that fails TraceState validation fails the extraction
        let too_long_baggage_key = format!("baggage_1{}", "_".repeat(256));
        let mut map_with_invalid_key: HashMap<String, String> = HashMap::new();
        map_with_invalid_key.set(&too_long_baggage_key, "value_1".to_string());
        assert_eq!(
            propagator.extract_trace_state(&map_with_invalid_key),
            Err(())
        );
    }

    #[test]
    fn test_extract_empty() {
        let map: HashMap<String, String> = HashMap::new();
        let propagator = Propagator::new();
        let context = propagator.extract(&map);
        assert_eq!(context.span_context(), &SpanContext::empty_context())
    }

    #[test]
    fn test_extract_zero_identity() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.set(JAEGER_HEADER, "0:0:0:1".to_string());
        let propagator = Propagator::new();
        let context = propagator.extract(&map);
        assert_eq!(context.span_context(), &SpanContext::empty_context())
    }

    #[test]
    fn test_extract_too_many_parts() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.set(
            JAEGER_HEADER,
            format!("{LONG_TRACE_ID_STR}:{SPAN_ID_STR}:0:1:aa"),
        );
        let propagator = Propagator::new();
        let context = propagator.extract(&map);
        assert_eq!(context.span_context(), &SpanContext::empty_context());
    }

    #[test]
    fn test_extract_invalid_flag() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.set(
            JAEGER_HEADER,
            format!("{LONG_TRACE_ID_STR}:{SPAN_ID_STR}:0:aa"),
        );
        let propagator = Propagator::new();
        let context = propagator.extract(&map);
        assert_eq!(context.span_context(), &SpanContext::empty_context());
    }

    #[test]
    fn test_extract_from_url() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.set(
            JAEGER_HEADER,
            format!("{LONG_TRACE_ID_STR}%3A{SPAN_ID_STR}%3A0%3A1"),
        );
        let propagator = Propagator::new();
        let context = propagator.extract(&map);
        assert_eq!(
            context.span_context(),
            &SpanContext::new(
                TraceId::from(TRACE_ID),
                SpanId::from(SPAN_ID),
                TraceFlags::SAMPLED,
                true,
                TraceState::default(),
            )
        );
    }

    #[test]
    fn test_extract_noop_when_identity_present() {
        let propagator = Propagator::new();
        let mut map: HashMap<String, String> = HashMap::new();
        map.set(JAEGER_HEADER, format!("{LONG_TRACE_ID_STR}:{SPAN_ID_STR}:0:1"));

        let existing = PropagationContext::default().with_remote_span_context(SpanContext::new(
            TraceId::from(1),
            SpanId::from(1),
            TraceFlags::default(),
            true,
            TraceState::default(),
        ));

        assert_eq!(propagator.extract_with_context(&existing, &map), existing);
    }

    #[test]
    fn test_extract() {
        _test_extract_with_header(JAEGER_HEADER, JAEGER_HEADER)
    }

    #[test]
    fn test_inject() {
        _test_inject_with_header(JAEGER_HEADER, JAEGER_HEADER)
    }

    #[test]
    fn test_extract_with_invalid_header() {
        for construct in &["", "   "] {
            _test_extract_with_header(construct, JAEGER_HEADER)
        }
    }

    #[test]
    fn test_extract_with_valid_header() {
        for construct in &["custom-header", "custom-header   ", "   custom-header   "] {
            _test_extract_with_header(construct, "custom-header")
        }
    }

    #[test]
    fn test_inject_with_invalid_header() {
        for construct in &["", "   "] {
            _test_inject_with_header(construct, JAEGER_HEADER)
        }
    }

    #[test]
    fn test_inject_with_valid_header() {
        for construct in &["custom-header", "custom-header   ", "   custom-header   "] {
            _test_inject_with_header(construct, "custom-header")
        }
    }

    #[test]
    fn round_trip_jaeger() {
        let propagator = Propagator::new();
        for flags in [TraceFlags::default(), TraceFlags::SAMPLED] {
            let cx = PropagationContext::default().with_remote_span_context(SpanContext::new(
                TraceId::from(TRACE_ID),
                SpanId::from(SPAN_ID),
                flags,
                true,
                TraceState::default(),
            ));

            let mut carrier: HashMap<String, String> = HashMap::new();
            propagator.inject_context(&cx, &mut carrier);
            let extracted = propagator.extract(&carrier);

            assert_eq!(extracted.span_context(), cx.span_context());
        }
    }

    #[test]
    fn test_fields() {
        let propagator = Propagator::new();
        let fields = propagator.fields().collect::<Vec<_>>();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.first().unwrap(), &JAEGER_HEADER);
    }
}
