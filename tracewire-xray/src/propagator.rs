use once_cell::sync::Lazy;
use tracewire::propagation::{
    text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator,
};
use tracewire::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use tracewire::PropagationContext;

const AWS_XRAY_TRACE_HEADER: &str = "x-amzn-trace-id";
const AWS_XRAY_VERSION_KEY: &str = "1";
const HEADER_ROOT_KEY: &str = "Root";
const HEADER_PARENT_KEY: &str = "Parent";
const HEADER_SAMPLED_KEY: &str = "Sampled";

const SAMPLED: &str = "1";
const NOT_SAMPLED: &str = "0";

static AWS_XRAY_HEADER_FIELD: Lazy<[String; 1]> = Lazy::new(|| [AWS_XRAY_TRACE_HEADER.to_owned()]);

/// Extracts and injects trace identity using the AWS X-Ray header format.
///
/// Reads and writes the `x-amzn-trace-id` header, converting between the
/// [X-Ray trace id format][xray-trace-id] and the canonical 16-byte trace
/// id. The header is a `;`-delimited list of `Key=Value` pairs in no fixed
/// order; `Root`, `Parent` and `Sampled` must all be present and valid for
/// the identity to be accepted, and unknown keys are ignored.
///
/// ## Example
///
/// ```
/// use tracewire::global;
/// use tracewire_xray::Propagator;
///
/// global::set_text_map_propagator(Propagator::default());
/// ```
///
/// [xray-trace-id]: https://docs.aws.amazon.com/xray/latest/devguide/xray-api-sendingdata.html#xray-api-traceids
#[derive(Clone, Debug, Default)]
pub struct Propagator {
    _private: (),
}

impl Propagator {
    /// Creates a new X-Ray propagator.
    pub fn new() -> Self {
        Propagator::default()
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value: &str = extractor.get(AWS_XRAY_TRACE_HEADER).unwrap_or("").trim();
        if header_value.is_empty() {
            return Err(());
        }

        let mut trace_id: Option<TraceId> = None;
        let mut parent_segment_id: Option<SpanId> = None;
        let mut sampling_decision: Option<TraceFlags> = None;

        for pair in header_value.split_terminator(';') {
            let (key, value) = match from_key_value_pair(pair.trim()) {
                Some(pair) => pair,
                None => return Err(()),
            };

            match key {
                HEADER_ROOT_KEY => {
                    trace_id = Some(parse_xray_trace_id(value)?);
                }
                HEADER_PARENT_KEY => {
                    parent_segment_id = Some(SpanId::from_hex(value).map_err(|_| ())?);
                }
                HEADER_SAMPLED_KEY => {
                    sampling_decision = Some(match value {
                        NOT_SAMPLED => TraceFlags::default(),
                        SAMPLED => TraceFlags::SAMPLED,
                        _ => return Err(()),
                    });
                }
                // Unknown keys such as `Self` are ignored.
                _ => {}
            }
        }

        // All three recognized keys are required.
        let (trace_id, parent_segment_id, sampling_decision) =
            match (trace_id, parent_segment_id, sampling_decision) {
                (Some(trace_id), Some(parent), Some(sampled)) => (trace_id, parent, sampled),
                _ => return Err(()),
            };

        let span_context = SpanContext::new(
            trace_id,
            parent_segment_id,
            sampling_decision,
            true,
            TraceState::default(),
        );

        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for Propagator {
    fn inject_context(&self, cx: &PropagationContext, injector: &mut dyn Injector) {
        let span_context = cx.span_context();
        if !span_context.is_valid() {
            tracewire::wire_debug!(
                name: "XrayPropagator.Inject.InvalidContext",
                message = "no valid trace identity to inject"
            );
            return;
        }

        let xray_trace_id = format_xray_trace_id(span_context.trace_id());

        let sampling_decision: &str = if span_context.is_sampled() {
            SAMPLED
        } else {
            NOT_SAMPLED
        };

        injector.set(
            AWS_XRAY_TRACE_HEADER,
            format!(
                "{}={};{}={:016x};{}={}",
                HEADER_ROOT_KEY,
                xray_trace_id,
                HEADER_PARENT_KEY,
                span_context.span_id(),
                HEADER_SAMPLED_KEY,
                sampling_decision,
            ),
        );
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

        match self.extract_span_context(extractor) {
            Ok(span_context) => cx.with_remote_span_context(span_context),
            Err(()) => {
                tracewire::wire_debug!(
                    name: "XrayPropagator.Extract.Failed",
                    message = "no valid x-amzn-trace-id identity in carrier"
                );
                cx.clone()
            }
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(AWS_XRAY_HEADER_FIELD.as_ref())
    }
}

/// Parse an X-Ray formatted trace id.
///
/// A `trace_id` consists of three numbers separated by hyphens. For example,
/// `1-58406520-a006649127e371903a2de979`. This includes:
///
/// * The version number, that is, 1.
/// * The time of the original request, in Unix epoch time, in 8 hexadecimal digits.
/// * A 96-bit identifier for the trace, globally unique, in 24 hexadecimal digits.
///
/// See the [AWS X-Ray Documentation][xray-trace-id] for more details.
///
/// [xray-trace-id]: https://docs.aws.amazon.com/xray/latest/devguide/xray-api-sendingdata.html#xray-api-traceids
fn parse_xray_trace_id(value: &str) -> Result<TraceId, ()> {
    let parts: Vec<&str> = value.split_terminator('-').collect();

    if parts.len() != 3 || parts[1].len() != 8 || parts[2].len() != 24 {
        return Err(());
    }

    let trace_id =
        TraceId::from_hex(format!("{}{}", parts[1], parts[2]).as_str()).map_err(|_| ())?;

    if trace_id == TraceId::INVALID {
        Err(())
    } else {
        Ok(trace_id)
    }
}

/// Format a trace id in the X-Ray form, re-inserting the version and epoch
/// dashes.
fn format_xray_trace_id(trace_id: TraceId) -> String {
    let trace_id_as_hex = trace_id.to_string();
    let (timestamp, xray_id) = trace_id_as_hex.split_at(8_usize);

    format!("{AWS_XRAY_VERSION_KEY}-{timestamp}-{xray_id}")
}

fn from_key_value_pair(pair: &str) -> Option<(&str, &str)> {
    let mut key_value_pair: Option<(&str, &str)> = None;

    if let Some(index) = pair.find('=') {
        let (key, value) = pair.split_at(index);
        key_value_pair = Some((key, value.trim_start_matches('=')));
    }
    key_value_pair
}
