use crate::baggage::Baggage;
use crate::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use crate::PropagationContext;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use std::sync::OnceLock;

static BAGGAGE_HEADER: &str = "baggage";
static LEGACY_BAGGAGE_HEADER: &str = "Baggage";

/// Maximum number of items consumed from one baggage header.
const MAX_BAGGAGE_ITEMS: usize = 180;
/// Maximum total bytes consumed from or written to one baggage header.
const MAX_BAGGAGE_LENGTH: usize = 8192;

// Escape everything outside the W3C baggage-octet ranges
// %x21 / %x23-2B / %x2D-3A / %x3C-5B / %x5D-7E. Space stays a space on the
// wire only as %20, never `+`.
const BAGGAGE_VALUE_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'=')
    .add(b'\\');

// Generic URL encoding for the legacy codec, RFC3986 unreserved kept as-is.
const URL_VALUE_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

static BAGGAGE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();
#[inline]
fn baggage_fields() -> &'static [String; 1] {
    BAGGAGE_FIELDS.get_or_init(|| [BAGGAGE_HEADER.to_owned()])
}

static LEGACY_BAGGAGE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();
#[inline]
fn legacy_baggage_fields() -> &'static [String; 1] {
    LEGACY_BAGGAGE_FIELDS.get_or_init(|| [LEGACY_BAGGAGE_HEADER.to_owned()])
}

/// Is every byte of the encoded value within the baggage-octet alphabet
/// (or a percent sign introducing an escape)?
fn valid_encoded_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b == b'%' || matches!(b, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e))
}

/// Is every `%` in the value followed by two hex digits?
///
/// `percent_decode_str` passes malformed escapes through verbatim; the
/// strict codec treats them as a failed item instead.
fn well_formed_escapes(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

enum ItemPolicy {
    /// One malformed item rejects the whole header.
    RejectHeader,
    /// Malformed items are dropped, the rest of the header survives.
    SkipItem,
}

/// Shared parse shape for both codecs: split on commas, split each item at
/// the first `=`, trim, decode, and stop consuming once either limit is
/// reached. Returns `None` when the policy rejects the header.
fn parse_baggage_header(
    header_value: &str,
    policy: ItemPolicy,
    strict_alphabet: bool,
    decode: impl Fn(&str) -> Option<String>,
) -> Option<Baggage> {
    let mut baggage = Baggage::new();
    let mut total_len = 0usize;

    for item in header_value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let (key, encoded_value) = match item.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => {
                crate::wire_warn!(
                    name: "BaggagePropagator.Extract.InvalidKeyValueFormat",
                    message = "baggage item without key-value separator"
                );
                match policy {
                    ItemPolicy::RejectHeader => return None,
                    ItemPolicy::SkipItem => continue,
                }
            }
        };

        if !Baggage::is_key_valid(key.as_bytes())
            || (strict_alphabet && !valid_encoded_value(encoded_value))
        {
            crate::wire_warn!(
                name: "BaggagePropagator.Extract.InvalidItem",
                message = "baggage item failed key or value validation"
            );
            match policy {
                ItemPolicy::RejectHeader => return None,
                ItemPolicy::SkipItem => continue,
            }
        }

        // An escape sequence that does not decode drops the item alone.
        let value = match decode(encoded_value) {
            Some(value) => value,
            None => {
                crate::wire_warn!(
                    name: "BaggagePropagator.Extract.InvalidUtf8",
                    message = "baggage item value is not valid percent-encoded UTF8"
                );
                continue;
            }
        };

        let entry_len = key.len() + value.len();
        if baggage.len() == MAX_BAGGAGE_ITEMS || total_len + entry_len > MAX_BAGGAGE_LENGTH {
            crate::wire_warn!(
                name: "BaggagePropagator.Extract.LimitExceeded",
                message = "baggage limits reached, remaining items dropped"
            );
            break;
        }
        total_len += entry_len;
        baggage.insert(key, value);
    }

    Some(baggage)
}

/// Serialize baggage entries in enumeration order, stopping before the byte
/// limit would be exceeded.
fn encode_baggage_header(baggage: &Baggage, escapes: &'static AsciiSet) -> String {
    let mut header_value = String::new();

    for (key, value) in baggage.iter() {
        let encoded_value = utf8_percent_encode(value, escapes).to_string();
        let separator_len = if header_value.is_empty() { 0 } else { 1 };
        if header_value.len() + separator_len + key.len() + 1 + encoded_value.len()
            > MAX_BAGGAGE_LENGTH
        {
            crate::wire_warn!(
                name: "BaggagePropagator.Inject.LimitExceeded",
                message = "baggage header byte limit reached, remaining entries dropped"
            );
            break;
        }
        if separator_len > 0 {
            header_value.push(',');
        }
        header_value.push_str(key);
        header_value.push('=');
        header_value.push_str(&encoded_value);
    }

    header_value
}

/// Propagates name-value pairs in [W3C Baggage] format under the `baggage`
/// header.
///
/// Baggage is used to annotate telemetry, adding context and
/// information to metrics, traces, and logs. It is an abstract data type
/// represented by a set of name-value pairs describing user-defined
/// properties. Each name in a [`Baggage`] is associated with exactly one
/// value.
///
/// Values are percent-encoded over the W3C baggage-octet alphabet. One item
/// that fails key or value validation rejects the whole header; the limits
/// (180 items, 8192 bytes) truncate without error.
///
/// # Examples
///
/// ```
/// use tracewire::baggage::Baggage;
/// use tracewire::propagation::{BaggagePropagator, TextMapPropagator};
/// use std::collections::HashMap;
///
/// // Example baggage value passed in externally via http headers
/// let mut headers = HashMap::new();
/// headers.insert("baggage".to_string(), "user_id=1".to_string());
///
/// let propagator = BaggagePropagator::new();
/// // can extract from any type that impls `Extractor`, usually an HTTP header map
/// let cx = propagator.extract(&headers);
///
/// // Iterate over extracted name-value pairs
/// for (name, value) in cx.baggage() {
///     // ...
/// }
///
/// // Add new baggage
/// let mut baggage = Baggage::new();
/// let _ = baggage.insert("server_id", "42");
/// let cx_with_additions = cx.with_baggage(baggage);
///
/// // Inject baggage into http request
/// propagator.inject_context(&cx_with_additions, &mut headers);
///
/// let header_value = headers.get("baggage").expect("header is injected");
/// assert!(header_value.contains("server_id=42"), "does not contain new name-value pair");
/// ```
///
/// [W3C Baggage]: https://w3c.github.io/baggage
/// [`Baggage`]: crate::baggage::Baggage
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for BaggagePropagator {
    /// Encodes the values of the `PropagationContext` and injects them into
    /// the provided `Injector`.
    fn inject_context(&self, cx: &PropagationContext, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if !baggage.is_empty() {
            let header_value = encode_baggage_header(baggage, BAGGAGE_VALUE_ESCAPES);
            if !header_value.is_empty() {
                injector.set(BAGGAGE_HEADER, header_value);
            }
        }
    }

    /// Extracts a `PropagationContext` with baggage values from an
    /// `Extractor`.
    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        extractor: &dyn Extractor,
    ) -> PropagationContext {
        if !cx.baggage().is_empty() {
            return cx.clone();
        }

        if let Some(header_value) = extractor.get(BAGGAGE_HEADER) {
            let parsed = parse_baggage_header(header_value, ItemPolicy::RejectHeader, true, |value| {
                if !well_formed_escapes(value) {
                    return None;
                }
                percent_decode_str(value)
                    .decode_utf8()
                    .ok()
                    .map(|value| value.into_owned())
            });
            match parsed {
                Some(baggage) if !baggage.is_empty() => cx.with_baggage(baggage),
                _ => cx.clone(),
            }
        } else {
            cx.clone()
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(baggage_fields())
    }
}

/// Propagates name-value pairs under the legacy `Baggage` header with
/// generic URL encoding.
///
/// Kept for wire compatibility with older instrumentations: `+` is accepted
/// as an encoded space on extract, and a malformed item is skipped on its
/// own rather than rejecting the header. New deployments should prefer
/// [`BaggagePropagator`].
#[derive(Debug, Default)]
pub struct UrlEncodedBaggagePropagator {
    _private: (),
}

impl UrlEncodedBaggagePropagator {
    /// Construct a new legacy baggage propagator.
    pub fn new() -> Self {
        UrlEncodedBaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for UrlEncodedBaggagePropagator {
    fn inject_context(&self, cx: &PropagationContext, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if !baggage.is_empty() {
            let header_value = encode_baggage_header(baggage, URL_VALUE_ESCAPES);
            if !header_value.is_empty() {
                injector.set(LEGACY_BAGGAGE_HEADER, header_value);
            }
        }
    }

    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        extractor: &dyn Extractor,
    ) -> PropagationContext {
        if !cx.baggage().is_empty() {
            return cx.clone();
        }

        if let Some(header_value) = extractor.get(LEGACY_BAGGAGE_HEADER) {
            let parsed = parse_baggage_header(header_value, ItemPolicy::SkipItem, false, |value| {
                percent_decode_str(&value.replace('+', " "))
                    .decode_utf8()
                    .ok()
                    .map(|value| value.into_owned())
            });
            match parsed {
                Some(baggage) if !baggage.is_empty() => cx.with_baggage(baggage),
                _ => cx.clone(),
            }
        } else {
            cx.clone()
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(legacy_baggage_fields())
    }
}
