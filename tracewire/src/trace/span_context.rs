use crate::{SpanId, TraceFlags, TraceId};
use std::collections::VecDeque;
use std::str::FromStr;
use thiserror::Error;

/// Hard cap on tracestate list members, from the [W3C specification].
///
/// [W3C specification]: https://www.w3.org/TR/trace-context/#list
const MAX_LIST_MEMBERS: usize = 32;

const MAX_KEY_LENGTH: usize = 256;
const MAX_TENANT_LENGTH: usize = 241;
const MAX_VENDOR_LENGTH: usize = 14;
const MAX_VALUE_LENGTH: usize = 256;

/// TraceState carries vendor-specific configuration data, represented as a
/// list of key-value pairs. TraceState allows multiple tracing systems to
/// participate in the same trace.
///
/// Please review the [W3C specification] for details on this field.
///
/// [W3C specification]: https://www.w3.org/TR/trace-context/#tracestate-header
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The default `TraceState`, as a constant
    pub const NONE: TraceState = TraceState(None);

    /// Validates that the given `TraceState` list-member key is valid per the [W3 Spec].
    ///
    /// Two shapes are allowed: a simple key, or `tenant@vendor` for
    /// multi-tenant systems.
    ///
    /// [W3 Spec]: https://www.w3.org/TR/trace-context/#key
    fn valid_key(key: &str) -> bool {
        fn lc_alpha_digit(b: u8) -> bool {
            b.is_ascii_lowercase() || b.is_ascii_digit()
        }
        fn key_char(b: u8) -> bool {
            lc_alpha_digit(b) || matches!(b, b'_' | b'-' | b'*' | b'/')
        }

        let bytes = key.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_KEY_LENGTH || !lc_alpha_digit(bytes[0]) {
            return false;
        }

        match key.find('@') {
            None => bytes[1..].iter().all(|&b| key_char(b)),
            Some(at) => {
                let (tenant, vendor) = (&bytes[..at], &bytes[at + 1..]);
                tenant.len() <= MAX_TENANT_LENGTH
                    && !vendor.is_empty()
                    && vendor.len() <= MAX_VENDOR_LENGTH
                    && tenant[1..].iter().all(|&b| key_char(b))
                    && lc_alpha_digit(vendor[0])
                    && vendor[1..].iter().all(|&b| key_char(b))
            }
        }
    }

    /// Validates that the given `TraceState` list-member value is valid per the [W3 Spec].
    ///
    /// Values are 1-256 printable ASCII characters excluding `,` and `=`;
    /// the final character must not be a space.
    ///
    /// [W3 Spec]: https://www.w3.org/TR/trace-context/#value
    fn valid_value(value: &str) -> bool {
        let bytes = value.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_VALUE_LENGTH {
            return false;
        }

        bytes
            .iter()
            .all(|&b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
            && bytes.last() != Some(&b' ')
    }

    /// Creates a new `TraceState` from the given key-value collection.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracewire::trace::TraceState;
    ///
    /// let kvs = vec![("foo", "bar"), ("apple", "banana")];
    /// let trace_state = TraceState::from_key_value(kvs);
    ///
    /// assert!(trace_state.is_ok());
    /// assert_eq!(trace_state.unwrap().header(), String::from("foo=bar,apple=banana"))
    /// ```
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let mut ordered_data = VecDeque::new();
        for (key, value) in trace_state {
            let (key, value) = (key.to_string(), value.to_string());
            if !TraceState::valid_key(key.as_str()) {
                return Err(TraceStateError::Key(key));
            }
            if !TraceState::valid_value(value.as_str()) {
                return Err(TraceStateError::Value(value));
            }
            if ordered_data.iter().any(|(k, _): &(String, String)| *k == key) {
                return Err(TraceStateError::DuplicateKey(key));
            }

            ordered_data.push_back((key, value));
        }

        if ordered_data.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(ordered_data)))
        }
    }

    /// Parses a `TraceState` from one or more raw header values.
    ///
    /// Multiple physical header instances are treated as one logical list in
    /// carrier order. Empty and whitespace-only list members are tolerated
    /// and skipped. A member with no `=`, an invalid key or value, or a key
    /// that was already seen fails the whole parse. Members past the
    /// [32-member cap] are dropped rather than failing the trace.
    ///
    /// [32-member cap]: https://www.w3.org/TR/trace-context/#list
    pub fn from_header<T: AsRef<str>>(header_values: &[T]) -> Result<Self, TraceStateError> {
        let mut entries: VecDeque<(String, String)> = VecDeque::new();

        'outer: for header_value in header_values {
            for member in header_value.as_ref().split(',') {
                let member = member.trim();
                if member.is_empty() {
                    continue;
                }

                if entries.len() == MAX_LIST_MEMBERS {
                    crate::wire_warn!(
                        name: "TraceState.FromHeader.MemberLimitExceeded",
                        message = "tracestate member limit reached, dropping remaining members",
                        dropped_member = member
                    );
                    break 'outer;
                }

                let (key, value) = match member.split_once('=') {
                    Some(split) => split,
                    None => return Err(TraceStateError::List(member.to_string())),
                };
                if !TraceState::valid_key(key) {
                    return Err(TraceStateError::Key(key.to_string()));
                }
                if !TraceState::valid_value(value) {
                    return Err(TraceStateError::Value(value.to_string()));
                }
                if entries.iter().any(|(k, _)| k == key) {
                    return Err(TraceStateError::DuplicateKey(key.to_string()));
                }

                entries.push_back((key.to_string(), value.to_string()));
            }
        }

        if entries.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(entries)))
        }
    }

    /// Retrieves a value for a given key from the `TraceState` if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter().find_map(|item| {
                if item.0.as_str() == key {
                    Some(item.1.as_str())
                } else {
                    None
                }
            })
        })
    }

    /// Inserts the given key-value pair into the `TraceState`. If a value already exists for the
    /// given key, this updates the value and updates the value's position. If the key or value are
    /// invalid per the [W3 Spec] an `Err` is returned, else a new `TraceState` with the
    /// updated key/value is returned.
    ///
    /// [W3 Spec]: https://www.w3.org/TR/trace-context/#mutating-the-tracestate-field
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(value.as_str()) {
            return Err(TraceStateError::Value(value));
        }

        let mut trace_state = self.delete_from_deque(&key);
        let kvs = trace_state.0.get_or_insert(VecDeque::with_capacity(1));

        kvs.push_front((key, value));

        Ok(trace_state)
    }

    /// Removes the given key-value pair from the `TraceState`. If the key is invalid per the
    /// [W3 Spec] an `Err` is returned. Else, a new `TraceState`
    /// with the removed entry is returned.
    ///
    /// If the key is not in `TraceState`. The original `TraceState` will be cloned and returned.
    ///
    /// [W3 Spec]: https://www.w3.org/TR/trace-context/#mutating-the-tracestate-field
    pub fn delete<K: Into<String>>(&self, key: K) -> Result<TraceState, TraceStateError> {
        let key = key.into();
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }

        Ok(self.delete_from_deque(&key))
    }

    /// Delete key from trace state's deque. The key MUST be valid
    fn delete_from_deque(&self, key: &str) -> TraceState {
        let mut owned = self.clone();
        if let Some(kvs) = owned.0.as_mut() {
            if let Some(index) = kvs.iter().position(|x| x.0 == key) {
                kvs.remove(index);
            }
        }
        owned
    }

    /// Creates a new `TraceState` header string, delimiting each key and value with a `=` and each
    /// entry with a `,`.
    pub fn header(&self) -> String {
        self.header_delimited("=", ",")
    }

    /// Creates a new `TraceState` header string, with the given key/value delimiter and entry delimiter.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{key}{entry_delimiter}{value}"))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TraceState::from_header(&[s])
    }
}

/// Error returned by `TraceState` operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#key> for requirement for keys.
    #[error("{0} is not a valid key in TraceState, see https://www.w3.org/TR/trace-context/#key for more details")]
    Key(String),

    /// The value is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#value> for requirement for values.
    #[error("{0} is not a valid value in TraceState, see https://www.w3.org/TR/trace-context/#value for more details")]
    Value(String),

    /// The list member is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#list> for requirement for list members.
    #[error("{0} is not a valid list member in TraceState, see https://www.w3.org/TR/trace-context/#list for more details")]
    List(String),

    /// The key appears more than once in the list.
    #[error("duplicate TraceState key {0}")]
    DuplicateKey(String),
}

/// Immutable portion of a trace identity which can be serialized and
/// propagated across process boundaries.
///
/// This representation conforms to the [W3C TraceContext specification].
///
/// A `SpanContext` extracted from a remote carrier is marked `is_remote`;
/// identities that do not have the `sampled` flag set in their
/// [`TraceFlags`] will be ignored by most tracing tools.
///
/// [W3C TraceContext specification]: https://www.w3.org/TR/trace-context
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Create an invalid empty span context
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The [`TraceId`] for this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns details about the trace.
    ///
    /// Unlike `TraceState` values, these are present in all traces. The current
    /// version of the specification only supports a single flag [`TraceFlags::SAMPLED`].
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the span context has a valid (non-zero) `trace_id` and a
    /// valid (non-zero) `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if the span context was propagated from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    ///
    /// Spans that are not sampled will be ignored by most tracing tools.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// A reference to the span context's [`TraceState`].
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

impl Default for SpanContext {
    fn default() -> Self {
        SpanContext::NONE
    }
}
