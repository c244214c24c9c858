//! # Propagator interface
//!
//! Cross-cutting concerns send their state to the next process using
//! propagators, which are defined as objects used to read and write context
//! data to and from messages exchanged by the applications.
//!
//! Propagators leverage the [`PropagationContext`] to inject and extract data
//! for each cross-cutting concern, such as the trace identity and [`Baggage`].
//!
//! The propagator API is expected to be leveraged by users writing
//! instrumentation libraries.
//!
//! Currently, the following propagator type is supported:
//! -  [`TextMapPropagator`], injects values into and extracts values from carriers as string key/value pairs
//!
//! Propagators use [`Injector`] and [`Extractor`] to read and write context
//! data to and from messages. Each specific propagator type defines its
//! expected carrier type, such as a string map or a byte array.
//!
//! [`Baggage`]: crate::baggage::Baggage
//! [`PropagationContext`]: crate::PropagationContext
use std::collections::HashMap;
use std::env;

mod baggage;
pub mod composite;
mod noop;
pub mod text_map_propagator;
mod trace_context;

pub use baggage::{BaggagePropagator, UrlEncodedBaggagePropagator};
pub use composite::TextMapCompositePropagator;
pub use noop::NoopTextMapPropagator;
pub use text_map_propagator::TextMapPropagator;
pub use trace_context::TraceContextPropagator;

/// Injector provides an interface for adding fields to an underlying struct like `HashMap`
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying struct like `HashMap`
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;

    /// Get all values from a key from the underlying data.
    ///
    /// Carriers that can hold repeated header instances should override this;
    /// the default forwards the single value returned by [`get`].
    ///
    /// [`get`]: Extractor::get
    fn get_all(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key).map(|value| vec![value])
    }
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, Vec<String>, S> {
    /// Get the first value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase())
            .and_then(|v| v.first())
            .map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }

    /// Get all values for a key, covering repeated header instances.
    fn get_all(&self, key: &str) -> Option<Vec<&str>> {
        self.get(&key.to_lowercase())
            .map(|v| v.iter().map(|v| v.as_str()).collect())
    }
}

/// Injector for `std::process::Command` that sets environment variables for child processes.
///
/// Keys are converted to uppercase.
impl Injector for std::process::Command {
    fn set(&mut self, key: &str, value: String) {
        self.env(key.to_uppercase(), value);
    }
}

/// Extractor for environment variables.
///
/// Keys are case-insensitive and automatically converted to uppercase.
#[derive(Debug, Default)]
pub struct EnvExtractor {
    // Values must outlive `get` calls; the process environment cannot hand
    // out borrowed strings, so lookups are cached here.
    cache: HashMap<String, String>,
}

impl EnvExtractor {
    /// Create a new extractor that reads from the current environment variables.
    pub fn new() -> Self {
        EnvExtractor {
            cache: env::vars()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        }
    }
}

impl Extractor for EnvExtractor {
    fn get(&self, key: &str) -> Option<&str> {
        self.cache.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.cache.keys().map(|k| k.as_str()).collect()
    }
}
