//! # TextMapPropagator
//!
//! [`TextMapPropagator`] performs the injection and extraction of a
//! cross-cutting concern value as string key/values pairs into carriers that
//! travel in-band across process boundaries.
//!
//! The carrier of propagated data on both the client (injector) and server
//! (extractor) side is usually an http request.
//!
//! In order to increase compatibility, the key/value pairs MUST only consist
//! of US-ASCII characters that make up valid HTTP header fields as per RFC
//! 7230.
use crate::propagation::{Extractor, Injector};
use crate::PropagationContext;
use std::fmt::Debug;
use std::slice;

/// Methods to inject and extract a value as text into carriers that travel
/// in-band across process boundaries.
pub trait TextMapPropagator: Debug {
    /// Properly encodes the values of the [`PropagationContext`] and injects
    /// them into the [`Injector`].
    fn inject_context(&self, cx: &PropagationContext, injector: &mut dyn Injector);

    /// Retrieves encoded data using the provided [`Extractor`]. If no data
    /// for this format was retrieved OR if the retrieved data is invalid,
    /// then an empty [`PropagationContext`] is returned.
    fn extract(&self, extractor: &dyn Extractor) -> PropagationContext {
        self.extract_with_context(&PropagationContext::default(), extractor)
    }

    /// Retrieves encoded data using the provided [`Extractor`]. If no data
    /// for this format was retrieved OR if the retrieved data is invalid,
    /// then the given [`PropagationContext`] is returned unchanged.
    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        extractor: &dyn Extractor,
    ) -> PropagationContext;

    /// Returns iter of fields used by [`TextMapPropagator`]
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over fields of a [`TextMapPropagator`]
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of propagator fields
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}
