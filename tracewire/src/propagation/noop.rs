use crate::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use crate::PropagationContext;

/// A propagator that does nothing.
///
/// Injection writes no fields, extraction returns the input context
/// unchanged. The global registry serves this propagator until a real one is
/// installed.
#[derive(Clone, Debug, Default)]
pub struct NoopTextMapPropagator {
    _private: (),
}

impl NoopTextMapPropagator {
    /// Create a new noop propagator
    pub fn new() -> Self {
        NoopTextMapPropagator { _private: () }
    }
}

impl TextMapPropagator for NoopTextMapPropagator {
    fn inject_context(&self, _cx: &PropagationContext, _injector: &mut dyn Injector) {
        // ignored
    }

    fn extract_with_context(
        &self,
        cx: &PropagationContext,
        _extractor: &dyn Extractor,
    ) -> PropagationContext {
        cx.clone()
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&[])
    }
}
