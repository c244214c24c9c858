use crate::propagation::{NoopTextMapPropagator, TextMapPropagator};
use std::sync::OnceLock;

/// The process-wide configured `TextMapPropagator`, set exactly once.
static GLOBAL_TEXT_MAP_PROPAGATOR: OnceLock<Box<dyn TextMapPropagator + Send + Sync>> =
    OnceLock::new();

/// The propagator served before configuration happens.
static DEFAULT_TEXT_MAP_PROPAGATOR: OnceLock<NoopTextMapPropagator> = OnceLock::new();

#[inline]
fn default_text_map_propagator() -> &'static NoopTextMapPropagator {
    DEFAULT_TEXT_MAP_PROPAGATOR.get_or_init(NoopTextMapPropagator::new)
}

/// Sets the given [`TextMapPropagator`] propagator as the current global propagator.
///
/// The global propagator is single-assignment: the first successful call
/// wins and returns `true`. Later calls leave the configured propagator in
/// place and return `false`, with a diagnostic. Configuration policy (panic,
/// ignore, retry) belongs to the caller.
pub fn set_text_map_propagator<P: TextMapPropagator + Send + Sync + 'static>(
    propagator: P,
) -> bool {
    let installed = GLOBAL_TEXT_MAP_PROPAGATOR.set(Box::new(propagator)).is_ok();
    if !installed {
        crate::wire_warn!(
            name: "GlobalPropagator.AlreadySet",
            message = "global text map propagator can only be set once, call ignored"
        );
    }
    installed
}

/// Executes a closure with a reference to the current global [`TextMapPropagator`] propagator.
///
/// Until [`set_text_map_propagator`] succeeds, the closure observes a no-op
/// propagator; readers never block on configuration.
pub fn get_text_map_propagator<T, F>(mut f: F) -> T
where
    F: FnMut(&dyn TextMapPropagator) -> T,
{
    match GLOBAL_TEXT_MAP_PROPAGATOR.get() {
        Some(propagator) => f(&**propagator),
        None => f(default_text_map_propagator() as &dyn TextMapPropagator),
    }
}
