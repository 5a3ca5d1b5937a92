//! `AttributeResolver` contract (spec §4.7, §6): the only way the
//! predicate evaluator looks at an event. Indexing attribute paths into
//! the event tree (`ObjectAttributeMapper` in the spec's own terms) is
//! explicitly an outer concern (spec §1); this crate only depends on the
//! trait below.

use crate::value::Value;

/// An RAII guard releasing a quantifier frame binding when dropped,
/// guaranteeing frames are popped on every body-evaluation exit path
/// including errors (spec §5 "Scoped resources").
pub trait FrameGuard {}

/// Supplies attribute values for one event to the evaluator.
///
/// `resolve` never panics: a missing path yields [`Value::Undefined`], an
/// explicit JSON/YAML null yields [`Value::Null`].
pub trait AttributeResolver {
    /// Resolves a dotted attribute path against the current frame (the
    /// innermost active quantifier binder, if any, shadows the event root).
    fn resolve(&self, path: &str) -> Value;

    /// Length of the array at `path`, or `None` if it is missing, null, or
    /// not an array.
    fn array_len(&self, path: &str) -> Option<usize>;

    /// Iterates `(index, element)` pairs of the array at `path`; an empty
    /// iterator for a missing/non-array path.
    fn iter(&self, path: &str) -> Box<dyn Iterator<Item = (usize, Value)> + '_>;

    /// Pushes a quantifier frame binding `binder` to `element` for the
    /// duration of the returned guard.
    fn frame_scope<'a>(&'a self, binder: &str, element: Value) -> Box<dyn FrameGuard + 'a>;
}
