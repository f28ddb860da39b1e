//! Read model trait for query-side views.

/// A read model providing query access to denormalized data.
///
/// `count` is a best-effort figure for diagnostics and may read 0 while a
/// projection holds its write lock.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn count(&self) -> usize;
}
