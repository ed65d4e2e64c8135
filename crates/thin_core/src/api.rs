//! Boundary projections.
//!
//! Entities keep their column storage private to the crate; anything
//! handed to an outside consumer goes through [`ApiRepresentable`], so the
//! stored schema can change without breaking callers.

use serde::Serialize;

/// Types with a stable external representation.
pub trait ApiRepresentable {
    /// Plain attribute bag served to boundary consumers.
    type Api: Serialize;

    /// Builds the external representation.
    fn for_api(&self) -> Self::Api;
}

/// Projects every element of a slice.
pub fn for_api_all<T: ApiRepresentable>(items: &[T]) -> Vec<T::Api> {
    items.iter().map(ApiRepresentable::for_api).collect()
}
