//! Public facade crate for `beyond`.
//!
//! Re-exports the backend-agnostic types/traits from `beyond-core` and the reqwest-backed
//! pipeline from `beyond-local`.

pub use beyond_core::*;
pub use beyond_local::pipeline::{Backends, Beyond};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_exposes_pipeline_and_core_types() {
        let err = Beyond::new(Config::default()).err();
        assert!(matches!(err, Some(Error::NotConfigured(_))));
        assert_eq!(
            Answer::from(Failure::NoSearchResults).content,
            "The search returned no results."
        );
    }
}
