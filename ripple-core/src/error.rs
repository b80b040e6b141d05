//! Error types for the reactive core.
//!
//! Only policy violations surface as errors. Panics raised inside user code
//! (derivations, effect bodies, watch callbacks) propagate unchanged to
//! whoever triggered the run.

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A write to a readonly reactive object
    #[error("cannot set `{key}`: target is readonly")]
    ReadonlyWrite { key: String },

    /// A deletion from a readonly reactive object
    #[error("cannot delete `{key}`: target is readonly")]
    ReadonlyDelete { key: String },

    /// A write to a computed value, which is derivation-only
    #[error("computed values cannot be written")]
    ComputedWrite,
}

impl ReactiveError {
    /// Check if the error came from a readonly object.
    pub fn is_readonly_violation(&self) -> bool {
        matches!(
            self,
            ReactiveError::ReadonlyWrite { .. } | ReactiveError::ReadonlyDelete { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_key() {
        let err = ReactiveError::ReadonlyWrite { key: "title".into() };
        assert_eq!(err.to_string(), "cannot set `title`: target is readonly");
        assert!(err.is_readonly_violation());
        assert!(!ReactiveError::ComputedWrite.is_readonly_violation());
    }
}
