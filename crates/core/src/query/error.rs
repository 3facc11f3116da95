use thiserror::Error;

/// Errors raised while folding or evaluating a predicate expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredicateError {
    #[error("Operator '{op}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: String,
        right: String,
    },
    #[error("Expected a boolean, got {0}")]
    NotBoolean(String),
    #[error("Arithmetic overflow in '{0}'")]
    Overflow(&'static str),
}

/// Result type for predicate operations.
pub type Result<T> = std::result::Result<T, PredicateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display() {
        let error = PredicateError::TypeMismatch {
            op: "lt",
            left: "\"a\"".to_string(),
            right: "1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Operator 'lt' cannot be applied to \"a\" and 1"
        );
    }

    #[test]
    fn test_not_boolean_display() {
        let error = PredicateError::NotBoolean("3".to_string());
        assert_eq!(error.to_string(), "Expected a boolean, got 3");
    }
}
