use std::fmt::Write;

/// Errors returned by the dezr engine.
#[derive(thiserror::Error, Debug)]
pub enum DezrError {
    /// Value could not be built from the given data
    #[error("Construction error: {0}")]
    ConstructionError(Box<str>),
    /// Invalid shapes for operation
    #[error("Shape error: {0}")]
    ShapeError(Box<str>),
    /// Operation was applied to a placeholder that has no payload yet
    #[error("{op} can not run on a value without payload")]
    MissingPayload {
        /// Name of the operation
        op: &'static str,
    },
    /// Backward returned a different number of gradients than there are inputs
    #[error("{op} backward returned {found} gradients, but it has {expected} inputs")]
    GradientArity {
        /// Name of the operation
        op: &'static str,
        /// Number of inputs
        expected: usize,
        /// Number of returned gradients
        found: usize,
    },
}

impl DezrError {
    /// Shape error
    #[track_caller]
    pub fn shape_error(e: impl Into<String>) -> Self {
        Self::ShapeError(with_location(e.into()))
    }

    /// Construction error
    #[track_caller]
    pub fn construction_error(e: impl Into<String>) -> Self {
        Self::ConstructionError(with_location(e.into()))
    }
}

#[track_caller]
fn with_location(mut e: String) -> Box<str> {
    let location = std::panic::Location::caller();
    // Writing into a String never fails
    let _ = write!(e, ", {}:{}:{}", location.file(), location.line(), location.column());
    e.into()
}

#[cfg(test)]
mod tests {
    use super::DezrError;

    #[test]
    fn shape_error_carries_message_and_location() {
        let e = DezrError::shape_error("cannot broadcast [2, 3] to [3]");
        let msg = e.to_string();
        assert!(msg.starts_with("Shape error: cannot broadcast [2, 3] to [3]"));
        assert!(msg.contains("error.rs"));
    }
}
