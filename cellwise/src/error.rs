//! Typed errors.

use crate::common::*;

/// A name that does not match any known variant of an option.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {kind} '{name}', expect one of: {}", .expected.join(", "))]
pub struct UnsupportedKind {
    pub kind: &'static str,
    pub name: String,
    pub expected: Vec<&'static str>,
}

impl UnsupportedKind {
    pub fn new(kind: &'static str, name: &str, expected: &[&'static str]) -> Self {
        Self {
            kind,
            name: name.to_string(),
            expected: expected.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_kind_message() {
        let err = UnsupportedKind::new("loss", "Hinge", &["Bce", "Focal"]);
        assert_eq!(err.to_string(), "unsupported loss 'Hinge', expect one of: Bce, Focal");

        let err: Error = err.into();
        assert!(err.downcast_ref::<UnsupportedKind>().is_some());
    }
}
