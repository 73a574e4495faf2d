use procshim_shared::errors::{ShimError, ShimResult};
use std::fmt;

/// Caller-assigned identifier of one supervised process.
///
/// Used verbatim as the process directory name, so it must be a single
/// path component.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> ShimResult<Self> {
        let id = id.into();
        if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\0') {
            return Err(ShimError::Setup(format!("invalid process id {:?}", id)));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProcessId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ProcessId {
    type Error = ShimError;

    fn try_from(value: &str) -> ShimResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for ProcessId {
    type Error = ShimError;

    fn try_from(value: String) -> ShimResult<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in ["abc", "0f3e-11", "proc.1"] {
            assert_eq!(ProcessId::new(id).unwrap().as_str(), id);
        }
    }

    #[test]
    fn test_rejects_path_like_ids() {
        for id in ["", ".", "..", "a/b", "/abs"] {
            let err = ProcessId::new(id).unwrap_err();
            assert!(matches!(err, ShimError::Setup(_)), "id {:?}", id);
        }
    }
}
