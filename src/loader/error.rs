//! Loader Errors
//!
//! Every failure a module or task can observe is a `LoadError`. Errors are
//! cloned as they propagate so each dependent receives the original payload.

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that can occur while bootstrapping or resolving modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The entry-point declaration did not match `dir/.../name.js`.
    InvalidEntryPoint(String),
    /// No script on the page declared an entry point.
    MissingEntryPoint,
    /// The transport could not load the script for a module.
    FetchFailed {
        name: String,
        path: String,
        reason: String,
    },
    /// The factory returned an error.
    FactoryFailed { name: String, message: String },
    /// The factory ran but produced no export.
    NoExport(String),
    /// The module is already evaluating or has produced its export.
    AlreadyDefined(String),
    /// The loader went away before a pending request resolved.
    LoaderDropped,
}

impl LoadError {
    /// Name of the module the error originated from, if any.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            LoadError::FetchFailed { name, .. } | LoadError::FactoryFailed { name, .. } => {
                Some(name)
            }
            LoadError::NoExport(name) | LoadError::AlreadyDefined(name) => Some(name),
            LoadError::InvalidEntryPoint(_)
            | LoadError::MissingEntryPoint
            | LoadError::LoaderDropped => None,
        }
    }

    /// Bootstrap errors are fatal: the loader refuses to start.
    pub fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            LoadError::InvalidEntryPoint(_) | LoadError::MissingEntryPoint
        )
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::InvalidEntryPoint(value) => {
                write!(f, "The entry point '{}' is not a valid script path", value)
            }
            LoadError::MissingEntryPoint => write!(f, "No script declares an entry point"),
            LoadError::FetchFailed { name, path, reason } => {
                write!(f, "Failed to fetch module '{}' from '{}': {}", name, path, reason)
            }
            LoadError::FactoryFailed { name, message } => {
                write!(f, "Factory of module '{}' failed: {}", name, message)
            }
            LoadError::NoExport(name) => {
                write!(f, "Module '{}' must produce a value", name)
            }
            LoadError::AlreadyDefined(name) => {
                write!(f, "Module '{}' is already defined", name)
            }
            LoadError::LoaderDropped => {
                write!(f, "The loader was dropped before the request resolved")
            }
        }
    }
}

impl std::error::Error for LoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display() {
        let err = LoadError::FetchFailed {
            name: "util".to_string(),
            path: "lib/util.js".to_string(),
            reason: "404".to_string(),
        };
        assert!(err.to_string().contains("lib/util.js"));
        assert!(err.to_string().contains("404"));

        let err = LoadError::NoExport("app".to_string());
        assert_eq!(err.to_string(), "Module 'app' must produce a value");

        let err = LoadError::InvalidEntryPoint("???".to_string());
        assert!(err.to_string().contains("???"));
    }

    #[test]
    fn test_module_name() {
        let err = LoadError::FactoryFailed {
            name: "a".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.module_name(), Some("a"));
        assert_eq!(LoadError::MissingEntryPoint.module_name(), None);
    }

    #[test]
    fn test_bootstrap_classification() {
        assert!(LoadError::MissingEntryPoint.is_bootstrap());
        assert!(LoadError::InvalidEntryPoint(String::new()).is_bootstrap());
        assert!(!LoadError::NoExport("x".to_string()).is_bootstrap());
    }
}
