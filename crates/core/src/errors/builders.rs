//! Builder methods for creating errors with context

use super::types::Error;
use std::path::PathBuf;
use std::time::Duration;

impl Error {
    /// Create a usage error for an operation invoked out of lifecycle order
    #[must_use]
    pub fn usage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Usage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a cleanup timeout error
    #[must_use]
    pub fn cleanup_timeout(resource: impl Into<String>, timeout: Duration) -> Self {
        Error::CleanupTimeout {
            resource: resource.into(),
            timeout,
        }
    }

    /// Create a task failure error
    #[must_use]
    pub fn task_failure(task: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TaskFailure {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create an interrupted error
    #[must_use]
    pub fn interrupted(operation: impl Into<String>) -> Self {
        Error::Interrupted {
            operation: operation.into(),
        }
    }

    /// Create a rejected-work error
    #[must_use]
    pub fn rejected(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Rejected {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }
}
