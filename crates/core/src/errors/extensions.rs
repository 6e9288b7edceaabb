//! Extension traits for error handling

use super::types::{Error, Result};

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(message.into(), e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(f(), e.into()))
    }
}

// Lifecycle errors keep their variant so callers can still match on them
fn wrap(message: String, base: Error) -> Error {
    match base {
        Error::Usage { operation, message: inner } => Error::Usage {
            operation,
            message: format!("{message}: {inner}"),
        },
        Error::Interrupted { .. } => base,
        other => Error::Configuration {
            message: format!("{message}: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_io_errors() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io.context("loading cleaners.json").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("loading cleaners.json"));
    }

    #[test]
    fn test_context_keeps_interrupts() {
        let res: Result<()> = Err(Error::interrupted("drain"));
        let err = res.with_context(|| "releasing pool".to_string()).unwrap_err();
        assert!(err.is_interrupted());
    }
}
