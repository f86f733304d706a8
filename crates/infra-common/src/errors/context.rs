use crate::errors::types::Error;
use std::fmt;

/// Context information for an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    /// Add details to the context
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for attaching an [`ErrorContext`] to errors and results
pub trait ErrorExt<T> {
    /// Attach a prepared context
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error>;

    /// Attach a context built from component and operation names
    fn with_context<S: Into<String>, O: Into<String>>(
        self,
        component: S,
        operation: O,
    ) -> std::result::Result<T, Error>;
}

impl<T, E: fmt::Display> ErrorExt<T> for std::result::Result<T, E> {
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error> {
        self.map_err(|e| Error::WithContext {
            message: e.to_string(),
            context: ctx,
        })
    }

    fn with_context<S: Into<String>, O: Into<String>>(
        self,
        component: S,
        operation: O,
    ) -> std::result::Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}
