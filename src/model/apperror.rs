use std::fmt;

/**
 * Represents the type of error that can occur within the application.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    Initialization,
    NotFound,
    Validation,
    ConstraintViolation,
    DatabaseError,
    DeliveryFailure,
    Application,
}

/**
 * Represents an error that occurs within the application.
 */
#[derive(Debug, Clone)]
pub struct ApplicationError {
    /**
     * Error type.
     */
    pub error_type: ErrorType,
    /**
     * Error message describing problem.
     */
    pub message: String,
}

impl ApplicationError {
    /**
     * Creates a new ApplicationError.
     *
     * #Arguments
     * `error_type`: The type of error.
     * `message`: A description of the error.
     */
    pub fn new(error_type: ErrorType, message: String) -> Self {
        ApplicationError { error_type, message }
    }

    /**
     * Prefixes the message with the operation that failed, keeping the error type.
     */
    pub fn context(self, operation: &str) -> Self {
        ApplicationError { error_type: self.error_type, message: format!("{operation}: {}", self.message) }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApplicationError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_context_keeps_error_type() {
        let error = ApplicationError::new(ErrorType::NotFound, "City not found".to_string()).context("delete city");
        assert_eq!(error.error_type, ErrorType::NotFound);
        assert_eq!(error.to_string(), "delete city: City not found");
    }
}
