use thiserror::Error;

/// Catalog rule violations, independent of storage and transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{entity} does not exist")]
    NotFound { entity: &'static str },
    #[error("invalid catalog data: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity_or_problem() {
        assert_eq!(
            DomainError::not_found("destination").to_string(),
            "destination does not exist"
        );
        assert_eq!(
            DomainError::validation("currency must be a 3-letter ISO code").to_string(),
            "invalid catalog data: currency must be a 3-letter ISO code"
        );
    }
}
