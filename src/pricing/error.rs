//! Pricing error taxonomy.

/// Pricing calculation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    /// Unknown ZIP, product reference, order or line.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Caller must correct the input (quantity, distance override, ...).
    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// Hourly rate or base ZIP missing/invalid. Fatal to any pricing run.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// ZIP is known but its service area is missing or inactive.
    #[error("We do not currently service ZIP {zip_code}")]
    Unserviceable { zip_code: String },

    /// Operation not allowed for the order's current state.
    #[error("invalid order state: {message}")]
    InvalidState { message: String },
}

impl PricingError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        PricingError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        PricingError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        PricingError::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        PricingError::InvalidState {
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            PricingError::NotFound { .. } => "not_found",
            PricingError::InvalidInput { field, .. } if field == "install_disclaimer_accepted" => {
                "install_disclaimer_required"
            }
            PricingError::InvalidInput { .. } => "invalid_input",
            PricingError::Configuration { .. } => "configuration_error",
            PricingError::Unserviceable { .. } => "unserviceable",
            PricingError::InvalidState { .. } => "invalid_state",
        }
    }
}
