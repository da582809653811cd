//! Actor Error Types
//!
//! Failures raised by message handlers, lifecycle hooks and the stage itself.

use crate::address::Address;
use std::sync::Arc;
use thiserror::Error;

/// Main actor runtime error type
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    /// A handler or hook reported a failure
    #[error("Actor failure: {message}")]
    Failure {
        message: String,
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// A handler or hook panicked
    #[error("Actor panicked: {message}")]
    Panicked { message: String },

    /// Another live actor already owns the address
    #[error("Address already registered: {address}")]
    AddressAlreadyRegistered { address: Address },

    /// The id lies in the range reserved for well-known actors
    #[error("Address id {id} is reserved")]
    ReservedAddress { id: u64 },

    /// No actor is registered at the address
    #[error("Actor not found: {address}")]
    NotFound { address: Address },

    /// The actor was stopped before the request could be served
    #[error("Actor stopped: {address}")]
    Stopped { address: Address },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The completing side of a result channel was dropped without a value
    #[error("Result abandoned: {operation}")]
    Abandoned { operation: String },

    /// The dispatcher no longer accepts work
    #[error("Dispatcher closed: {name}")]
    DispatcherClosed { name: String },
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

/// Outcome of a message handler or lifecycle hook
pub type ActorResult = Result<()>;

impl ActorError {
    /// Create a failure error
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            source: None,
        }
    }

    /// Create a failure error with source
    pub fn failure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failure {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a panic error from a caught panic payload
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }

    /// Create an address collision error
    pub fn already_registered(address: &Address) -> Self {
        Self::AddressAlreadyRegistered {
            address: address.clone(),
        }
    }

    /// Create a reserved address error
    pub fn reserved(id: u64) -> Self {
        Self::ReservedAddress { id }
    }

    /// Create a not found error
    pub fn not_found(address: &Address) -> Self {
        Self::NotFound {
            address: address.clone(),
        }
    }

    /// Create a stopped error
    pub fn stopped(address: &Address) -> Self {
        Self::Stopped {
            address: address.clone(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an abandoned result error
    pub fn abandoned(operation: impl Into<String>) -> Self {
        Self::Abandoned {
            operation: operation.into(),
        }
    }

    /// Create a dispatcher closed error
    pub fn dispatcher_closed(name: impl Into<String>) -> Self {
        Self::DispatcherClosed { name: name.into() }
    }

    /// Check if the error was raised by user code during delivery
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, ActorError::Failure { .. } | ActorError::Panicked { .. })
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::Failure { .. } => "failure",
            ActorError::Panicked { .. } => "panicked",
            ActorError::AddressAlreadyRegistered { .. } => "address_already_registered",
            ActorError::ReservedAddress { .. } => "reserved_address",
            ActorError::NotFound { .. } => "not_found",
            ActorError::Stopped { .. } => "stopped",
            ActorError::Configuration { .. } => "configuration",
            ActorError::Timeout { .. } => "timeout",
            ActorError::Abandoned { .. } => "abandoned",
            ActorError::DispatcherClosed { .. } => "dispatcher_closed",
        }
    }
}
