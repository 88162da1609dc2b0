use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    Decode {
        address: String,
        reason: String,
    },
    Query {
        operation: String,
        reason: String,
    },
    Parse {
        field: String,
        value: String,
        reason: String,
    },
    InvalidConfig {
        reason: String,
    },
}

impl ReportError {
    pub(crate) fn query(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        ReportError::Query {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Decode { address, reason } => {
                write!(f, "decode address {} failed: {}", address, reason)
            }
            ReportError::Query { operation, reason } => {
                write!(f, "query {} failed: {}", operation, reason)
            }
            ReportError::Parse {
                field,
                value,
                reason,
            } => write!(f, "parse {} from {:?} failed: {}", field, value, reason),
            ReportError::InvalidConfig { reason } => write!(f, "invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ReportError {}
