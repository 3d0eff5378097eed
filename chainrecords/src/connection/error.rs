use super::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("RPC endpoint unreachable after {attempts} attempts: {reason}")]
    Unreachable { attempts: u32, reason: String },
    #[error("connected to chain {actual}, expected chain {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },
    /// The connection is down or being re-established. Callers should retry later.
    #[error("RPC connection is currently unavailable")]
    Unavailable,
    #[error("provider error: {0}")]
    Provider(String),
}

impl ConnectionError {
    /// A wrong chain signals misconfiguration, not transience
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectionError::NetworkMismatch { .. })
    }
}

impl From<ProviderError> for ConnectionError {
    fn from(value: ProviderError) -> Self {
        ConnectionError::Provider(value.to_string())
    }
}
