use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chainrecords::connection::{Connector, ProviderError};

use super::StubProvider;

/// Hands out the same stub on every connect and counts attempts
#[derive(Clone)]
pub struct StubConnector {
    provider: StubProvider,
    attempts: Arc<AtomicU32>,
}

impl StubConnector {
    pub fn new(provider: StubProvider) -> Self {
        Self {
            provider,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn get_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector<StubProvider> for StubConnector {
    fn connect(&self, _json_rpc_url: &str) -> Result<StubProvider, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        Ok(self.provider.clone())
    }
}
