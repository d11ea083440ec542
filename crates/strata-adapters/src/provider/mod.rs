//! Provider adapters.
//!
//! - `MemoryCloudFormation`: in-process stack simulator
//! - `StaticSessions`: hands out simulator clients per account and region

mod memory;

pub use memory::{MemoryCloudFormation, ProviderCall, ProviderOp, SimStack};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use strata_core::{
    application::ports::{CloudFormation, SessionProvider},
    error::StrataResult,
};

/// Session provider backed by one simulator. Forced refreshes are counted
/// so tests can observe credential renewal. Clones share the counter.
#[derive(Debug, Default, Clone)]
pub struct StaticSessions {
    provider: MemoryCloudFormation,
    refreshes: Arc<AtomicUsize>,
}

impl StaticSessions {
    pub fn new(provider: MemoryCloudFormation) -> Self {
        Self {
            provider,
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn provider(&self) -> &MemoryCloudFormation {
        &self.provider
    }

    /// Number of forced session refreshes.
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl SessionProvider for StaticSessions {
    fn client(
        &self,
        account: &str,
        region: &str,
        force: bool,
    ) -> StrataResult<Arc<dyn CloudFormation>> {
        if force {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(account, region, refreshes = n, "Session refreshed");
        }
        Ok(Arc::new(self.provider.scoped(account, region)))
    }
}
