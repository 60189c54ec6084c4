use std::sync::Arc;

use deadpool::managed::{Metrics, RecycleError, RecycleResult};

use crate::driver::{DriverError, DriverSession, SessionFactory};

/// Deadpool manager that opens sessions through the driver seam.
pub struct SessionManager {
    factory: Arc<dyn SessionFactory>,
}

impl SessionManager {
    pub(crate) fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl deadpool::managed::Manager for SessionManager {
    type Type = Box<dyn DriverSession>;
    type Error = DriverError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.factory.connect().await
    }

    /// An idle session must answer a ping before it is handed out again;
    /// sessions that went stale between checkouts are discarded, not reused.
    async fn recycle(
        &self,
        session: &mut Self::Type,
        _metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        session.ping().await.map_err(RecycleError::Backend)
    }
}
