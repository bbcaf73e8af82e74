//! Navigation port and the current location it reads from.

use parking_lot::RwLock;
use tracing::info;

/// Redirect sink injected into the coordinator. The front end implements it
/// with its router; headless callers can use [`TracingNavigator`].
pub trait Navigator: Send + Sync {
    fn go_to(&self, path: &str);
}

/// Navigator that only records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn go_to(&self, path: &str) {
        info!(path, "Redirect requested");
    }
}

/// Current navigation path. The tenant is re-derived from it on demand.
#[derive(Debug)]
pub struct Location {
    path: RwLock<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: RwLock::new(path.into()),
        }
    }

    pub fn current(&self) -> String {
        self.path.read().clone()
    }

    pub fn set(&self, path: impl Into<String>) {
        *self.path.write() = path.into();
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new("/")
    }
}
