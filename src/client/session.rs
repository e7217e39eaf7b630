use std::future::Future;

use parking_lot::{Mutex, RwLock};

use crate::error::EngineError;

/// Bearer credentials supplied by the host application's session layer.
///
/// The engine never stores tokens globally; a context is constructed by the
/// caller and passed in, so tests can swap in their own.
pub trait SessionContext: Send + Sync {
    fn access_token(&self) -> Option<String>;

    /// Obtains a fresh token after a `401`. Called at most once per request.
    fn refresh(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Fixed token, with an optional single replacement handed out on refresh.
#[derive(Debug, Default)]
pub struct StaticSession {
    token: RwLock<Option<String>>,
    replacement: Mutex<Option<String>>,
}

impl StaticSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            replacement: Mutex::new(None),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_refresh_token(self, token: impl Into<String>) -> Self {
        *self.replacement.lock() = Some(token.into());
        self
    }
}

impl SessionContext for StaticSession {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    async fn refresh(&self) -> Result<(), EngineError> {
        let next = self.replacement.lock().take();
        match next {
            Some(token) => {
                *self.token.write() = Some(token);
                Ok(())
            }
            None => Err(EngineError::SessionExpired),
        }
    }
}
