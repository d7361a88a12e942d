//! Optional accessors the host application can bind so that writes record who
//! and where a session was last touched from.

use std::sync::Arc;

/// Exposes the authenticated principal for the current request.
pub trait PrincipalProvider: Send + Sync {
    /// Identifier of the authenticated principal, `None` for guests.
    fn id(&self) -> Option<String>;
}

/// Exposes details of the request currently being served.
pub trait RequestContextProvider: Send + Sync {
    /// Client network address.
    fn ip(&self) -> Option<String>;

    /// Header lookup by case-insensitive name.
    fn header(&self, name: &str) -> Option<String>;
}

/// The capabilities bound by the host application. Either accessor may be
/// absent; the handler checks for presence before calling.
#[derive(Clone, Default)]
pub struct AppContext {
    principal: Option<Arc<dyn PrincipalProvider>>,
    request: Option<Arc<dyn RequestContextProvider>>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal: Arc<dyn PrincipalProvider>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_request(mut self, request: Arc<dyn RequestContextProvider>) -> Self {
        self.request = Some(request);
        self
    }

    pub fn principal(&self) -> Option<&dyn PrincipalProvider> {
        self.principal.as_deref()
    }

    pub fn request(&self) -> Option<&dyn RequestContextProvider> {
        self.request.as_deref()
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("principal", &self.principal.is_some())
            .field("request", &self.request.is_some())
            .finish()
    }
}
