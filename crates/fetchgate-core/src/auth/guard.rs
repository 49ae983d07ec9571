use tracing::debug;

use super::CredentialStore;

/// Default login entry point for redirects
pub const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
}

/// Result of gating a protected view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate<V> {
    Render(V),
    Redirect(String),
}

/// Decides whether a protected view may render.
///
/// Every decision reads the store afresh; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    login_path: String,
}

impl SessionGuard {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn verdict(&self, store: &CredentialStore) -> Verdict {
        match store.get() {
            Some(_) => Verdict::Allowed,
            None => Verdict::Denied,
        }
    }

    /// Build the protected view only when allowed.
    ///
    /// `render` is not called on denial, so a denied view never starts its
    /// data fetch.
    pub fn admit<V>(&self, store: &CredentialStore, render: impl FnOnce() -> V) -> Gate<V> {
        match self.verdict(store) {
            Verdict::Allowed => Gate::Render(render()),
            Verdict::Denied => {
                debug!(redirect = %self.login_path, "No session token, redirecting");
                Gate::Redirect(self.login_path.clone())
            }
        }
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PATH)
    }
}
