// ── Bearer token sources ──
//
// The manager reads the token once per `connect` call; a refreshed token
// only takes effect on the next connect.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;

/// Supplies the bearer token attached to every stream request.
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` when the user is signed out.
    fn token(&self) -> Option<SecretString>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<SecretString> + Send + Sync,
{
    fn token(&self) -> Option<SecretString> {
        self()
    }
}

/// A token fixed for the life of the provider (CLI, tests).
#[derive(Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

/// Process-wide, lock-free token slot.
///
/// Cloning shares the slot: sign-in code keeps one clone to `set`/`clear`,
/// the manager holds another to read.
#[derive(Clone, Default)]
pub struct TokenStore {
    current: Arc<ArcSwapOption<SecretString>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SecretString) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    pub fn set(&self, token: SecretString) {
        self.current.store(Some(Arc::new(token)));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn is_set(&self) -> bool {
        self.current.load().is_some()
    }
}

impl TokenProvider for TokenStore {
    fn token(&self) -> Option<SecretString> {
        self.current.load_full().map(|t| (*t).clone())
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("is_set", &self.is_set())
            .finish()
    }
}
