// # Credential Provider Trait
//
// The inventory endpoint wants an opaque authorization value. How it is
// obtained (a configured token, an external helper program, a browser
// session scraped by some other tool) is not the core's business; the
// poller asks a provider once per poll and treats failure as fatal.

use async_trait::async_trait;

/// An opaque authorization value
///
/// The Debug implementation intentionally does NOT expose the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap an authorization value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, to be placed in a request header
    ///
    /// ⚠️ NEVER log this value
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"<REDACTED>").finish()
    }
}

/// Trait for credential provider implementations
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a credential for this poll
    ///
    /// # Returns
    ///
    /// - `Ok(Credential)`: A non-empty credential
    /// - `Err(Error)`: If no credential could be obtained (fatal to the poll)
    async fn credential(&self) -> Result<Credential, crate::Error>;
}

/// Helper trait for constructing credential providers from configuration
pub trait CredentialProviderFactory: Send + Sync {
    /// Create a CredentialProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::CredentialConfig,
    ) -> Result<Box<dyn CredentialProvider>, crate::Error>;
}
