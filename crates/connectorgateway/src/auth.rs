// Token provider contract and credential backends
//
// The ARM pipeline calls the provider at the moment it needs a token and
// never caches one, so rotated credentials are picked up automatically.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use azure_core::credentials::TokenCredential;
use azure_identity::{AzureCliCredential, DeveloperToolsCredential};
use thiserror::Error;

/// Scope requested for every management-plane token
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Raw-token credential backend reads this variable on every acquire
pub const RAW_TOKEN_ENV: &str = "ARM_MCP_AUTH_TOKEN";

#[derive(Error, Debug)]
pub enum AuthError {
	#[error("environment variable {0} is not set or empty")]
	MissingEnvToken(&'static str),

	#[error("failed to construct credential: {0}")]
	CredentialSetup(String),

	#[error("failed to acquire token: {0}")]
	Acquire(String),
}

/// Contract the ARM pipeline sees; backed by any of the credential modes.
#[async_trait]
pub trait TokenProvider: Send + Sync + fmt::Debug {
	async fn acquire(&self) -> Result<String, AuthError>;
}

/// Raw bearer token from the environment. Re-read per acquire so an
/// operator can rotate it without restarting the server.
#[derive(Debug, Default)]
pub struct EnvTokenProvider;

#[async_trait]
impl TokenProvider for EnvTokenProvider {
	async fn acquire(&self) -> Result<String, AuthError> {
		match std::env::var(RAW_TOKEN_ENV) {
			Ok(token) if !token.trim().is_empty() => Ok(token),
			_ => Err(AuthError::MissingEnvToken(RAW_TOKEN_ENV)),
		}
	}
}

/// Tokens from the locally cached `az` CLI login
pub struct AzureCliTokenProvider {
	credential: Arc<AzureCliCredential>,
}

impl AzureCliTokenProvider {
	pub fn new() -> Result<Self, AuthError> {
		let credential = AzureCliCredential::new(None)
			.map_err(|e| AuthError::CredentialSetup(e.to_string()))?;
		Ok(Self { credential })
	}
}

impl fmt::Debug for AzureCliTokenProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AzureCliTokenProvider").finish_non_exhaustive()
	}
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
	async fn acquire(&self) -> Result<String, AuthError> {
		let token = self
			.credential
			.get_token(&[ARM_SCOPE], None)
			.await
			.map_err(|e| AuthError::Acquire(e.to_string()))?;
		Ok(token.token.secret().to_string())
	}
}

/// Ambient default-credential chain (managed identity, workload identity,
/// environment). Selected automatically in Codespaces-style environments.
pub struct DefaultChainTokenProvider {
	credential: Arc<DeveloperToolsCredential>,
}

impl DefaultChainTokenProvider {
	pub fn new() -> Result<Self, AuthError> {
		let credential = DeveloperToolsCredential::new(None)
			.map_err(|e| AuthError::CredentialSetup(e.to_string()))?;
		Ok(Self { credential })
	}
}

impl fmt::Debug for DefaultChainTokenProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DefaultChainTokenProvider").finish_non_exhaustive()
	}
}

#[async_trait]
impl TokenProvider for DefaultChainTokenProvider {
	async fn acquire(&self) -> Result<String, AuthError> {
		let token = self
			.credential
			.get_token(&[ARM_SCOPE], None)
			.await
			.map_err(|e| AuthError::Acquire(e.to_string()))?;
		Ok(token.token.secret().to_string())
	}
}

/// Fixed token, used by tests
#[derive(Debug, Clone)]
pub struct StaticTokenProvider(pub String);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
	async fn acquire(&self) -> Result<String, AuthError> {
		Ok(self.0.clone())
	}
}
