// CLI surface and credential-mode selection

use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::arm::ArmContext;
use crate::auth::{
	AuthError, AzureCliTokenProvider, DefaultChainTokenProvider, EnvTokenProvider, RAW_TOKEN_ENV,
	TokenProvider,
};

/// Environment probe indicating a Codespaces-style ambient-credential host
const CODESPACES_ENV: &str = "CODESPACES";

#[derive(Parser, Debug)]
#[command(
	name = "connectorgateway",
	about = "MCP server exposing Azure API Connections as typed tools"
)]
pub struct Args {
	/// Azure subscription id
	#[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
	pub subscription_id: String,

	/// Resource group holding the API connections
	#[arg(long, env = "AZURE_RESOURCE_GROUP")]
	pub resource_group: String,

	/// Azure location of the managed APIs
	#[arg(long, env = "AZURE_LOCATION", default_value = "eastus")]
	pub location: String,

	/// Credential backend; auto probes the environment
	#[arg(long, value_enum, default_value = "auto")]
	pub auth: AuthMode,

	/// Optional User-Agent suffix for ARM calls
	#[arg(long)]
	pub user_agent: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
	/// Raw token env var if set, default chain in Codespaces, else az CLI
	Auto,
	/// Raw bearer token from ARM_MCP_AUTH_TOKEN
	Env,
	/// Cached az CLI credentials
	Cli,
	/// Ambient default-credential chain
	DefaultChain,
}

impl Args {
	pub fn arm_context(&self) -> ArmContext {
		ArmContext {
			subscription_id: self.subscription_id.clone(),
			resource_group: self.resource_group.clone(),
			location: self.location.clone(),
		}
	}

	pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>, AuthError> {
		match self.resolved_auth_mode() {
			AuthMode::Env => Ok(Arc::new(EnvTokenProvider)),
			AuthMode::Cli => Ok(Arc::new(AzureCliTokenProvider::new()?)),
			AuthMode::DefaultChain => Ok(Arc::new(DefaultChainTokenProvider::new()?)),
			// resolved_auth_mode never returns Auto
			AuthMode::Auto => Ok(Arc::new(EnvTokenProvider)),
		}
	}

	fn resolved_auth_mode(&self) -> AuthMode {
		if self.auth != AuthMode::Auto {
			return self.auth;
		}
		if env_is_set(RAW_TOKEN_ENV) {
			AuthMode::Env
		} else if env_is_set(CODESPACES_ENV) {
			AuthMode::DefaultChain
		} else {
			AuthMode::Cli
		}
	}
}

fn env_is_set(name: &str) -> bool {
	std::env::var(name).is_ok_and(|v| !v.trim().is_empty())
}
