// ARM request pipeline
//
// Single chokepoint for every management-plane call: URL and api-version
// assembly, bearer + correlation headers, per-attempt timeout, retry on
// transient failures, and shaping of the ARM error envelope.

pub mod api;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{AuthError, TokenProvider};

pub use api::{ConnectionInfo, ConnectionStatus};

pub const ARM_BASE_URL: &str = "https://management.azure.com";
pub const DEFAULT_API_VERSION: &str = "2016-06-01";
pub const CONSENT_LINK_API_VERSION: &str = "2018-07-01-preview";

/// Per-attempt client timeout
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// One initial attempt plus up to three retries
const MAX_ATTEMPTS: u32 = 4;

/// Process-wide ARM coordinates
#[derive(Debug, Clone)]
pub struct ArmContext {
	pub subscription_id: String,
	pub resource_group: String,
	pub location: String,
}

#[derive(Error, Debug)]
pub enum ArmError {
	/// Shaped from the ARM error envelope `{ error: { code, message } }`
	#[error("{code}: {message} (status {status})")]
	Api { code: String, message: String, status: u16 },

	#[error("transport failure after {attempts} attempts: {message}")]
	Transport { attempts: u32, message: String },

	#[error("failed to decode ARM response body: {0}")]
	Decode(#[from] serde_json::Error),

	#[error(transparent)]
	Auth(#[from] AuthError),
}

impl ArmError {
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Client for the ARM control plane. Cheap to clone; holds no token state.
#[derive(Debug, Clone)]
pub struct ArmClient {
	http: reqwest::Client,
	base_url: String,
	context: ArmContext,
	tokens: Arc<dyn TokenProvider>,
	user_agent: Option<String>,
}

impl ArmClient {
	pub fn new(context: ArmContext, tokens: Arc<dyn TokenProvider>) -> anyhow::Result<Self> {
		let http = reqwest::Client::builder().timeout(ATTEMPT_TIMEOUT).build()?;
		Ok(Self {
			http,
			base_url: ARM_BASE_URL.to_string(),
			context,
			tokens,
			user_agent: None,
		})
	}

	/// Point the client at a different base URL (tests use a mock ARM)
	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}

	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	pub fn context(&self) -> &ArmContext {
		&self.context
	}

	/// Start a request against an ARM path (absolute, starting with `/`)
	pub fn request(&self, method: reqwest::Method, path: impl Into<String>) -> ArmRequest<'_> {
		ArmRequest {
			client: self,
			method,
			path: path.into(),
			api_version: DEFAULT_API_VERSION,
			query: Vec::new(),
			body: None,
		}
	}

	async fn execute(
		&self,
		method: reqwest::Method,
		path: &str,
		api_version: &str,
		query: &[(String, String)],
		body: Option<&Value>,
	) -> Result<Value, ArmError> {
		let url = format!("{}{}", self.base_url, path);
		// One correlation id per top-level call; retries reuse it so
		// ARM-side traces aggregate cleanly.
		let correlation_id = Uuid::new_v4().to_string();

		let mut attempt = 0;
		loop {
			// Acquired per attempt: a retry that crosses a token expiry
			// boundary silently picks up a fresh one.
			let token = self.tokens.acquire().await?;

			let mut builder = self
				.http
				.request(method.clone(), &url)
				.query(&[("api-version", api_version)])
				.bearer_auth(&token)
				.header("Content-Type", "application/json")
				.header("x-ms-correlation-request-id", &correlation_id);
			if !query.is_empty() {
				builder = builder.query(query);
			}
			if let Some(user_agent) = &self.user_agent {
				builder = builder.header("User-Agent", user_agent);
			}
			if let Some(body) = body
				&& (method == reqwest::Method::POST || method == reqwest::Method::PUT)
			{
				builder = builder.json(body);
			}

			let outcome = builder.send().await;
			attempt += 1;

			match outcome {
				Ok(response) => {
					let status = response.status();
					if status.is_success() {
						let text = response.text().await.map_err(|e| ArmError::Transport {
							attempts: attempt,
							message: e.to_string(),
						})?;
						if text.trim().is_empty() {
							return Ok(json!({}));
						}
						return Ok(serde_json::from_str(&text)?);
					}

					let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
					if retryable && attempt < MAX_ATTEMPTS {
						let delay = retry_delay(retry_after_seconds(&response), attempt - 1);
						warn!(
							target: "arm",
							%status,
							attempt,
							delay_ms = delay.as_millis() as u64,
							correlation_id = %correlation_id,
							"transient ARM failure, retrying"
						);
						tokio::time::sleep(delay).await;
						continue;
					}

					let text = response.text().await.unwrap_or_default();
					return Err(shape_error(status.as_u16(), &text));
				},
				Err(e) => {
					if attempt < MAX_ATTEMPTS {
						let delay = retry_delay(None, attempt - 1);
						warn!(
							target: "arm",
							error = %e,
							attempt,
							correlation_id = %correlation_id,
							"transport failure, retrying"
						);
						tokio::time::sleep(delay).await;
						continue;
					}
					return Err(ArmError::Transport { attempts: attempt, message: e.to_string() });
				},
			}
		}
	}
}

/// In-flight request builder
pub struct ArmRequest<'a> {
	client: &'a ArmClient,
	method: reqwest::Method,
	path: String,
	api_version: &'static str,
	query: Vec<(String, String)>,
	body: Option<Value>,
}

impl ArmRequest<'_> {
	pub fn api_version(mut self, api_version: &'static str) -> Self {
		self.api_version = api_version;
		self
	}

	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));
		self
	}

	/// Body is only sent for PUT and POST; other methods ignore it
	pub fn body(mut self, body: Value) -> Self {
		self.body = Some(body);
		self
	}

	pub async fn send(self) -> Result<Value, ArmError> {
		debug!(
			target: "arm",
			method = %self.method,
			path = %self.path,
			"ARM request"
		);
		self
			.client
			.execute(
				self.method.clone(),
				&self.path,
				self.api_version,
				&self.query,
				self.body.as_ref(),
			)
			.await
	}
}

/// `Retry-After` wins when present and parseable; otherwise exponential
/// backoff with uniform jitter in [0, 1) seconds.
fn retry_delay(retry_after: Option<u64>, failed_attempt: u32) -> Duration {
	match retry_after {
		Some(seconds) => Duration::from_secs(seconds),
		None => {
			let base = 2f64.powi(failed_attempt as i32);
			Duration::from_secs_f64(base + rand::random::<f64>())
		},
	}
}

fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
	response
		.headers()
		.get("Retry-After")?
		.to_str()
		.ok()?
		.trim()
		.parse()
		.ok()
}

/// Parse the ARM error envelope, falling back to a generic shape when the
/// body is not the expected JSON.
fn shape_error(status: u16, body: &str) -> ArmError {
	let parsed: Option<(String, String)> = serde_json::from_str::<Value>(body)
		.ok()
		.as_ref()
		.and_then(|v| v.get("error"))
		.and_then(|e| {
			let code = e.get("code")?.as_str()?.to_string();
			let message = e.get("message")?.as_str()?.to_string();
			Some((code, message))
		});

	match parsed {
		Some((code, message)) => ArmError::Api { code, message, status },
		None => ArmError::Api {
			code: "UnknownError".to_string(),
			message: format!("ARM request failed with status {status}"),
			status,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_shape_error_envelope() {
		let err = shape_error(400, r#"{"error":{"code":"InvalidParameter","message":"bad"}}"#);
		let ArmError::Api { code, message, status } = err else {
			panic!("expected Api error");
		};
		assert_eq!(code, "InvalidParameter");
		assert_eq!(message, "bad");
		assert_eq!(status, 400);
	}

	#[test]
	fn test_shape_error_fallback() {
		let err = shape_error(502, "<html>bad gateway</html>");
		let ArmError::Api { code, message, status } = err else {
			panic!("expected Api error");
		};
		assert_eq!(code, "UnknownError");
		assert_eq!(message, "ARM request failed with status 502");
		assert_eq!(status, 502);
	}

	#[test]
	fn test_retry_delay_prefers_retry_after() {
		assert_eq!(retry_delay(Some(7), 0), Duration::from_secs(7));
	}

	#[test]
	fn test_retry_delay_backoff_bounds() {
		for (failed_attempt, base) in [(0u32, 1f64), (1, 2.0), (2, 4.0)] {
			let delay = retry_delay(None, failed_attempt).as_secs_f64();
			assert!(delay >= base && delay < base + 1.0, "delay {delay} out of range");
		}
	}
}
