use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

use connectorgateway::config::Args;
use connectorgateway::{ArmClient, ConnectorGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	// stdout carries the MCP transport; every log line goes to stderr
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();

	let args = Args::parse();
	let tokens = args.token_provider()?;
	let mut arm = ArmClient::new(args.arm_context(), tokens)?;
	if let Some(user_agent) = &args.user_agent {
		arm = arm.with_user_agent(user_agent.clone());
	}

	let gateway = ConnectorGateway::new(arm);
	let summary = gateway.startup_scan().await;
	info!(target: "dynamic_tools", %summary, "startup scan complete");

	let service = gateway.serve(stdio()).await?;
	service.waiting().await?;
	Ok(())
}
