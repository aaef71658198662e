// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tether provisioning server binary.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_provisioning_core::SystemClock;
use tether_server::{create_router, AppState};
use tether_server_provisioning::{
	BundleSettings, ConnectionSettings, ProvisioningService, ServiceSettings,
};
use tether_server_registry::HttpDeviceRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tether server - device provisioning and claim protocol.
#[derive(Parser, Debug)]
#[command(name = "tether-server", about = "Tether device provisioning server", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/tether/server.toml)
	#[arg(long)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("tether-server version: {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => tether_server_config::load_config_with_file(path)?,
		None => tether_server_config::load_config()?,
	};

	init_tracing(&config.logging);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting tether-server"
	);

	let pool = tether_server_db::create_pool(&config.database.url).await?;
	tether_server_db::ensure_schema(&pool).await?;

	let registry = HttpDeviceRegistry::with_timeout(
		&config.registry.base_url,
		config.registry.service_token.clone(),
		Duration::from_secs(config.registry.timeout_secs),
	)?;

	let service = ProvisioningService::new(
		pool,
		Arc::new(registry),
		Arc::new(SystemClock),
		ServiceSettings {
			base_url: config.http.base_url.clone(),
			reserved_operators: config.provisioning.reserved_operators.clone(),
			bundle: BundleSettings {
				bundle_version: config.bundle.bundle_version.clone(),
				connection: ConnectionSettings {
					gateway_host: config.bundle.gateway_host.clone(),
					gateway_port: config.bundle.gateway_port,
					heartbeat_interval_secs: config.bundle.heartbeat_interval_secs,
					tls: config.bundle.tls,
				},
			},
		},
	);

	let app = create_router(AppState {
		service: Arc::new(service),
	});

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr).await?;
	tracing::info!(addr = %addr, "listening");

	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.await?;

	Ok(())
}

fn init_tracing(logging: &tether_server_config::LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());

	if logging.json {
		tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer().json())
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer())
			.init();
	}
}
