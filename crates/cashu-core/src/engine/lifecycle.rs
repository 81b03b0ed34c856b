//! Startup, background maintenance and shutdown.

use super::{CashuGateway, EngineError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

impl CashuGateway {
	/// Performs any initialization required before serving.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			trusted_mint = %self.config.gateway.trusted_mint,
			enabled = self.config.gateway.enabled,
			"Initializing gateway"
		);
		Ok(())
	}

	/// Periodically drops expired storage entries until `cancel` fires.
	pub async fn run_storage_cleanup(&self, cancel: CancellationToken) {
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds.max(1));
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = interval.tick() => {
					match self.storage.cleanup_expired().await {
						Ok(0) => {},
						Ok(removed) => tracing::debug!(removed, "Removed expired storage entries"),
						Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
					}
				}
			}
		}
		tracing::debug!("Storage cleanup stopped");
	}

	/// Performs cleanup operations.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down gateway");
		self.storage
			.cleanup_expired()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		Ok(())
	}
}
