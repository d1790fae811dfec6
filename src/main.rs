use std::sync::Arc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use vault_proxy::{
    config::Config,
    cryptor::PassthroughCryptor,
    http_server::{self, GatewayState},
    logging,
    shutdown::ShutdownCoordinator,
    verification::{
        BlockingPoolExecutor, LoggingWarningHandler, SystemClock, VerificationScheduler,
    },
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logging::init(&config.log_level, config.app_log_dir.as_deref())?;

    info!(
        "Starting vault-proxy {} (built {})",
        env!("BUILD_VERSION"),
        env!("BUILD_TIMESTAMP")
    );

    if !config.vault_root.is_dir() {
        warn!(
            "Vault root {:?} does not exist or is not a directory",
            config.vault_root
        );
    }

    // Real vault formats plug in their own Cryptor implementation here.
    let cryptor = Arc::new(PassthroughCryptor);
    let scheduler = Arc::new(VerificationScheduler::with_window(
        cryptor.clone(),
        Arc::new(BlockingPoolExecutor::current()),
        Arc::new(LoggingWarningHandler),
        config.verification_window,
        Arc::new(SystemClock),
    ));

    let state = Arc::new(GatewayState {
        vault_root: config.vault_root.clone(),
        cryptor,
        scheduler: Arc::clone(&scheduler),
    });

    let coordinator = ShutdownCoordinator::new();

    // Periodic sweep keeps the verification cache from accumulating dead
    // entries between requests.
    let mut sweep_shutdown = coordinator.subscribe();
    let sweep_interval = config.eviction_interval;
    let sweep_scheduler = Arc::clone(&scheduler);
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_scheduler.evict_expired();
                    debug!(
                        entries = sweep_scheduler.scheduled_count(),
                        "Swept expired verification cache entries"
                    );
                }
                _ = sweep_shutdown.wait_for_shutdown() => break,
            }
        }
    });

    let addr = config.socket_addr()?;
    let server = tokio::spawn(http_server::run(addr, state, coordinator.subscribe()));

    coordinator.listen_for_signals().await?;

    match server.await {
        Ok(result) => result?,
        Err(e) => error!("Gateway task failed: {}", e),
    }

    info!("vault-proxy shut down");
    Ok(())
}
