//! Integrity Verification Module
//!
//! Background, at-most-once-per-resource authenticity checks, deduplicated
//! via an expiring cache keyed by resource identity.
//!
//! Concurrent requests for the same never-seen resource must not schedule
//! duplicate jobs, so check-and-insert is atomic: the scheduler goes through
//! the `DashMap` entry API, and the scheduling instant is recorded *before*
//! the job is handed to the executor. Entries expire a fixed window after
//! insertion regardless of job completion, which bounds verification cost
//! under request floods while still re-checking periodically.
//!
//! Job execution happens on the injected executor, outside any lock, and is
//! best-effort: interruption exits quietly, other I/O failures are logged
//! and the job ends without retry. Verification never affects the in-flight
//! content request; an authentication failure only reaches the injected
//! warning handler.

use crate::cryptor::Cryptor;
use crate::resource::ResourceLocator;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Entries expire this long after insertion, allowing re-verification.
pub const DEFAULT_VERIFICATION_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Time source, injectable so expiry is deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`] used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A unit of background work handed to the executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Submission contract of the background worker pool. Submit-and-forget:
/// completion is unobservable to the request path by design.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, job: Job);
}

/// [`TaskExecutor`] backed by tokio's blocking thread pool.
pub struct BlockingPoolExecutor {
    handle: tokio::runtime::Handle,
}

impl BlockingPoolExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor for the runtime of the calling context.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskExecutor for BlockingPoolExecutor {
    fn submit(&self, job: Job) {
        self.handle.spawn_blocking(job);
    }
}

/// Receives authentication failures discovered by background verification.
pub trait IntegrityWarningHandler: Send + Sync {
    /// Called with the logical path of a resource whose stored ciphertext
    /// failed its authenticity check.
    fn authentication_failed(&self, resource_path: &str);
}

/// Default handler: logs a warning and nothing else.
#[derive(Debug, Default)]
pub struct LoggingWarningHandler;

impl IntegrityWarningHandler for LoggingWarningHandler {
    fn authentication_failed(&self, resource_path: &str) {
        warn!(
            resource = resource_path,
            "Stored ciphertext failed its authenticity check"
        );
    }
}

/// Deduplicating scheduler for background integrity verification.
pub struct VerificationScheduler {
    /// Scheduling instants keyed by resource identity.
    scheduled: DashMap<ResourceLocator, Instant>,
    window: Duration,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn TaskExecutor>,
    cryptor: Arc<dyn Cryptor>,
    warning_handler: Arc<dyn IntegrityWarningHandler>,
}

impl VerificationScheduler {
    /// Scheduler with the default 10-minute window and the system clock.
    pub fn new(
        cryptor: Arc<dyn Cryptor>,
        executor: Arc<dyn TaskExecutor>,
        warning_handler: Arc<dyn IntegrityWarningHandler>,
    ) -> Self {
        Self::with_window(
            cryptor,
            executor,
            warning_handler,
            DEFAULT_VERIFICATION_WINDOW,
            Arc::new(SystemClock),
        )
    }

    pub fn with_window(
        cryptor: Arc<dyn Cryptor>,
        executor: Arc<dyn TaskExecutor>,
        warning_handler: Arc<dyn IntegrityWarningHandler>,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduled: DashMap::new(),
            window,
            clock,
            executor,
            cryptor,
            warning_handler,
        }
    }

    /// Idempotently ensure a verification job is scheduled for `locator`.
    ///
    /// A live cache entry (inserted within the expiry window) means another
    /// verification is already scheduled or recently ran, and this call does
    /// nothing. Otherwise the scheduling instant is recorded first, so
    /// concurrent callers immediately observe it, and only then is the job
    /// submitted. Submission happens after the map entry is released so a
    /// synchronous executor cannot deadlock against the cache.
    pub fn ensure_scheduled(&self, locator: &ResourceLocator) {
        let now = self.clock.now();
        let should_submit = match self.scheduled.entry(locator.clone()) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) < self.window {
                    false
                } else {
                    occupied.insert(now);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        };

        if should_submit {
            debug!(
                resource = locator.resource_path(),
                "Scheduling background integrity verification"
            );
            let job = VerificationJob::new(
                locator.clone(),
                Arc::clone(&self.cryptor),
                Arc::clone(&self.warning_handler),
            );
            self.executor.submit(Box::new(move || job.run()));
        }
    }

    /// Number of cache entries, live or aged. Aged entries are replaced on
    /// the next request for their resource and removed by [`evict_expired`].
    ///
    /// [`evict_expired`]: Self::evict_expired
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    /// Drop entries older than the expiry window. Expiry itself is enforced
    /// lazily in [`ensure_scheduled`](Self::ensure_scheduled); this sweep
    /// only keeps the map from accumulating dead entries.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        self.scheduled
            .retain(|_, inserted_at| now.duration_since(*inserted_at) < self.window);
    }
}

/// Background task that checks the authenticity of one resource's stored
/// ciphertext.
struct VerificationJob {
    locator: ResourceLocator,
    cryptor: Arc<dyn Cryptor>,
    warning_handler: Arc<dyn IntegrityWarningHandler>,
}

impl VerificationJob {
    fn new(
        locator: ResourceLocator,
        cryptor: Arc<dyn Cryptor>,
        warning_handler: Arc<dyn IntegrityWarningHandler>,
    ) -> Self {
        Self {
            locator,
            cryptor,
            warning_handler,
        }
    }

    fn run(&self) {
        let path = self.locator.physical_path();
        let mut ciphertext = match File::open(path) {
            Ok(file) if file.metadata().map(|m| m.is_file()).unwrap_or(false) => file,
            Ok(_) => return,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(
                    path = %path.display(),
                    "Skipping integrity verification, backing file not readable"
                );
                return;
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    "IO error opening file for integrity verification: {}", e
                );
                return;
            }
        };

        match self.cryptor.is_authentic(&mut ciphertext) {
            Ok(true) => {
                debug!(
                    resource = self.locator.resource_path(),
                    "Integrity verification passed"
                );
            }
            Ok(false) => {
                self.warning_handler
                    .authentication_failed(self.locator.resource_path());
            }
            Err(e) if e.is_interrupted() => {
                debug!("Couldn't finish integrity verification due to interruption of worker thread");
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    "IO error during integrity verification: {}", e
                );
            }
        }
    }
}
