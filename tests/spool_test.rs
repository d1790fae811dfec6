//! Integration tests for partial content spooling.
//!
//! Exercises the whole request-shaped flow against real temp files: header
//! parsing at construction, range resolution against the decrypted size,
//! response metadata, body bytes, the silent no-op on a vanished backing
//! file, and the hard failure on decryption errors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use vault_proxy::byte_range::ByteRange;
use vault_proxy::cryptor::{CiphertextSource, Cryptor, CryptorError, PassthroughCryptor};
use vault_proxy::output::{BufferedOutput, CONTENT_RANGE_HEADER};
use vault_proxy::resource::ResourceLocator;
use vault_proxy::spool::PartialContent;
use vault_proxy::verification::{
    IntegrityWarningHandler, Job, TaskExecutor, VerificationScheduler,
};
use vault_proxy::VaultError;

/// Executor that counts submissions and runs jobs inline.
struct InlineExecutor {
    submissions: AtomicUsize,
}

impl InlineExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            submissions: AtomicUsize::new(0),
        })
    }

    fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl TaskExecutor for InlineExecutor {
    fn submit(&self, job: Job) {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        job();
    }
}

struct SilentHandler;

impl IntegrityWarningHandler for SilentHandler {
    fn authentication_failed(&self, _resource_path: &str) {}
}

/// Cryptor that fails every operation with a decryption error.
struct CorruptCryptor;

impl Cryptor for CorruptCryptor {
    fn decrypted_content_length(
        &self,
        _ciphertext: &mut dyn CiphertextSource,
    ) -> Result<i64, CryptorError> {
        Err(CryptorError::DecryptFailed("malformed header".to_string()))
    }

    fn decrypt_range(
        &self,
        _ciphertext: &mut dyn CiphertextSource,
        _plaintext: &mut dyn std::io::Write,
        _offset: i64,
        _length: i64,
    ) -> Result<(), CryptorError> {
        Err(CryptorError::DecryptFailed("malformed chunk".to_string()))
    }

    fn is_authentic(&self, _ciphertext: &mut dyn CiphertextSource) -> Result<bool, CryptorError> {
        Err(CryptorError::DecryptFailed("malformed header".to_string()))
    }
}

/// Cryptor whose receiver hangs up partway through range delivery.
struct HangupCryptor;

impl Cryptor for HangupCryptor {
    fn decrypted_content_length(
        &self,
        ciphertext: &mut dyn CiphertextSource,
    ) -> Result<i64, CryptorError> {
        PassthroughCryptor.decrypted_content_length(ciphertext)
    }

    fn decrypt_range(
        &self,
        _ciphertext: &mut dyn CiphertextSource,
        _plaintext: &mut dyn std::io::Write,
        _offset: i64,
        _length: i64,
    ) -> Result<(), CryptorError> {
        Err(CryptorError::UnexpectedEof)
    }

    fn is_authentic(&self, _ciphertext: &mut dyn CiphertextSource) -> Result<bool, CryptorError> {
        Ok(true)
    }
}

struct Fixture {
    _dir: TempDir,
    locator: ResourceLocator,
    scheduler: VerificationScheduler,
    executor: Arc<InlineExecutor>,
    content: Vec<u8>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let content: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join("report.bin");
    std::fs::write(&path, &content).unwrap();

    let executor = InlineExecutor::new();
    let scheduler = VerificationScheduler::new(
        Arc::new(PassthroughCryptor),
        Arc::clone(&executor) as Arc<dyn TaskExecutor>,
        Arc::new(SilentHandler),
    );

    Fixture {
        locator: ResourceLocator::new("/report.bin", path),
        _dir: dir,
        scheduler,
        executor,
        content,
    }
}

fn partial(fixture: &Fixture, header: &str) -> PartialContent {
    PartialContent::new(
        fixture.locator.clone(),
        Some(header),
        Arc::new(PassthroughCryptor),
        &fixture.scheduler,
    )
    .expect("valid range header")
}

#[test]
fn test_explicit_range_spools_exact_bytes() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=0-499");

    let mut output = BufferedOutput::with_stream();
    part.spool(&mut output).unwrap();

    assert_eq!(output.content_length(), Some(500));
    assert_eq!(output.property(CONTENT_RANGE_HEADER), Some("0-499/1024"));
    assert_eq!(output.body().unwrap(), &fixture.content[0..500]);
    assert!(output.modification_time().unwrap() > 0);
}

#[test]
fn test_suffix_range_spools_last_bytes() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=-500");

    let mut output = BufferedOutput::with_stream();
    part.spool(&mut output).unwrap();

    assert_eq!(output.property(CONTENT_RANGE_HEADER), Some("524-1023/1024"));
    assert_eq!(output.body().unwrap(), &fixture.content[524..]);
}

#[test]
fn test_open_ended_range_spools_to_end() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=500-");

    let mut output = BufferedOutput::with_stream();
    part.spool(&mut output).unwrap();

    assert_eq!(output.property(CONTENT_RANGE_HEADER), Some("500-1023/1024"));
    assert_eq!(output.body().unwrap(), &fixture.content[500..]);
}

#[test]
fn test_disjoint_ranges_spool_spanning_block() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=0-99,900-999");

    let mut output = BufferedOutput::with_stream();
    part.spool(&mut output).unwrap();

    // Bounding-box union: one contiguous block covering both ranges.
    assert_eq!(output.content_length(), Some(1000));
    assert_eq!(output.property(CONTENT_RANGE_HEADER), Some("0-999/1024"));
    assert_eq!(output.body().unwrap(), &fixture.content[0..1000]);
}

#[test]
fn test_header_only_sink_gets_metadata_without_body() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=0-499");

    let mut output = BufferedOutput::head_only();
    part.spool(&mut output).unwrap();

    assert_eq!(output.content_length(), Some(500));
    assert_eq!(output.property(CONTENT_RANGE_HEADER), Some("0-499/1024"));
    assert!(output.body().is_none());
}

#[test]
fn test_missing_range_header_fails_construction() {
    let fixture = fixture();
    let result = PartialContent::new(
        fixture.locator.clone(),
        None,
        Arc::new(PassthroughCryptor),
        &fixture.scheduler,
    );
    assert!(matches!(result, Err(VaultError::InvalidRange(_))));
}

#[test]
fn test_malformed_header_fails_before_any_scheduling() {
    let fixture = fixture();
    for header in ["", "bytes=", "bytes=abc", "bytes=100-50", "bytes=-"] {
        let result = PartialContent::new(
            fixture.locator.clone(),
            Some(header),
            Arc::new(PassthroughCryptor),
            &fixture.scheduler,
        );
        assert!(
            matches!(result, Err(VaultError::InvalidRange(_))),
            "header {:?} should fail construction",
            header
        );
    }
    // Failed construction must not have scheduled any verification work.
    assert_eq!(fixture.executor.submission_count(), 0);
}

#[test]
fn test_valid_construction_schedules_verification_once() {
    let fixture = fixture();
    let _a = partial(&fixture, "bytes=0-1");
    let _b = partial(&fixture, "bytes=2-3");

    assert_eq!(fixture.executor.submission_count(), 1);
}

#[test]
fn test_construction_exposes_parsed_ranges() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=0-99,-500");

    assert_eq!(part.locator(), &fixture.locator);
    assert_eq!(part.requested_ranges().len(), 2);
    assert!(part
        .requested_ranges()
        .contains(&ByteRange::Explicit { lower: 0, upper: 99 }));
    assert!(part.requested_ranges().contains(&ByteRange::Suffix(500)));
}

#[test]
fn test_vanished_file_is_silent_noop() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=0-499");

    std::fs::remove_file(fixture.locator.physical_path()).unwrap();

    let mut output = BufferedOutput::with_stream();
    part.spool(&mut output).unwrap();

    assert!(output.is_untouched());
}

#[test]
fn test_decrypt_failure_is_fatal_and_names_the_path() {
    let fixture = fixture();
    let part = PartialContent::new(
        fixture.locator.clone(),
        Some("bytes=0-499"),
        Arc::new(CorruptCryptor),
        &fixture.scheduler,
    )
    .unwrap();

    let mut output = BufferedOutput::with_stream();
    let err = part.spool(&mut output).unwrap_err();
    match err {
        VaultError::Decrypt { path, .. } => {
            assert!(path.contains("report.bin"));
        }
        other => panic!("expected decrypt error, got {:?}", other),
    }
}

#[test]
fn test_client_hangup_during_delivery_terminates_cleanly() {
    let fixture = fixture();
    let part = PartialContent::new(
        fixture.locator.clone(),
        Some("bytes=0-499"),
        Arc::new(HangupCryptor),
        &fixture.scheduler,
    )
    .unwrap();

    // The hung-up delivery is benign: no error, but the metadata set before
    // the stream broke is still there.
    let mut output = BufferedOutput::with_stream();
    part.spool(&mut output).unwrap();
    assert_eq!(output.content_length(), Some(500));
    assert!(output.body().unwrap().is_empty());
}

#[test]
fn test_unsatisfiable_range_is_invalid_range_error() {
    let fixture = fixture();
    let part = partial(&fixture, "bytes=5000-6000");

    let mut output = BufferedOutput::with_stream();
    let err = part.spool(&mut output).unwrap_err();
    assert!(matches!(err, VaultError::InvalidRange(_)));
}

#[test]
fn test_empty_resource_is_unsatisfiable() {
    let fixture = fixture();
    std::fs::write(fixture.locator.physical_path(), b"").unwrap();

    let part = partial(&fixture, "bytes=0-0");
    let mut output = BufferedOutput::with_stream();
    let err = part.spool(&mut output).unwrap_err();
    assert!(matches!(err, VaultError::InvalidRange(_)));
}
