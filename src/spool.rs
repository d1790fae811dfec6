//! Partial Content Spooler Module
//!
//! Delivers only the requested range of bytes from an encrypted file,
//! per RFC 7233 (https://tools.ietf.org/html/rfc7233#section-4).
//!
//! Construction parses the `Range` header (failing the request on malformed
//! input before any I/O) and idempotently schedules a background integrity
//! verification for the resource. Spooling later resolves the requested
//! ranges against the decrypted size and streams the spanning range.
//!
//! Two error paths are intentionally asymmetric and must stay that way:
//! a backing file that vanished between the metadata check and spooling is
//! a silent no-op (benign race with deletion), while a decryption failure
//! is a hard error carrying the resource path.

use crate::byte_range::{parse_range_header, union_span, ByteRange};
use crate::cryptor::{Cryptor, CryptorError};
use crate::output::{OutputContext, CONTENT_RANGE_HEADER};
use crate::resource::ResourceLocator;
use crate::verification::VerificationScheduler;
use crate::{Result, VaultError};
use std::collections::HashSet;
use std::fs::{self, File};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::debug;

/// A range-restricted view of one encrypted resource, ready to spool.
pub struct PartialContent {
    locator: ResourceLocator,
    requested_ranges: HashSet<ByteRange>,
    cryptor: Arc<dyn Cryptor>,
}

impl PartialContent {
    /// Validate the `Range` header and ensure a verification job is
    /// scheduled for the resource.
    ///
    /// Fails with [`VaultError::InvalidRange`] when the header is absent or
    /// malformed; in that case nothing is scheduled and no I/O has happened.
    pub fn new(
        locator: ResourceLocator,
        range_header: Option<&str>,
        cryptor: Arc<dyn Cryptor>,
        scheduler: &VerificationScheduler,
    ) -> Result<Self> {
        let header = range_header.ok_or_else(|| {
            VaultError::InvalidRange("Request does not contain a Range header".to_string())
        })?;
        let requested_ranges = parse_range_header(header)?;

        scheduler.ensure_scheduled(&locator);

        Ok(Self {
            locator,
            requested_ranges,
            cryptor,
        })
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    pub fn requested_ranges(&self) -> &HashSet<ByteRange> {
        &self.requested_ranges
    }

    /// Stream the spanning range of decrypted bytes into `output`.
    ///
    /// Sets the sink's modification time, content length, and
    /// `Content-Range` property; writes the body only if the sink accepts a
    /// stream. A vanished backing file yields no output and no error. An
    /// unexpected end of stream during delivery means the client hung up and
    /// terminates cleanly; any other decryption failure is fatal.
    pub fn spool(&self, output: &mut dyn OutputContext) -> Result<()> {
        let path = self.locator.physical_path();
        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => {
                debug!(
                    resource = self.locator.resource_path(),
                    "Backing file vanished before spooling, serving nothing"
                );
                return Ok(());
            }
        };
        output.set_modification_time(modified_millis(&metadata));

        let mut ciphertext = File::open(path)?;
        let size = match self.cryptor.decrypted_content_length(&mut ciphertext) {
            Ok(size) => size,
            Err(e) => return self.handle_cryptor_error(e),
        };
        if size < 1 {
            return Err(VaultError::InvalidRange(format!(
                "Cannot satisfy byte range of empty resource {}",
                self.locator.resource_path()
            )));
        }

        let span = union_span(&self.requested_ranges, size)?;
        output.set_content_length(span.len());
        output.set_property(CONTENT_RANGE_HEADER, &span.content_range(size));

        if output.has_stream() {
            if let Err(e) =
                self.cryptor
                    .decrypt_range(&mut ciphertext, output.output_stream(), span.start, span.len())
            {
                return self.handle_cryptor_error(e);
            }
        }
        Ok(())
    }

    fn handle_cryptor_error(&self, err: CryptorError) -> Result<()> {
        match err {
            CryptorError::UnexpectedEof => {
                debug!("Unexpected end of stream during delivery of partial content (client hung up)");
                Ok(())
            }
            CryptorError::DecryptFailed(reason) => Err(VaultError::Decrypt {
                path: self.locator.physical_path().display().to_string(),
                reason,
            }),
            e => Err(VaultError::IoError(e.to_string())),
        }
    }
}

/// Modification time as milliseconds since the epoch, 0 when unavailable.
fn modified_millis(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
