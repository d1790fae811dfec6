//! Cryptor Contract Module
//!
//! Narrow contract consumed from the encrypted-container collaborator. The
//! proxy never looks inside the ciphertext format; it only asks for the
//! decrypted content length, a decrypted byte range, and an authenticity
//! verdict. Key management, cipher construction, and MAC computation live
//! behind implementations of [`Cryptor`].

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use thiserror::Error;

/// Seekable ciphertext reader, the shape of an open encrypted file.
pub trait CiphertextSource: Read + Seek {}

impl<T: Read + Seek> CiphertextSource for T {}

/// Failures surfaced by a [`Cryptor`].
///
/// `UnexpectedEof` is deliberately distinct from other I/O failures: during
/// range delivery it means the receiving side hung up, which callers treat
/// as benign. The `Io` variant keeps the originating [`ErrorKind`] so that
/// interruption of a background worker is distinguishable from real errors.
#[derive(Error, Debug, Clone)]
pub enum CryptorError {
    #[error("Decryption failed: {0}")]
    DecryptFailed(String),

    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("{message}")]
    Io {
        kind: ErrorKind,
        message: String,
    },
}

impl CryptorError {
    /// True when the failure was caused by interruption of the worker thread.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            CryptorError::Io {
                kind: ErrorKind::Interrupted,
                ..
            }
        )
    }
}

impl From<std::io::Error> for CryptorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof => CryptorError::UnexpectedEof,
            kind => CryptorError::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

/// Contract of the encrypted-container collaborator.
pub trait Cryptor: Send + Sync {
    /// Plaintext size of the resource backing `ciphertext`.
    fn decrypted_content_length(
        &self,
        ciphertext: &mut dyn CiphertextSource,
    ) -> std::result::Result<i64, CryptorError>;

    /// Write exactly `length` plaintext bytes starting at plaintext offset
    /// `offset` into `plaintext`.
    fn decrypt_range(
        &self,
        ciphertext: &mut dyn CiphertextSource,
        plaintext: &mut dyn Write,
        offset: i64,
        length: i64,
    ) -> std::result::Result<(), CryptorError>;

    /// Whether the stored ciphertext's authentication tags are valid.
    fn is_authentic(
        &self,
        ciphertext: &mut dyn CiphertextSource,
    ) -> std::result::Result<bool, CryptorError>;
}

/// Identity cryptor: treats the stored file as its own plaintext.
///
/// Default wiring for the binary and the test suite; real vault formats plug
/// in their own [`Cryptor`] implementation.
#[derive(Debug, Default)]
pub struct PassthroughCryptor;

const COPY_BUF_SIZE: usize = 64 * 1024;

impl Cryptor for PassthroughCryptor {
    fn decrypted_content_length(
        &self,
        ciphertext: &mut dyn CiphertextSource,
    ) -> std::result::Result<i64, CryptorError> {
        let len = ciphertext.seek(SeekFrom::End(0))?;
        Ok(len as i64)
    }

    fn decrypt_range(
        &self,
        ciphertext: &mut dyn CiphertextSource,
        plaintext: &mut dyn Write,
        offset: i64,
        length: i64,
    ) -> std::result::Result<(), CryptorError> {
        ciphertext.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = [0u8; COPY_BUF_SIZE];
        let mut remaining = length;
        while remaining > 0 {
            let want = (remaining as usize).min(buf.len());
            let n = ciphertext.read(&mut buf[..want])?;
            if n == 0 {
                return Err(CryptorError::UnexpectedEof);
            }
            plaintext.write_all(&buf[..n])?;
            remaining -= n as i64;
        }
        Ok(())
    }

    fn is_authentic(
        &self,
        _ciphertext: &mut dyn CiphertextSource,
    ) -> std::result::Result<bool, CryptorError> {
        Ok(true)
    }
}
