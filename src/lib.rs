//! Vault Proxy - HTTP byte-range gateway for transparently encrypted files
//!
//! This library serves partial content of encrypted vault files over
//! RFC 7233 byte-range semantics: it parses `Range` headers into canonical
//! byte intervals, streams exactly the spanning decrypted range through a
//! pluggable cryptor contract, and deduplicates background integrity
//! verification per resource via a time-bounded cache.

pub mod byte_range;
pub mod config;
pub mod cryptor;
pub mod error;
pub mod http_server;
pub mod logging;
pub mod output;
pub mod resource;
pub mod shutdown;
pub mod spool;
pub mod verification;

pub use error::{Result, VaultError};
