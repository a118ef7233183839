//! Client-facing API surface.
//!
//! The UI shell drives the crate through [`ClientApi`] and services
//! platform-specific work (secure file wipes, enclave key operations)
//! through the [`WorkerQueue`](worker::WorkerQueue). Secret-share
//! reconstruction across oracles happens in the integration layer; this
//! module only names the contract.

pub mod worker;

pub use worker::{TaskId, TaskResult, WorkerMethod, WorkerQueue, WorkerTask};

use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cypherlock not found")]
    NotFound,
    #[error("wrong passphrase or pin")]
    BadCredentials,
    #[error("oracle exchange failed: {0}")]
    Exchange(String),
    #[error(transparent)]
    Protocol(#[from] crate::protocol::ProtocolError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Destruction assurance, strongest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Assurance {
    /// Nothing was destroyed.
    None = 0,
    /// Local files deleted without secure wiping.
    Deleted = 1,
    /// Local secure wipe confirmed.
    SecureWipe = 2,
    /// Remote distress semaphores confirmed raised.
    RemoteConfirmed = 3,
}

/// The operations a client integration exposes to its user interface.
pub trait ClientApi {
    /// Create a cypherlock over `secret` (generated when empty) that
    /// opens `duration_seconds` from now. Builds and persists the oracle
    /// message containers.
    fn create_cypherlock(
        &mut self,
        passphrase: &str,
        pin: &str,
        secret: &[u8],
        duration_seconds: i64,
    ) -> Result<()>;

    /// Re-run the oracle exchanges and reconstruct the secret.
    fn unveil_secret(&mut self, passphrase: &str, pin: &str) -> Result<Zeroizing<Vec<u8>>>;

    /// Destroy as much of the secret as possible and report how much
    /// assurance the destruction carries.
    fn destroy_secret(&mut self) -> Assurance;

    /// Change the lock duration in either direction.
    fn modify_duration(&mut self, passphrase: &str, pin: &str, duration_seconds: i64)
        -> Result<()>;

    /// Emergency shortening without credentials; relies on secure
    /// deletion of the longer-lived containers.
    fn shorten_duration(&mut self, duration_seconds: i64) -> Result<Assurance>;
}

type WipeFileFn = Box<dyn Fn(&str) -> bool + Send + Sync>;
type WipeKeyFn = Box<dyn Fn(&str) -> bool + Send + Sync>;
type KeyCreateFn = Box<dyn Fn() -> Option<String> + Send + Sync>;
type KeyCryptFn = Box<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// Registered platform callbacks for destruction and enclave-backed key
/// management. Absent callbacks degrade the achievable [`Assurance`].
#[derive(Default)]
pub struct Callbacks {
    wipe_file: Option<WipeFileFn>,
    wipe_key: Option<WipeKeyFn>,
    key_create: Option<KeyCreateFn>,
    key_encrypt: Option<KeyCryptFn>,
    key_decrypt: Option<KeyCryptFn>,
}

impl Callbacks {
    pub fn new() -> Callbacks {
        Callbacks::default()
    }

    /// Register a secure file wipe.
    pub fn register_wipe<F>(&mut self, f: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.wipe_file = Some(Box::new(f));
    }

    /// Register an enclave key deletion.
    pub fn register_key_wipe<F>(&mut self, f: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.wipe_key = Some(Box::new(f));
    }

    /// Register enclave key creation; returns the new public key.
    pub fn register_key_create<F>(&mut self, f: F)
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.key_create = Some(Box::new(f));
    }

    /// Register encryption to an enclave key.
    pub fn register_key_encrypt<F>(&mut self, f: F)
    where
        F: Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    {
        self.key_encrypt = Some(Box::new(f));
    }

    /// Register decryption with an enclave key.
    pub fn register_key_decrypt<F>(&mut self, f: F)
    where
        F: Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    {
        self.key_decrypt = Some(Box::new(f));
    }

    /// Wipe a file, reporting the achieved assurance.
    pub fn wipe_file(&self, path: &str) -> Assurance {
        match &self.wipe_file {
            Some(f) if f(path) => Assurance::SecureWipe,
            Some(_) => Assurance::None,
            None => Assurance::Deleted,
        }
    }

    pub fn wipe_key(&self, public_key: &str) -> bool {
        match &self.wipe_key {
            Some(f) => f(public_key),
            None => false,
        }
    }

    pub fn key_create(&self) -> Option<String> {
        self.key_create.as_ref().and_then(|f| f())
    }

    pub fn key_encrypt(&self, cleartext: &str, public_key: &str) -> Option<String> {
        self.key_encrypt.as_ref().and_then(|f| f(cleartext, public_key))
    }

    pub fn key_decrypt(&self, ciphertext: &str, public_key: &str) -> Option<String> {
        self.key_decrypt.as_ref().and_then(|f| f(ciphertext, public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assurance_ordering() {
        assert!(Assurance::RemoteConfirmed > Assurance::SecureWipe);
        assert!(Assurance::SecureWipe > Assurance::Deleted);
        assert!(Assurance::Deleted > Assurance::None);
        assert_eq!(Assurance::RemoteConfirmed as u8, 3);
        assert_eq!(Assurance::None as u8, 0);
    }

    #[test]
    fn test_callbacks_degrade_without_registration() {
        let cb = Callbacks::new();
        assert_eq!(cb.wipe_file("/tmp/x"), Assurance::Deleted);
        assert!(!cb.wipe_key("pub"));
        assert!(cb.key_create().is_none());
    }

    #[test]
    fn test_registered_callbacks_run() {
        let mut cb = Callbacks::new();
        cb.register_wipe(|_| true);
        cb.register_key_create(|| Some("pubkey".to_string()));
        cb.register_key_encrypt(|clear, _| Some(format!("enc:{clear}")));
        assert_eq!(cb.wipe_file("/tmp/x"), Assurance::SecureWipe);
        assert_eq!(cb.key_create().as_deref(), Some("pubkey"));
        assert_eq!(cb.key_encrypt("data", "pubkey").as_deref(), Some("enc:data"));

        let mut cb2 = Callbacks::new();
        cb2.register_wipe(|_| false);
        assert_eq!(cb2.wipe_file("/tmp/x"), Assurance::None);
    }
}
