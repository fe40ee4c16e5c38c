//! Durable storage for the session token pair.
//!
//! The access and refresh token form one unit: both present or both absent,
//! never a lone access token. The pair lives in one JSON document with the
//! fixed wire keys `accessToken`/`refreshToken`, so a mutation is a single
//! whole-document replace and readers can never observe half a pair.
//!
//! Backings:
//! - sealed file: document encrypted with ChaCha20-Poly1305, sealing key in
//!   the OS keychain (created on first use)
//! - plain file: unencrypted document, for hosts without a keychain
//! - memory: ephemeral, for tests and incognito-style sessions

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use keyring::Entry;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Keychain account name holding the document sealing key
const SEALING_KEY_USER: &str = "sealing-key";

/// ChaCha20-Poly1305 nonce length, prepended to the sealed document
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to {0} the token document")]
    Sealing(&'static str),

    #[error("Invalid token document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Access and refresh token, always handled as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

enum TokenBacking {
    Sealed { path: PathBuf, key: Key },
    Plain { path: PathBuf },
    Memory,
}

struct StoreInner {
    backing: TokenBacking,
    cell: RwLock<Option<TokenPair>>,
}

/// The single owner of the stored token pair.
/// Clone is cheap and shares one inner state; inject a clone into every
/// component that needs tokens instead of reaching for a global.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

impl TokenStore {
    /// Store backed by an encrypted document at `path`.
    /// The sealing key is looked up in the OS keychain under `service`,
    /// generated and stored on first use.
    pub fn sealed(path: impl Into<PathBuf>, service: &str) -> Result<Self, StoreError> {
        let key = Self::sealing_key(service)?;
        Self::open(TokenBacking::Sealed { path: path.into(), key })
    }

    /// Store backed by an unencrypted document at `path`.
    pub fn plain(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(TokenBacking::Plain { path: path.into() })
    }

    /// Ephemeral store with no durable backing.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backing: TokenBacking::Memory,
                cell: RwLock::new(None),
            }),
        }
    }

    fn open(backing: TokenBacking) -> Result<Self, StoreError> {
        let loaded = Self::load(&backing);
        Ok(Self {
            inner: Arc::new(StoreInner {
                backing,
                cell: RwLock::new(loaded),
            }),
        })
    }

    /// Currently stored access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.read_cell().as_ref().map(|pair| pair.access_token.clone())
    }

    /// Currently stored refresh token, if any.
    pub fn refresh_token(&self) -> Option<String> {
        self.read_cell().as_ref().map(|pair| pair.refresh_token.clone())
    }

    /// The whole stored pair, if any.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.read_cell().clone()
    }

    /// Presence check only: an expired-but-present token still counts until
    /// a request fails with it.
    pub fn is_authenticated(&self) -> bool {
        self.read_cell().is_some()
    }

    /// Atomically replace both tokens, writing through to the backing.
    pub fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        let pair = TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        };
        let mut cell = self.write_cell();
        self.persist(Some(&pair))?;
        *cell = Some(pair);
        Ok(())
    }

    /// Remove both tokens, here and in the backing.
    pub fn clear_tokens(&self) -> Result<(), StoreError> {
        let mut cell = self.write_cell();
        self.persist(None)?;
        *cell = None;
        Ok(())
    }

    fn read_cell(&self) -> std::sync::RwLockReadGuard<'_, Option<TokenPair>> {
        self.inner.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cell(&self) -> std::sync::RwLockWriteGuard<'_, Option<TokenPair>> {
        self.inner.cell.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the document from the backing. A missing document is a normal
    /// logged-out state; an unreadable one is treated the same after a
    /// warning, so a corrupt file degrades to "sign in again" instead of
    /// wedging the client.
    fn load(backing: &TokenBacking) -> Option<TokenPair> {
        let result = match backing {
            TokenBacking::Memory => return None,
            TokenBacking::Plain { path } => Self::load_plain(path),
            TokenBacking::Sealed { path, key } => Self::load_sealed(path, key),
        };
        match result {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "Unreadable token document, treating as logged out");
                None
            }
        }
    }

    fn load_plain(path: &Path) -> Result<Option<TokenPair>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    fn load_sealed(path: &Path, key: &Key) -> Result<Option<TokenPair>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read(path)?;
        if blob.len() <= NONCE_LEN {
            return Err(StoreError::Sealing("open"));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StoreError::Sealing("open"))?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    /// Write the document (or remove it for `None`). File replacement goes
    /// through a temp file and rename so a crash mid-write leaves either the
    /// old pair or the new pair, never a torn document.
    fn persist(&self, pair: Option<&TokenPair>) -> Result<(), StoreError> {
        match (&self.inner.backing, pair) {
            (TokenBacking::Memory, _) => Ok(()),
            (TokenBacking::Plain { path }, Some(pair)) => {
                Self::replace_file(path, &serde_json::to_vec_pretty(pair)?)
            }
            (TokenBacking::Sealed { path, key }, Some(pair)) => {
                let plaintext = serde_json::to_vec(pair)?;
                let cipher = ChaCha20Poly1305::new(key);
                let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
                let mut blob = nonce.to_vec();
                blob.extend(
                    cipher
                        .encrypt(&nonce, plaintext.as_slice())
                        .map_err(|_| StoreError::Sealing("seal"))?,
                );
                Self::replace_file(path, &blob)
            }
            (TokenBacking::Plain { path }, None) | (TokenBacking::Sealed { path, .. }, None) => {
                if path.exists() {
                    fs::remove_file(path)?;
                }
                Ok(())
            }
        }
    }

    fn replace_file(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Fetch the sealing key from the OS keychain, creating it on first use.
    fn sealing_key(service: &str) -> Result<Key, StoreError> {
        let entry = Entry::new(service, SEALING_KEY_USER)?;
        match entry.get_secret() {
            Ok(bytes) if bytes.len() == 32 => Ok(*Key::from_slice(&bytes)),
            Ok(_) => Err(StoreError::Sealing("load the key for")),
            Err(keyring::Error::NoEntry) => {
                debug!("No sealing key in keychain, generating one");
                let key = ChaCha20Poly1305::generate_key(&mut OsRng);
                entry.set_secret(key.as_slice())?;
                Ok(key)
            }
            Err(err) => Err(err.into()),
        }
    }
}
