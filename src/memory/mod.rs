//! Memory substrate: sealed/melted secret buffers and short-lived cells.
//!
//! Every long-lived secret in this crate lives inside a [`SecretBuffer`]
//! owned by a memory [`Engine`]. A buffer is `Sealed` between uses and must
//! be melted before its bytes can be touched; access outside the melted
//! state fails with [`MemoryError::Sealed`]. Short-lived intermediate
//! secrets (DH outputs, combiner states) live in [`Cell`]s, which are
//! always writable and are erased on destruction or drop.
//!
//! Two engines share these semantics: [`UnprotectedEngine`] keeps secrets
//! on the plain heap with explicit zeroization, [`GuardedEngine`] (unix)
//! adds guard pages, `mlock`, and in-memory encryption of sealed buffers.

mod unprotected;
#[cfg(unix)]
mod guarded;

pub use unprotected::UnprotectedEngine;
#[cfg(unix)]
pub use guarded::GuardedEngine;

#[cfg(unix)]
use guarded::{EnclaveKey, LockedRegion};

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::symmetric;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MemoryError {
    #[error("element is sealed")]
    Sealed,
    #[error("element is destroyed")]
    Destroyed,
    #[error("wrong element size for operation")]
    Size,
    #[error("could not decrypt element")]
    Decrypt,
    #[error("protected memory corrupt")]
    Corrupt,
    #[error("protected allocation failed")]
    Alloc,
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Shared handle to a memory engine.
pub type EngineRef = Arc<dyn Engine>;

/// A memory engine hands out protected buffers and cells and encrypts
/// elements under its master cell key. The master key is fixed at
/// construction and read-only afterwards.
pub trait Engine: Send + Sync {
    /// A new Sealed buffer of `size` bytes, zero-initialized.
    fn element(&self, size: usize) -> SecretBuffer;

    /// A new melted-only scratch cell of `size` bytes.
    fn cell(&self, size: usize) -> Cell;

    /// The engine master key.
    fn master_key(&self) -> &Cell;

    /// Encrypt an element under the engine master key.
    fn encrypt_element(&self, e: &SecretBuffer) -> Result<Vec<u8>> {
        e.encrypt(self.master_key())
    }

    /// Decrypt a previously encrypted element into a fresh Sealed buffer.
    fn decrypt_element(&self, encrypted: &[u8]) -> Result<SecretBuffer> {
        let size = symmetric::decrypted_size(encrypted.len()).map_err(|_| MemoryError::Size)?;
        let plaintext = Zeroizing::new(
            symmetric::decrypt(self.master_key().bytes(), encrypted)
                .map_err(|_| MemoryError::Decrypt)?,
        );
        let element = self.element(size);
        element.with_bytes(|b| {
            b.copy_from_slice(&plaintext);
            Ok::<(), MemoryError>(())
        })?;
        Ok(element)
    }
}

// ── Cell ─────────────────────────────────────────────────────────────────

enum CellBacking {
    Heap(Zeroizing<Vec<u8>>),
    #[cfg(unix)]
    Locked(LockedRegion),
}

impl CellBacking {
    fn bytes(&self) -> &[u8] {
        match self {
            CellBacking::Heap(v) => v,
            #[cfg(unix)]
            CellBacking::Locked(r) => r.bytes(),
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            CellBacking::Heap(v) => v,
            #[cfg(unix)]
            CellBacking::Locked(r) => r.bytes_mut(),
        }
    }
}

/// A short-lived buffer for intermediate secrets. Always writable, erased
/// on [`Cell::destroy`] and on drop. Destroying twice is a no-op; a
/// destroyed cell reads as empty.
pub struct Cell {
    backing: Option<CellBacking>,
}

impl Cell {
    /// A heap-backed cell. Engines may hand out locked variants instead.
    pub fn new(size: usize) -> Cell {
        Cell {
            backing: Some(CellBacking::Heap(Zeroizing::new(vec![0u8; size]))),
        }
    }

    #[cfg(unix)]
    pub(crate) fn locked(size: usize) -> Result<Cell> {
        Ok(Cell {
            backing: Some(CellBacking::Locked(LockedRegion::new(size)?)),
        })
    }

    /// Copy `d` into the cell (up to the cell size).
    pub fn load(&mut self, d: &[u8]) {
        if let Some(b) = self.backing.as_mut() {
            let dst = b.bytes_mut();
            let n = dst.len().min(d.len());
            dst[..n].copy_from_slice(&d[..n]);
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.backing.as_ref().map(|b| b.bytes()).unwrap_or(&[])
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.backing
            .as_mut()
            .map(|b| b.bytes_mut())
            .unwrap_or(&mut [])
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Erase and release the backing. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(mut b) = self.backing.take() {
            b.bytes_mut().zeroize();
        }
    }
}

impl Drop for Cell {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ── SecretBuffer ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Sealed,
    Melted,
    Destroyed,
}

enum Repr {
    Heap {
        data: Zeroizing<Vec<u8>>,
    },
    #[cfg(unix)]
    Enclave {
        key: Arc<EnclaveKey>,
        /// Ciphertext of the buffer contents while sealed.
        sealed: Option<Vec<u8>>,
        /// Plaintext region while melted.
        open: Option<LockedRegion>,
    },
}

struct Inner {
    state: State,
    repr: Repr,
}

impl Inner {
    fn melt(&mut self, size: usize) -> Result<()> {
        match self.state {
            State::Destroyed => Err(MemoryError::Destroyed),
            State::Melted => Ok(()),
            State::Sealed => {
                match &mut self.repr {
                    Repr::Heap { .. } => {}
                    #[cfg(unix)]
                    Repr::Enclave { key, sealed, open } => {
                        let mut region = LockedRegion::new(size)?;
                        if let Some(ct) = sealed.take() {
                            let plaintext = Zeroizing::new(
                                symmetric::decrypt(key.bytes(), &ct)
                                    .map_err(|_| MemoryError::Corrupt)?,
                            );
                            if plaintext.len() != size {
                                return Err(MemoryError::Corrupt);
                            }
                            region.bytes_mut().copy_from_slice(&plaintext);
                        }
                        *open = Some(region);
                    }
                }
                self.state = State::Melted;
                Ok(())
            }
        }
    }

    fn seal(&mut self) {
        if self.state != State::Melted {
            return;
        }
        match &mut self.repr {
            Repr::Heap { .. } => {}
            #[cfg(unix)]
            Repr::Enclave { key, sealed, open } => {
                let region = open.take().expect("melted enclave without open region");
                let ct = symmetric::encrypt(key.bytes(), region.bytes())
                    .expect("enclave seal encryption failed");
                *sealed = Some(ct);
                // LockedRegion drop erases the plaintext.
            }
        }
        self.state = State::Sealed;
    }

    fn slice_mut(&mut self) -> Result<&mut [u8]> {
        match self.state {
            State::Destroyed => Err(MemoryError::Destroyed),
            State::Sealed => Err(MemoryError::Sealed),
            State::Melted => match &mut self.repr {
                Repr::Heap { data } => Ok(data.as_mut_slice()),
                #[cfg(unix)]
                Repr::Enclave { open, .. } => Ok(open
                    .as_mut()
                    .expect("melted enclave without open region")
                    .bytes_mut()),
            },
        }
    }

    fn destroy(&mut self) {
        match &mut self.repr {
            Repr::Heap { data } => data.zeroize(),
            #[cfg(unix)]
            Repr::Enclave { sealed, open, .. } => {
                if let Some(ct) = sealed.as_mut() {
                    ct.zeroize();
                }
                *sealed = None;
                *open = None; // drop erases
            }
        }
        self.repr = Repr::Heap {
            data: Zeroizing::new(Vec::new()),
        };
        self.state = State::Destroyed;
    }
}

/// A size-tagged secret container in one of the states Sealed, Melted or
/// Destroyed. State transitions and access are serialized per buffer.
pub struct SecretBuffer {
    size: usize,
    inner: Mutex<Inner>,
}

impl SecretBuffer {
    pub(crate) fn heap(size: usize) -> SecretBuffer {
        SecretBuffer {
            size,
            inner: Mutex::new(Inner {
                state: State::Sealed,
                repr: Repr::Heap {
                    data: Zeroizing::new(vec![0u8; size]),
                },
            }),
        }
    }

    #[cfg(unix)]
    pub(crate) fn enclave(size: usize, key: Arc<EnclaveKey>) -> SecretBuffer {
        SecretBuffer {
            size,
            inner: Mutex::new(Inner {
                state: State::Sealed,
                repr: Repr::Enclave {
                    key,
                    sealed: None,
                    open: None,
                },
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Make the buffer accessible. Idempotent while not destroyed.
    pub fn melt(&self) -> Result<()> {
        self.lock().melt(self.size)
    }

    /// Reseal the buffer. Idempotent; a no-op on destroyed buffers.
    pub fn seal(&self) {
        self.lock().seal();
    }

    /// Mutable access to the buffer contents. Fails unless Melted. The
    /// returned guard holds the per-buffer lock.
    pub fn bytes(&self) -> Result<BytesGuard<'_>> {
        let mut guard = self.lock();
        guard.slice_mut()?;
        Ok(BytesGuard { guard })
    }

    /// Melt, run `f` on the contents, and reseal on every exit path.
    pub fn with_bytes<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut [u8]) -> std::result::Result<R, E>,
        E: From<MemoryError>,
    {
        let mut guard = self.lock();
        guard.melt(self.size)?;
        let result = f(guard.slice_mut()?);
        guard.seal();
        result
    }

    /// Copy `src` into the buffer and wipe `src`. Reseals afterwards.
    pub fn set(&self, src: &mut [u8]) -> Result<()> {
        let result = self.with_bytes(|b| {
            let n = b.len().min(src.len());
            b[..n].copy_from_slice(&src[..n]);
            Ok(())
        });
        src.zeroize();
        result
    }

    /// Zeroize and release the backing. Safe to call repeatedly; any later
    /// access fails with [`MemoryError::Destroyed`].
    pub fn destroy(&self) {
        self.lock().destroy();
    }

    /// Encrypt the buffer contents under a 32-byte cell key.
    pub fn encrypt(&self, key: &Cell) -> Result<Vec<u8>> {
        self.with_bytes(|b| symmetric::encrypt(key.bytes(), b).map_err(|_| MemoryError::Size))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned element lock means a panic mid-transition; secrecy
        // state is unknown, so propagate the abort.
        self.inner.lock().expect("secret buffer lock poisoned")
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.destroy();
        }
    }
}

/// Access guard returned by [`SecretBuffer::bytes`].
pub struct BytesGuard<'a> {
    guard: MutexGuard<'a, Inner>,
}

impl Deref for BytesGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match (&self.guard.state, &self.guard.repr) {
            (State::Melted, Repr::Heap { data }) => data,
            #[cfg(unix)]
            (State::Melted, Repr::Enclave { open, .. }) => {
                open.as_ref().expect("melted enclave without open region").bytes()
            }
            _ => &[],
        }
    }
}

impl DerefMut for BytesGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let state = self.guard.state;
        match (state, &mut self.guard.repr) {
            (State::Melted, Repr::Heap { data }) => data,
            #[cfg(unix)]
            (State::Melted, Repr::Enclave { open, .. }) => open
                .as_mut()
                .expect("melted enclave without open region")
                .bytes_mut(),
            _ => &mut [],
        }
    }
}
