//! Guarded engine: mlocked pages, guard pages, and in-memory encryption of
//! sealed buffers under an engine enclave key.
//!
//! Layout of a locked region: one `PROT_NONE` guard page, the mlocked data
//! pages, one `PROT_NONE` guard page. Sequential overruns in either
//! direction fault instead of reading neighbouring secrets. While a buffer
//! is sealed only the ciphertext remains in memory; the plaintext region is
//! erased and unmapped.

use std::ptr;
use std::sync::Arc;

use getrandom::getrandom;
use zeroize::Zeroize;

use super::{Cell, Engine, MemoryError, Result, SecretBuffer};

/// Page-aligned, mlocked allocation bracketed by guard pages.
pub(crate) struct LockedRegion {
    base: *mut u8,
    map_len: usize,
    data: *mut u8,
    data_len: usize,
    len: usize,
}

// The region is an exclusively owned allocation; the raw pointers are not
// aliased outside &self/&mut self access.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

fn page_size() -> usize {
    let p = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if p > 0 {
        p as usize
    } else {
        4096
    }
}

impl LockedRegion {
    pub(crate) fn new(len: usize) -> Result<LockedRegion> {
        let page = page_size();
        let data_pages = (len.max(1) + page - 1) / page;
        let data_len = data_pages * page;
        let map_len = data_len + 2 * page;
        unsafe {
            let base = libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if base == libc::MAP_FAILED {
                return Err(MemoryError::Alloc);
            }
            let base = base as *mut u8;
            let data = base.add(page);
            if libc::mprotect(base as *mut libc::c_void, page, libc::PROT_NONE) != 0
                || libc::mprotect(
                    data.add(data_len) as *mut libc::c_void,
                    page,
                    libc::PROT_NONE,
                ) != 0
            {
                libc::munmap(base as *mut libc::c_void, map_len);
                return Err(MemoryError::Alloc);
            }
            // Best effort: an unprivileged process may exceed RLIMIT_MEMLOCK.
            if libc::mlock(data as *const libc::c_void, data_len) != 0 {
                log::warn!("mlock failed; secret pages may be swapped");
            }
            #[cfg(target_os = "linux")]
            libc::madvise(data as *mut libc::c_void, data_len, libc::MADV_DONTDUMP);
            Ok(LockedRegion {
                base,
                map_len,
                data,
                data_len,
                len,
            })
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        unsafe {
            std::slice::from_raw_parts_mut(self.data, self.data_len).zeroize();
            libc::munlock(self.data as *const libc::c_void, self.data_len);
            libc::munmap(self.base as *mut libc::c_void, self.map_len);
        }
    }
}

/// Random 32-byte key held in locked memory; encrypts sealed buffers.
pub(crate) struct EnclaveKey {
    region: LockedRegion,
}

impl EnclaveKey {
    fn generate() -> Result<EnclaveKey> {
        let mut region = LockedRegion::new(32)?;
        getrandom(region.bytes_mut()).map_err(|_| MemoryError::Alloc)?;
        Ok(EnclaveKey { region })
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.region.bytes()
    }
}

/// Memory engine backed by locked regions.
pub struct GuardedEngine {
    master: Cell,
    enclave_key: Arc<EnclaveKey>,
}

impl GuardedEngine {
    /// Engine with a caller-supplied master cell key. Generates the
    /// per-process enclave key used to encrypt sealed buffers.
    pub fn new(master: Cell) -> Result<GuardedEngine> {
        Ok(GuardedEngine {
            master,
            enclave_key: Arc::new(EnclaveKey::generate()?),
        })
    }

    /// Engine with a fresh random master key.
    pub fn with_random_key() -> Result<GuardedEngine> {
        let mut master = Cell::locked(32)?;
        getrandom(master.bytes_mut()).map_err(|_| MemoryError::Alloc)?;
        GuardedEngine::new(master)
    }
}

impl Engine for GuardedEngine {
    fn element(&self, size: usize) -> SecretBuffer {
        SecretBuffer::enclave(size, self.enclave_key.clone())
    }

    fn cell(&self, size: usize) -> Cell {
        // A failed locked allocation is unrecoverable for secret storage.
        Cell::locked(size).expect("locked cell allocation failed")
    }

    fn master_key(&self) -> &Cell {
        &self.master
    }
}
