//! POSIX shm plumbing and whole-region mappings.
//!
//! Regions are backed by `shm_open` file descriptors and mapped in full with
//! `memmap2`. The unsafe surface stays inside this module: callers only see
//! byte slices and unaligned typed prefix reads.

use crate::error::{RegionError, RegionResult};
use memmap2::{Mmap, MmapMut};
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd};
use tracing::debug;

const REGION_MODE: libc::mode_t = 0o600;

fn name_to_cstring(name: &str) -> RegionResult<CString> {
    if !name.starts_with('/') || name.len() < 2 || name.len() > 255 {
        return Err(RegionError::InvalidName {
            name: name.to_owned(),
        });
    }
    CString::new(name).map_err(|_| RegionError::InvalidName {
        name: name.to_owned(),
    })
}

fn shm_open_fd(name: &str, oflag: libc::c_int) -> RegionResult<Option<File>> {
    let c_name = name_to_cstring(name)?;
    // SAFETY: `c_name` is a valid NUL-terminated string; shm_open either
    // returns an owned descriptor or -1 with errno set.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, REGION_MODE) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(libc::ENOENT) => Ok(None),
            _ => Err(RegionError::os("shm_open", name, err)),
        };
    }
    // SAFETY: `fd` is a freshly opened descriptor owned by no one else.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    Ok(Some(File::from(owned)))
}

fn region_len(file: &File, name: &str) -> RegionResult<u64> {
    file.metadata()
        .map(|meta| meta.len())
        .map_err(|err| RegionError::os("fstat", name, err))
}

/// Creates the named region zero-filled at `size` bytes, or opens it if it
/// already exists at exactly that size.
///
/// Returns `true` when this call created the region. Idempotent across
/// process death: a leftover region of the right size is simply reused, one
/// of the wrong size surfaces as [`RegionError::SizeMismatch`] so the caller
/// can remove and recreate it.
pub fn open_or_create(name: &str, size: u64) -> RegionResult<bool> {
    let c_name = name_to_cstring(name)?;
    // SAFETY: same contract as in `shm_open_fd`; O_EXCL makes creation
    // detection atomic against concurrent callers.
    let fd = unsafe {
        libc::shm_open(
            c_name.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            REGION_MODE,
        )
    };
    if fd >= 0 {
        // SAFETY: freshly opened, unowned descriptor.
        let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });
        file.set_len(size)
            .map_err(|err| RegionError::os("ftruncate", name, err))?;
        debug!(region = name, size, "created shared region");
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::EEXIST) {
        return Err(RegionError::os("shm_open", name, err));
    }

    let file = shm_open_fd(name, libc::O_RDWR)?.ok_or_else(|| RegionError::Missing {
        name: name.to_owned(),
    })?;
    let actual = region_len(&file, name)?;
    if actual == 0 {
        return Err(RegionError::Unsized {
            name: name.to_owned(),
        });
    }
    if actual != size {
        return Err(RegionError::SizeMismatch {
            name: name.to_owned(),
            expected: size,
            actual,
        });
    }
    Ok(false)
}

/// Returns true when the named region currently exists.
pub fn exists(name: &str) -> bool {
    matches!(shm_open_fd(name, libc::O_RDONLY), Ok(Some(_)))
}

/// Unlinks the named region.
///
/// Returns `false` when the name was already gone. Mappings held elsewhere
/// stay valid until their owners detach.
pub fn remove(name: &str) -> RegionResult<bool> {
    let c_name = name_to_cstring(name)?;
    // SAFETY: valid NUL-terminated name; shm_unlink only touches the name.
    let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
    if rc == 0 {
        debug!(region = name, "removed shared region");
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENOENT) => Ok(false),
        _ => Err(RegionError::os("shm_unlink", name, err)),
    }
}

fn sized_file(name: &str, oflag: libc::c_int) -> RegionResult<(File, u64)> {
    let file = shm_open_fd(name, oflag)?.ok_or_else(|| RegionError::Missing {
        name: name.to_owned(),
    })?;
    let len = region_len(&file, name)?;
    if len == 0 {
        return Err(RegionError::Unsized {
            name: name.to_owned(),
        });
    }
    Ok((file, len))
}

/// Attaches a read-only mapping of the entire named region.
pub fn attach_read(name: &str) -> RegionResult<ReadRegion> {
    let (file, _) = sized_file(name, libc::O_RDONLY)?;
    // SAFETY: the descriptor refers to a shm object we just sized; the map
    // is dropped before the `ReadRegion` goes away.
    let map = unsafe { Mmap::map(&file) }.map_err(|err| RegionError::os("mmap", name, err))?;
    Ok(ReadRegion {
        name: name.to_owned(),
        map,
    })
}

/// Attaches a read-write mapping of the entire named region.
pub fn attach_write(name: &str) -> RegionResult<WriteRegion> {
    let (file, _) = sized_file(name, libc::O_RDWR)?;
    // SAFETY: as in `attach_read`, with write permission matching O_RDWR.
    let map =
        unsafe { MmapMut::map_mut(&file) }.map_err(|err| RegionError::os("mmap", name, err))?;
    Ok(WriteRegion {
        name: name.to_owned(),
        map,
    })
}

/// Read-only mapping of one named region. Detaches on drop.
#[derive(Debug)]
pub struct ReadRegion {
    name: String,
    map: Mmap,
}

impl ReadRegion {
    /// The region's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The full mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// Copies the region prefix out as a `T`.
    ///
    /// # Panics
    ///
    /// Panics if the region is shorter than `T`.
    pub fn read_prefix<T: bytemuck::Pod>(&self) -> T {
        let width = mem::size_of::<T>();
        assert!(
            self.map.len() >= width,
            "region {} holds {} bytes, prefix needs {width}",
            self.name,
            self.map.len()
        );
        bytemuck::pod_read_unaligned(&self.map[..width])
    }
}

/// Read-write mapping of one named region. Detaches on drop.
#[derive(Debug)]
pub struct WriteRegion {
    name: String,
    map: MmapMut,
}

impl WriteRegion {
    /// The region's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The full mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// The full mapped bytes, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Base pointer of the mapping; stable for the mapping's lifetime.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.map.as_ptr() as *mut u8
    }

    /// Copies the region prefix out as a `T`.
    ///
    /// # Panics
    ///
    /// Panics if the region is shorter than `T`.
    pub fn read_prefix<T: bytemuck::Pod>(&self) -> T {
        let width = mem::size_of::<T>();
        assert!(
            self.map.len() >= width,
            "region {} holds {} bytes, prefix needs {width}",
            self.name,
            self.map.len()
        );
        bytemuck::pod_read_unaligned(&self.map[..width])
    }

    /// Overwrites the region prefix with `value`.
    ///
    /// # Panics
    ///
    /// Panics if the region is shorter than `T`.
    pub fn write_prefix<T: bytemuck::Pod>(&mut self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        assert!(
            self.map.len() >= bytes.len(),
            "region {} holds {} bytes, prefix needs {}",
            self.name,
            self.map.len(),
            bytes.len()
        );
        self.map[..bytes.len()].copy_from_slice(bytes);
    }
}
