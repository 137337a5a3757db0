//! Low-level readers over one source file.

use crate::error::{SourceInputError, SourceResult};
use bytemuck::Pod;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::mem;
use std::path::{Path, PathBuf};

/// One open source file with its role name for error reporting.
pub(crate) struct SourceFile {
    role: &'static str,
    path: PathBuf,
    file: File,
    len: u64,
}

impl SourceFile {
    pub(crate) fn open(role: &'static str, path: &Path) -> SourceResult<Self> {
        let file = File::open(path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SourceInputError::Missing {
                    role,
                    path: path.to_owned(),
                }
            } else {
                SourceInputError::Io {
                    role,
                    path: path.to_owned(),
                    source: err,
                }
            }
        })?;
        let len = file
            .metadata()
            .map_err(|err| SourceInputError::Io {
                role,
                path: path.to_owned(),
                source: err,
            })?
            .len();
        Ok(Self {
            role,
            path: path.to_owned(),
            file,
            len,
        })
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn io_error(&self, source: io::Error) -> SourceInputError {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            self.size_mismatch("file ends before the declared contents")
        } else {
            SourceInputError::Io {
                role: self.role,
                path: self.path.clone(),
                source,
            }
        }
    }

    pub(crate) fn size_mismatch(&self, detail: impl Into<String>) -> SourceInputError {
        SourceInputError::SizeMismatch {
            role: self.role,
            path: self.path.clone(),
            detail: detail.into(),
        }
    }

    pub(crate) fn checksum_mismatch(&self, expected: u32, found: u32) -> SourceInputError {
        SourceInputError::Checksum {
            role: self.role,
            path: self.path.clone(),
            expected,
            found,
        }
    }

    pub(crate) fn read_u32(&mut self) -> SourceResult<u32> {
        let mut buf = [0u8; 4];
        self.file
            .read_exact(&mut buf)
            .map_err(|err| self.io_error(err))?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_u64(&mut self) -> SourceResult<u64> {
        let mut buf = [0u8; 8];
        self.file
            .read_exact(&mut buf)
            .map_err(|err| self.io_error(err))?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Skips `bytes` without validating that the file is long enough; pass 1
    /// validates total lengths arithmetically instead.
    pub(crate) fn skip(&mut self, bytes: u64) -> SourceResult<()> {
        self.file
            .seek(SeekFrom::Current(i64::try_from(bytes).map_err(|_| {
                self.size_mismatch(format!("implausible section of {bytes} bytes"))
            })?))
            .map_err(|err| self.io_error(err))?;
        Ok(())
    }

    /// Fills `dst` exactly from the current position.
    pub(crate) fn read_into(&mut self, dst: &mut [u8]) -> SourceResult<()> {
        self.file.read_exact(dst).map_err(|err| self.io_error(err))
    }

    /// Reads `count` packed `T` records.
    pub(crate) fn read_records<T: Pod>(&mut self, count: u64) -> SourceResult<Vec<T>> {
        let width = mem::size_of::<T>() as u64;
        let bytes = count
            .checked_mul(width)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| self.size_mismatch(format!("implausible record count {count}")))?;
        let mut raw = vec![0u8; bytes];
        self.read_into(&mut raw)?;
        Ok(raw
            .chunks_exact(width as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}

/// Checked `count * width` for pass-1 length arithmetic.
pub(crate) fn section_len(count: u64, width: u64) -> Option<u64> {
    count.checked_mul(width)
}
