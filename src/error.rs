//! The error type every fallible operation in this crate returns.
//!
//! Mirrors the return-code surface of the C library this crate replaces
//! (`fat32lib`'s `storage_device.h` / `smlib`'s `sm.h`) collapsed into one
//! enum, with `Storage` failures further wrapped in
//! `WriteError`/`ReadError`/`EraseError` so the I/O direction of a failure
//! survives until it reaches the FAT layer.

use core::fmt::{self, Debug, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FsError {
    // --- Media ---
    CannotReadMedia,
    CannotWriteMedia,
    MediumWriteProtected,
    DeviceNotReady,
    CommunicationError,
    Timeout,
    CrcError,
    EccFailed,
    AddressError,
    OutOfRange,

    // --- FAT structural ---
    InvalidFatVolume,
    SectorSizeNotSupported,
    InvalidCluster,
    CorruptedFile,
    RootDirectoryLimitExceeded,
    DirectoryLimitExceeded,

    // --- Naming ---
    InvalidFilename,
    IllegalFilename,
    FilenameTooLong,
    FilenameAlreadyExists,
    InvalidPath,

    // --- State ---
    FileNotFound,
    DirectoryDoesNotExist,
    NotAFile,
    NotADirectory,
    FileNotOpenedForWriteAccess,
    InvalidHandle,
    FileHandleInUse,
    FileBufferNotSet,
    MisalignedIO,
    BufferTooBig,
    InsufficientDiskSpace,
    InvalidParameters,
    SeekFailed,
    FeatureNotSupported,

    // --- Async transient ---
    OpInProgress,
    AwaitingData,
    Idle,

    /// Catch-all for storage-layer errors whose concrete type this crate
    /// doesn't know about (e.g. an R1 error bit this build doesn't map).
    UnknownError,
}

impl Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(not(feature = "no_std"))]
impl std::error::Error for FsError {}

/// Wraps a write failure from a concrete `Storage` implementation.
///
/// Kept distinct from `FsError` so a hardware `Storage` impl can carry its
/// own error type (`T`) up to the point where the FAT layer converts it with
/// `From<WriteError<T>> for FsError` (implementations provide this, or the
/// generic `T: Into<FsError>` blanket below covers the common case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WriteError<T> {
    /// Sector address fell outside of the storage medium.
    OutOfRange { requested_sector: usize },
    Other(T),
}

impl<T> From<T> for WriteError<T> {
    fn from(other: T) -> Self {
        WriteError::Other(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ReadError<T> {
    OutOfRange { requested_sector: usize },
    Other(T),
}

impl<T> From<T> for ReadError<T> {
    fn from(other: T) -> Self {
        ReadError::Other(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EraseError<W, T> {
    ErrorInIndividualErase(WriteError<W>),
    Other(T),
}

impl<W, T> From<T> for EraseError<W, T> {
    fn from(other: T) -> Self {
        EraseError::Other(other)
    }
}

impl<T: Into<FsError>> From<WriteError<T>> for FsError {
    fn from(e: WriteError<T>) -> Self {
        match e {
            WriteError::OutOfRange { .. } => FsError::OutOfRange,
            WriteError::Other(t) => t.into(),
        }
    }
}

impl<T: Into<FsError>> From<ReadError<T>> for FsError {
    fn from(e: ReadError<T>) -> Self {
        match e {
            ReadError::OutOfRange { .. } => FsError::OutOfRange,
            ReadError::Other(t) => t.into(),
        }
    }
}

macro_rules! display_using_debug {
    ($ty:ident < $($p:ident),+ >) => {
        impl<$($p: Debug),+> Display for $ty<$($p),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Debug::fmt(self, f)
            }
        }
    };
}

display_using_debug!(WriteError<T>);
display_using_debug!(ReadError<T>);
display_using_debug!(EraseError<W, T>);

#[cfg(not(feature = "no_std"))]
impl<T: Debug> std::error::Error for WriteError<T> {}
#[cfg(not(feature = "no_std"))]
impl<T: Debug> std::error::Error for ReadError<T> {}
#[cfg(not(feature = "no_std"))]
impl<W: Debug, T: Debug> std::error::Error for EraseError<W, T> {}
