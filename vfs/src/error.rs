use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free block or inode slot is left on the device
    NoSpace,
    /// Copying between the file system and the caller's buffer failed
    Fault,
    /// The inode number is out of range or not allocated
    NotFound,
    /// On-disk metadata breaks a layout invariant
    Corrupted,
}

impl Error {
    /// POSIX errno reported to the dispatch layer.
    pub const fn errno(self) -> i32 {
        match self {
            Error::NoSpace => 28,
            Error::Fault => 14,
            Error::NotFound => 2,
            Error::Corrupted => 5,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoSpace => "no space left on device",
            Error::Fault => "bad address",
            Error::NotFound => "no such inode",
            Error::Corrupted => "corrupted metadata",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
