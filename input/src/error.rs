use std::io;

/// Broad classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Os,
    PartialSetup,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A device or device node could not be located.
    #[error("{0}")]
    NotFound(String),

    /// Creation options were rejected before touching the kernel.
    #[error("{0}")]
    InvalidArgument(String),

    /// A system call failed.
    #[error("{context}: {source}")]
    Os {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Provisioning a virtual device failed half way. The device must be
    /// dropped, not set up again.
    #[error("{context}: {source}")]
    PartialSetup {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Captures `errno` right after a failed system call.
    pub(crate) fn last_os_error(context: impl Into<String>) -> Self {
        Error::Os {
            context: context.into(),
            source: io::Error::last_os_error(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Os { .. } => ErrorKind::Os,
            Error::PartialSetup { .. } => ErrorKind::PartialSetup,
        }
    }

    /// The underlying `errno`, if the error came from the kernel.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Os { source, .. } | Error::PartialSetup { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for the "nothing to read right now" outcome of a non-blocking read.
    pub fn is_would_block(&self) -> bool {
        self.raw_os_error() == Some(libc::EAGAIN)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Os {
            context: String::from("I/O error"),
            source: err,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_errors_keep_errno() {
        let err = Error::Os {
            context: "Input device grabbing failed".into(),
            source: io::Error::from_raw_os_error(libc::EBUSY),
        };
        assert_eq!(err.kind(), ErrorKind::Os);
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));
        assert!(err.to_string().starts_with("Input device grabbing failed: "));
    }

    #[test]
    fn would_block_is_recognized() {
        let err = Error::from(io::Error::from_raw_os_error(libc::EAGAIN));
        assert!(err.is_would_block());
        assert!(!Error::NotFound("gone".into()).is_would_block());
    }

    #[test]
    fn non_os_errors_have_no_errno() {
        let err = Error::InvalidArgument("name too long".into());
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.raw_os_error(), None);
        assert_eq!(err.to_string(), "name too long");
    }
}
