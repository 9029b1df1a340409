//! Bridge errors

use crate::address::InvalidAddress;

/// The error type for bridge operations
///
/// Every error carries a [`kind`][Error::kind] (whose [`code`][ErrorKind::code] is the stable string reported to the
/// framework), a human readable [`message`][Error::message] and optionally the native error that caused it, which is
/// rendered by [`detail`][Error::detail].
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    message: String,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
        message: impl Into<String>,
    ) -> Self {
        Error {
            kind,
            source,
            message: message.into(),
        }
    }

    /// Wraps a native I/O failure, keeping its description as the message.
    pub(crate) fn native(kind: ErrorKind, err: std::io::Error) -> Self {
        let message = err.to_string();
        Error::new(kind, Some(Box::new(err)), message)
    }

    /// Returns the corresponding [ErrorKind] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the diagnostic text of the native failure behind this error, if any.
    ///
    /// The text lists the whole chain of sources, outermost first.
    pub fn detail(&self) -> Option<String> {
        let mut err: &(dyn std::error::Error + 'static) = &**self.source.as_ref()?;
        let mut detail = format!("{err:?}");
        while let Some(next) = err.source() {
            detail.push_str(&format!("\ncaused by: {next:?}"));
            err = next;
        }
        Some(detail)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.message.is_empty(), &self.source) {
            (true, None) => write!(f, "{}", &self.kind),
            (false, None) => write!(f, "{}: {}", &self.kind, &self.message),
            (true, Some(err)) => write!(f, "{}: {}", &self.kind, err),
            (false, Some(_)) => write!(f, "{}: {}", &self.kind, &self.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = &**x;
            x
        })
    }
}

/// A list of general categories of bridge error.
#[non_exhaustive]
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// invalid argument
    InvalidArgument,
    /// bluetooth is not available
    BluetoothUnavailable,
    /// permission denied
    NoPermissions,
    /// bonding failed
    BondError,
    /// connection failed
    ConnectError,
    /// write failed
    WriteError,
    /// invalid use of the API
    LogicError,
}

impl ErrorKind {
    /// The stable code reported to the application framework for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::BluetoothUnavailable => "bluetooth_unavailable",
            ErrorKind::NoPermissions => "no_permissions",
            ErrorKind::BondError => "bond_error",
            ErrorKind::ConnectError => "connect_error",
            ErrorKind::WriteError => "write_error",
            ErrorKind::LogicError => "logic_error",
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            source: None,
            message: String::new(),
        }
    }
}

impl From<InvalidAddress> for Error {
    fn from(err: InvalidAddress) -> Self {
        Error::new(
            ErrorKind::InvalidArgument,
            Some(Box::new(err)),
            "'address' argument is required to be string containing remote MAC address",
        )
    }
}
