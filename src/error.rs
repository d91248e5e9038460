use crate::port::PortId;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("{port} socket closed: {source}")]
    PortClosed {
        port: PortId,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Returns true if the error means the socket descriptor itself is gone.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::PortClosed { .. } => true,
            Error::Io(e) => matches!(e.raw_os_error(), Some(libc::EBADF) | Some(libc::ENOTSOCK)),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
