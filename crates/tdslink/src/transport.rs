//! Transport abstraction.
//!
//! The connection is generic over any async byte stream, so plain TCP and
//! the TLS tunnel (and, on other platforms, a pipe) all slot in behind one
//! boxed type.

use tokio::io::{AsyncRead, AsyncWrite};

/// Object-safe alias for the traits a transport must provide.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> StreamIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// The boxed transport carried by a connection.
pub type Transport = Box<dyn StreamIo + 'static>;
