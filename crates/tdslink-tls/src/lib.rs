//! # tdslink-tls
//!
//! TLS tunnel for TDS connections. During prelogin the TLS handshake
//! records travel inside prelogin-type TDS packets; once established, the
//! tunnel encrypts and decrypts whole TDS packets transparently.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connector;
pub mod error;
pub mod prelogin_wrapper;

pub use connector::TlsConnector;
pub use error::TlsError;
pub use prelogin_wrapper::PreloginFramedTls;
pub use tokio_rustls::client::TlsStream;
