//! # tdslink
//!
//! Async SQL Server client speaking the TDS wire protocol.
//!
//! The client drives three executors over one connection: ad-hoc SQL
//! batches, stored-procedure calls (RPC, with output parameters) and bulk
//! copy (BCP). With MARS enabled, several logical sessions share the
//! transport, each with its own one-at-a-time statement stream.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tdslink::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tdslink::Error> {
//!     let config = Config::new("db.example.com")
//!         .credentials("sa", "…")
//!         .database("orders");
//!
//!     let mut client = Client::connect(config).await?;
//!
//!     let mut result = client.query(
//!         "SELECT name FROM users WHERE id = @p1",
//!         &[&42i32],
//!     ).await?;
//!
//!     while let Some(row) = result.next_row().await? {
//!         let name: String = row.get(0)?;
//!         println!("{name}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod row;
pub mod rpc;
pub mod session;
pub mod transport;

pub use batch::Batch;
pub use bulk::BulkLoad;
pub use client::Client;
pub use config::{Config, Encryption};
pub use error::{Error, Result};
pub use row::{OutputParam, Row};
pub use rpc::Rpc;
pub use session::SqlSession;

// The protocol- and value-level types callers interact with directly.
pub use tdslink_protocol::request::IsolationLevel;
pub use tdslink_protocol::{Collation, ColumnMeta, RpcParam, RpcRequest, ServerMessage, TypeId};
pub use tdslink_types::{FromSql, SqlValue, ToSql};
