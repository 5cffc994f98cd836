//! # tdslink-protocol
//!
//! IO-free implementation of the TDS wire protocol spoken by SQL Server:
//! packet headers, the token stream, collations, prelogin/LOGIN7, request
//! payload builders and the SMP framing used for MARS.
//!
//! This crate contains no networking and makes no assumptions about the
//! async runtime; `tdslink-codec` layers tokio on top of it.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod collation;
pub mod error;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod request;
pub mod rpc;
pub mod smp;
pub mod token;
pub mod types;

pub use collation::Collation;
pub use error::ProtocolError;
pub use login7::{FeatureExtension, FeatureId, Login7};
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin, PreLoginOption};
pub use request::{IsolationLevel, TmRequestType, encode_sql_batch, write_all_headers};
pub use rpc::{ParamFlags, ProcId, RpcParam, RpcRequest};
pub use smp::{SMP_HEADER_SIZE, SmpFlags, SmpHeader};
pub use token::{
    ColumnMeta, Done, EnvChange, FeatureAck, LoginAck, Order, RawValue, ReturnValue,
    ServerMessage, Token, TokenStream, TokenType, done_status, write_colmetadata, write_type_info,
};
pub use types::{MAX_SENTINEL, PLP_NULL, PLP_UNKNOWN_LEN, TypeId};
