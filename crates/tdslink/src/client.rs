//! Client connection establishment and top-level API.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tdslink_codec::{Connection, ConnectionOptions, Inbound, MessageBuffer};
use tdslink_protocol::packet::{
    DEFAULT_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType,
};
use tdslink_protocol::prelogin::{EncryptionLevel, PreLogin};
use tdslink_protocol::token::{Token, TokenStream};
use tdslink_protocol::{Login7, ProtocolError};
use tdslink_tls::TlsConnector;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{Config, Encryption};
use crate::error::{Error, Result};
use crate::session::{ConnContext, SqlSession};
use crate::transport::Transport;

/// A connection to a SQL Server instance.
///
/// The client owns the transport, its reader task and a default session;
/// with MARS enabled, additional concurrent sessions can be opened with
/// [`Client::open_session`].
pub struct Client {
    config: Config,
    connection: Connection<Transport>,
    context: Arc<ConnContext>,
    default_session: SqlSession,
}

impl Client {
    /// Connect, negotiate encryption, log in and open the default session.
    pub async fn connect(config: Config) -> Result<Self> {
        let address = (config.host.clone(), config.port);
        tracing::debug!(host = %config.host, port = config.port, "connecting");

        let tcp = TcpStream::connect(address)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| Error::Connection(e.to_string()))?;

        Self::establish(tcp, config).await
    }

    async fn establish(mut tcp: TcpStream, config: Config) -> Result<Self> {
        // Prelogin travels on the raw stream, before any framing layer.
        let client_encryption = match config.encryption {
            Encryption::Off => EncryptionLevel::NotSupported,
            Encryption::On | Encryption::Required => EncryptionLevel::On,
        };

        let prelogin = PreLogin::new()
            .with_encryption(client_encryption)
            .with_mars(config.enable_mars)
            .with_thread_id(std::process::id());

        write_raw_message(&mut tcp, PacketType::PreLogin, &prelogin.encode()).await?;
        let (reply_type, reply) = read_raw_message(&mut tcp).await?;
        if !matches!(reply_type, PacketType::PreLogin | PacketType::TabularResult) {
            return Err(ProtocolError::InvalidPacketType(reply_type as u8).into());
        }
        let server = PreLogin::decode(&reply)?;

        tracing::debug!(
            encryption = ?server.encryption,
            mars = server.mars,
            "prelogin response"
        );

        let use_tls = match (config.encryption, server.encryption) {
            (Encryption::Off, EncryptionLevel::NotSupported | EncryptionLevel::Off) => false,
            (Encryption::Off, _) => true, // server insists on encryption
            (Encryption::On, EncryptionLevel::NotSupported) => {
                tracing::warn!("server cannot encrypt; continuing in cleartext");
                false
            }
            (Encryption::On, _) => true,
            (Encryption::Required, EncryptionLevel::NotSupported) => {
                return Err(Error::Config(
                    "encryption required but the server does not support TLS".to_string(),
                ));
            }
            (Encryption::Required, _) => true,
        };

        let mars = config.enable_mars && server.mars;

        let mut transport: Transport = if use_tls {
            let connector = TlsConnector::new(config.check_certificate)?;
            let tls = connector.connect_wrapped(tcp, &config.host).await?;
            Box::new(tls)
        } else {
            tracing::warn!("connection is not encrypted");
            Box::new(tcp)
        };

        // LOGIN7 over the (possibly tunneled) stream.
        let login = Login7::new()
            .with_sql_auth(config.user.clone(), config.password.clone())
            .with_app_name(config.app_name.clone())
            .with_server_name(config.host.clone())
            .with_database(config.database.clone().unwrap_or_default())
            .with_packet_size(DEFAULT_PACKET_SIZE as u32)
            .with_read_only_intent(config.read_only_intent)
            .with_utf8_support();

        write_raw_message(&mut transport, PacketType::Login, &login.encode()).await?;
        let (reply_type, reply) = read_raw_message(&mut transport).await?;
        if reply_type != PacketType::TabularResult {
            return Err(ProtocolError::InvalidPacketType(reply_type as u8).into());
        }

        let context = Arc::new(ConnContext::new(
            config.message_handler.clone(),
            config.count_handler.clone(),
            config.command_timeout,
        ));

        let packet_size = process_login_reply(&reply, &context)?;

        let connection = Connection::new(
            transport,
            ConnectionOptions {
                mars,
                packet_size,
                rate_limit: config.rate_limit,
            },
        );

        let session = connection.open_session().await?;
        let default_session = SqlSession::new(session, Arc::clone(&context));

        tracing::debug!(packet_size, mars, "login complete");

        Ok(Self {
            config,
            connection,
            context,
            default_session,
        })
    }

    /// Adopt a transport on which prelogin and login have already been
    /// completed (custom transports, in-process test servers).
    pub async fn attach<S>(transport: S, config: Config) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let context = Arc::new(ConnContext::new(
            config.message_handler.clone(),
            config.count_handler.clone(),
            config.command_timeout,
        ));

        let connection = Connection::new(
            Box::new(transport) as Transport,
            ConnectionOptions {
                mars: config.enable_mars,
                packet_size: 0,
                rate_limit: config.rate_limit,
            },
        );

        let session = connection.open_session().await?;
        let default_session = SqlSession::new(session, Arc::clone(&context));

        Ok(Self {
            config,
            connection,
            context,
            default_session,
        })
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current database, as reported by the server.
    #[must_use]
    pub fn database(&self) -> Option<String> {
        self.context.database.lock().clone()
    }

    /// The transaction descriptor embedded in outgoing requests.
    #[must_use]
    pub fn transaction_descriptor(&self) -> u64 {
        self.context.trans_id()
    }

    /// The default session.
    pub fn session(&mut self) -> &mut SqlSession {
        &mut self.default_session
    }

    /// Open an additional MARS session.
    ///
    /// Fails on a connection that was not negotiated with MARS.
    pub async fn open_session(&self) -> Result<SqlSession> {
        if !self.connection.is_mars() {
            return Err(Error::Config(
                "additional sessions require MARS".to_string(),
            ));
        }
        let session = self.connection.open_session().await?;
        Ok(SqlSession::new(session, Arc::clone(&self.context)))
    }

    /// Run a SQL batch and stream its rows. See [`SqlSession::batch`].
    pub async fn batch(&mut self, sql: &str) -> Result<crate::batch::Batch<'_>> {
        self.default_session.batch(sql).await
    }

    /// Run a parameterized query via `sp_executesql`. See
    /// [`SqlSession::query`].
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn tdslink_types::ToSql + Sync)],
    ) -> Result<crate::rpc::Rpc<'_>> {
        self.default_session.query(sql, params).await
    }

    /// Execute a statement and return the affected row count.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.default_session.execute(sql).await
    }

    /// Call a stored procedure. See [`SqlSession::rpc`].
    pub async fn rpc(
        &mut self,
        request: tdslink_protocol::RpcRequest,
    ) -> Result<crate::rpc::Rpc<'_>> {
        self.default_session.rpc(request).await
    }

    /// Start a bulk insert. See [`SqlSession::bulk_insert`].
    pub async fn bulk_insert(
        &mut self,
        table: &str,
        columns: Vec<tdslink_protocol::ColumnMeta>,
    ) -> Result<crate::bulk::BulkLoad<'_>> {
        self.default_session.bulk_insert(table, columns).await
    }

    /// Begin a transaction on the default session.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.default_session.begin_transaction().await
    }

    /// Commit the current transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.default_session.commit().await
    }

    /// Roll back the current transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.default_session.rollback().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("mars", &self.connection.is_mars())
            .finish_non_exhaustive()
    }
}

/// Parse the login reply: LOGINACK confirms the session, ENVCHANGE carries
/// the negotiated packet size, database and collation, ERROR fails login.
fn process_login_reply(payload: &[u8], context: &ConnContext) -> Result<u32> {
    let mut stream = TokenStream::new();
    stream.feed(payload);

    let mut acked = false;
    let mut packet_size = DEFAULT_PACKET_SIZE as u32;

    while let Some(token) = stream.try_next()? {
        match token {
            Token::LoginAck(ack) => {
                tracing::info!(
                    tds_version = format_args!("{:08X}", ack.tds_version),
                    server = %ack.prog_name,
                    "login acknowledged"
                );
                acked = true;
            }
            Token::EnvChange(env) => match env {
                tdslink_protocol::EnvChange::PacketSize { new, .. } => packet_size = new,
                tdslink_protocol::EnvChange::Database { new, .. } => {
                    *context.database.lock() = Some(new);
                }
                tdslink_protocol::EnvChange::SqlCollation { new, .. } => {
                    *context.collation.lock() = new;
                }
                _ => {}
            },
            Token::Error(message) => return Err(Error::Login(message.message)),
            Token::Info(message) => {
                tracing::debug!(number = message.number, text = %message.message, "login info");
            }
            Token::FeatureExtAck(features) => {
                for feature in &features {
                    tracing::debug!(feature_id = feature.feature_id, "feature acknowledged");
                }
            }
            Token::Done(_) => break,
            _ => {}
        }
    }

    if !acked {
        return Err(Error::Login("no login acknowledgement".to_string()));
    }
    Ok(packet_size)
}

/// Write one message as raw packets (pre-connection phase).
async fn write_raw_message<S: AsyncWrite + Unpin>(
    stream: &mut S,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<()> {
    let max_payload = DEFAULT_PACKET_SIZE - PACKET_HEADER_SIZE;
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[]]
    } else {
        payload.chunks(max_payload).collect()
    };
    let last = chunks.len() - 1;

    for (i, chunk) in chunks.into_iter().enumerate() {
        let status = if i == last {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        let header = PacketHeader::new(
            packet_type,
            status,
            (PACKET_HEADER_SIZE + chunk.len()) as u16,
        )
        .with_packet_id(1);

        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + chunk.len());
        header.encode(&mut buf);
        buf.extend_from_slice(chunk);
        stream.write_all(&buf).await?;
    }

    stream.flush().await?;
    Ok(())
}

/// Read one whole message as raw packets (pre-connection phase).
async fn read_raw_message<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(PacketType, Bytes)> {
    let mut assembler = MessageBuffer::new();

    loop {
        let mut header_buf = [0u8; PACKET_HEADER_SIZE];
        stream.read_exact(&mut header_buf).await?;
        let mut cursor = &header_buf[..];
        let header = PacketHeader::decode(&mut cursor)?;

        let mut payload = vec![0u8; header.payload_length()];
        stream.read_exact(&mut payload).await?;

        let inbound = Inbound {
            packet_type: header.packet_type,
            payload: Bytes::from(payload),
            last_packet: header.is_end_of_message(),
        };
        if let Some((packet_type, message)) = assembler.push(inbound) {
            return Ok((packet_type, message));
        }
    }
}
