//! LOGIN7 message construction.
//!
//! The login message is a fixed 94-byte header followed by an offset/length
//! table into a variable-length block of UTF-16LE strings. The password is
//! obfuscated, not encrypted; the connection is expected to be inside TLS by
//! the time this is sent.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16;

/// Size of the fixed LOGIN7 header.
pub const LOGIN7_HEADER_SIZE: usize = 94;

/// Feature extension ids carried in the LOGIN7 extension block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FeatureId {
    /// Session recovery.
    SessionRecovery = 0x01,
    /// Federated authentication.
    FedAuth = 0x02,
    /// UTF-8 support negotiation.
    Utf8Support = 0x0A,
    /// End of the extension block.
    Terminator = 0xFF,
}

/// One feature extension entry.
#[derive(Debug, Clone)]
pub struct FeatureExtension {
    /// Feature id.
    pub feature_id: FeatureId,
    /// Feature payload.
    pub data: Bytes,
}

/// LOGIN7 message builder.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// Requested TDS version (raw header encoding).
    pub tds_version: u32,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client program version.
    pub client_prog_version: u32,
    /// Client process id.
    pub client_pid: u32,
    /// Connection id.
    pub connection_id: u32,
    /// Client timezone offset in minutes.
    pub client_timezone: i32,
    /// Client locale id.
    pub client_lcid: u32,
    /// Client machine name.
    pub client_name: String,
    /// Username for SQL authentication.
    pub username: String,
    /// Password for SQL authentication.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name as the client addresses it.
    pub server_name: String,
    /// Client interface library name.
    pub library_name: String,
    /// Session language.
    pub language: String,
    /// Initial database.
    pub database: String,
    /// Client id (MAC address slot, zeros).
    pub client_id: [u8; 6],
    /// Opaque integrated-authentication blob; empty for SQL auth.
    pub sspi_blob: Vec<u8>,
    /// Read-only application intent.
    pub read_only_intent: bool,
    /// Feature extensions.
    pub features: Vec<FeatureExtension>,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: 0x74_00_00_04, // TDS 7.4
            packet_size: 4096,
            client_prog_version: 0,
            client_pid: std::process::id(),
            connection_id: 0,
            client_timezone: 0,
            client_lcid: 0x0409,
            client_name: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("tdslink"),
            server_name: String::new(),
            library_name: String::from("tdslink"),
            language: String::new(),
            database: String::new(),
            client_id: [0u8; 6],
            sspi_blob: Vec::new(),
            read_only_intent: false,
            features: Vec::new(),
        }
    }
}

impl Login7 {
    /// Create a login builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn with_sql_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = user.into();
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Declare read-only intent.
    #[must_use]
    pub fn with_read_only_intent(mut self, read_only: bool) -> Self {
        self.read_only_intent = read_only;
        self
    }

    /// Append a feature extension.
    #[must_use]
    pub fn with_feature(mut self, feature: FeatureExtension) -> Self {
        self.features.push(feature);
        self
    }

    /// Request UTF-8 support from the server.
    #[must_use]
    pub fn with_utf8_support(self) -> Self {
        self.with_feature(FeatureExtension {
            feature_id: FeatureId::Utf8Support,
            data: Bytes::from_static(&[0x01]),
        })
    }

    /// Encode the LOGIN7 payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let has_extensions = !self.features.is_empty();

        let u16_len = |s: &str| s.encode_utf16().count() as u16;
        let client_name_len = u16_len(&self.client_name);
        let username_len = u16_len(&self.username);
        let password_len = u16_len(&self.password);
        let app_name_len = u16_len(&self.app_name);
        let server_name_len = u16_len(&self.server_name);
        let library_name_len = u16_len(&self.library_name);
        let language_len = u16_len(&self.language);
        let database_len = u16_len(&self.database);
        let sspi_len = self.sspi_blob.len() as u16;

        let mut var = BytesMut::new();
        let mut offset = LOGIN7_HEADER_SIZE as u16;

        let client_name_offset = offset;
        write_utf16(&mut var, &self.client_name);
        offset += client_name_len * 2;

        let username_offset = offset;
        write_utf16(&mut var, &self.username);
        offset += username_len * 2;

        let password_offset = offset;
        write_obfuscated_password(&mut var, &self.password);
        offset += password_len * 2;

        let app_name_offset = offset;
        write_utf16(&mut var, &self.app_name);
        offset += app_name_len * 2;

        let server_name_offset = offset;
        write_utf16(&mut var, &self.server_name);
        offset += server_name_len * 2;

        // With extensions, the "unused" slot becomes a 4-byte pointer to the
        // extension block at the end of the variable data.
        let extension_offset = offset;
        let extension_len: u16 = if has_extensions { 4 } else { 0 };
        let extension_block_offset = if has_extensions {
            let block = offset as u32
                + 4
                + u32::from(library_name_len) * 2
                + u32::from(language_len) * 2
                + u32::from(database_len) * 2
                + u32::from(sspi_len);
            var.put_u32_le(block);
            offset += 4;
            block
        } else {
            0
        };

        let library_name_offset = offset;
        write_utf16(&mut var, &self.library_name);
        offset += library_name_len * 2;

        let language_offset = offset;
        write_utf16(&mut var, &self.language);
        offset += language_len * 2;

        let database_offset = offset;
        write_utf16(&mut var, &self.database);
        offset += database_len * 2;

        let sspi_offset = offset;
        var.put_slice(&self.sspi_blob);
        offset += sspi_len;

        let attach_db_offset = offset;
        let new_password_offset = offset;

        if has_extensions {
            debug_assert_eq!(u32::from(offset), extension_block_offset);
            for feature in &self.features {
                var.put_u8(feature.feature_id as u8);
                var.put_u32_le(feature.data.len() as u32);
                var.put_slice(&feature.data);
            }
            var.put_u8(FeatureId::Terminator as u8);
        }

        let total_length = LOGIN7_HEADER_SIZE + var.len();
        let mut buf = BytesMut::with_capacity(total_length);

        buf.put_u32_le(total_length as u32);
        buf.put_u32_le(self.tds_version);
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.client_prog_version);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(self.connection_id);

        // OptionFlags1: fUseDB | fDatabase (warn on db change, fail if the
        // initial database is unavailable).
        buf.put_u8(0x60);
        // OptionFlags2: fLanguage fatal | ODBC; integrated security when an
        // SSPI blob is attached.
        let mut flags2 = 0x03u8;
        if !self.sspi_blob.is_empty() {
            flags2 |= 0x80;
        }
        buf.put_u8(flags2);
        // TypeFlags: read-only intent is bit 5.
        buf.put_u8(if self.read_only_intent { 0x20 } else { 0x00 });
        // OptionFlags3: unknown-collation handling, extension bit when the
        // feature block is present.
        let mut flags3 = 0x08u8;
        if has_extensions {
            flags3 |= 0x10;
        }
        buf.put_u8(flags3);

        buf.put_i32_le(self.client_timezone);
        buf.put_u32_le(self.client_lcid);

        buf.put_u16_le(client_name_offset);
        buf.put_u16_le(client_name_len);
        buf.put_u16_le(username_offset);
        buf.put_u16_le(username_len);
        buf.put_u16_le(password_offset);
        buf.put_u16_le(password_len);
        buf.put_u16_le(app_name_offset);
        buf.put_u16_le(app_name_len);
        buf.put_u16_le(server_name_offset);
        buf.put_u16_le(server_name_len);
        buf.put_u16_le(extension_offset);
        buf.put_u16_le(extension_len);
        buf.put_u16_le(library_name_offset);
        buf.put_u16_le(library_name_len);
        buf.put_u16_le(language_offset);
        buf.put_u16_le(language_len);
        buf.put_u16_le(database_offset);
        buf.put_u16_le(database_len);

        buf.put_slice(&self.client_id);

        buf.put_u16_le(sspi_offset);
        buf.put_u16_le(sspi_len);
        buf.put_u16_le(attach_db_offset);
        buf.put_u16_le(0);
        buf.put_u16_le(new_password_offset);
        buf.put_u16_le(0);
        buf.put_u32_le(0); // SSPI long

        buf.put_slice(&var);
        buf.freeze()
    }
}

/// Obfuscate the password per the wire contract: for every byte of the
/// UTF-16LE encoding, swap the nibbles then XOR with 0xA5.
fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for unit in password.encode_utf16() {
        let low = (unit & 0xFF) as u8;
        let high = (unit >> 8) as u8;
        dst.put_u8(low.rotate_right(4) ^ 0xA5);
        dst.put_u8(high.rotate_right(4) ^ 0xA5);
    }
}
