//! Prelogin negotiation message.
//!
//! Prelogin is the first exchange on a fresh connection: a TLV list of
//! options (protocol version, encryption mode, instance, thread id, MARS,
//! trace id, federated-auth, nonce). The same packet type later carries the
//! TLS handshake records.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Prelogin option ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PreLoginOption {
    /// Version information.
    Version = 0x00,
    /// Encryption negotiation.
    Encryption = 0x01,
    /// Instance name.
    Instance = 0x02,
    /// Client thread id.
    ThreadId = 0x03,
    /// MARS support.
    Mars = 0x04,
    /// Trace id for distributed tracing.
    TraceId = 0x05,
    /// Federated authentication required.
    FedAuthRequired = 0x06,
    /// Nonce.
    Nonce = 0x07,
    /// End of option list.
    Terminator = 0xFF,
}

/// Encryption level exchanged during prelogin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encrypt the login packet only.
    Off = 0x00,
    /// Encrypt the whole session.
    On = 0x01,
    /// Encryption unavailable.
    NotSupported = 0x02,
    /// Encryption required.
    #[default]
    Required = 0x03,
}

impl EncryptionLevel {
    /// Parse from the wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Off,
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            _ => Self::Required,
        }
    }
}

/// Prelogin request/response.
///
/// The client sends its TDS version and desired options; the server's reply
/// uses the same shape with its product version and the encryption verdict.
#[derive(Debug, Clone)]
pub struct PreLogin {
    /// Protocol (client) or product (server) version, raw 4 bytes.
    pub version: u32,
    /// Sub-build number.
    pub sub_build: u16,
    /// Encryption level.
    pub encryption: EncryptionLevel,
    /// Instance name for named instances.
    pub instance: Option<String>,
    /// Client thread id, diagnostic only.
    pub thread_id: Option<u32>,
    /// Whether MARS is requested/granted.
    pub mars: bool,
    /// Whether federated authentication is required.
    pub fed_auth_required: bool,
    /// Nonce, present when federated auth is in play.
    pub nonce: Option<[u8; 32]>,
}

impl Default for PreLogin {
    fn default() -> Self {
        Self::new()
    }
}

impl PreLogin {
    /// TDS 7.4 version tag sent in the client prelogin.
    pub const TDS_7_4: u32 = 0x74_00_00_04;

    /// Create a client prelogin with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: Self::TDS_7_4,
            sub_build: 0,
            encryption: EncryptionLevel::Required,
            instance: None,
            thread_id: None,
            mars: false,
            fed_auth_required: false,
            nonce: None,
        }
    }

    /// Set the encryption level.
    #[must_use]
    pub fn with_encryption(mut self, level: EncryptionLevel) -> Self {
        self.encryption = level;
        self
    }

    /// Request MARS.
    #[must_use]
    pub fn with_mars(mut self, enabled: bool) -> Self {
        self.mars = enabled;
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Set the client thread id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: u32) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Encode the TLV list.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        struct Entry {
            option: PreLoginOption,
            data: BytesMut,
        }

        let mut entries = Vec::new();

        let mut version = BytesMut::with_capacity(6);
        version.put_u32(self.version);
        version.put_u16_le(self.sub_build);
        entries.push(Entry {
            option: PreLoginOption::Version,
            data: version,
        });

        let mut enc = BytesMut::with_capacity(1);
        enc.put_u8(self.encryption as u8);
        entries.push(Entry {
            option: PreLoginOption::Encryption,
            data: enc,
        });

        if let Some(ref instance) = self.instance {
            let mut data = BytesMut::with_capacity(instance.len() + 1);
            data.put_slice(instance.as_bytes());
            data.put_u8(0);
            entries.push(Entry {
                option: PreLoginOption::Instance,
                data,
            });
        }

        if let Some(thread_id) = self.thread_id {
            let mut data = BytesMut::with_capacity(4);
            data.put_u32_le(thread_id);
            entries.push(Entry {
                option: PreLoginOption::ThreadId,
                data,
            });
        }

        let mut mars = BytesMut::with_capacity(1);
        mars.put_u8(u8::from(self.mars));
        entries.push(Entry {
            option: PreLoginOption::Mars,
            data: mars,
        });

        if self.fed_auth_required {
            let mut data = BytesMut::with_capacity(1);
            data.put_u8(1);
            entries.push(Entry {
                option: PreLoginOption::FedAuthRequired,
                data,
            });
        }

        if let Some(nonce) = self.nonce {
            let mut data = BytesMut::with_capacity(32);
            data.put_slice(&nonce);
            entries.push(Entry {
                option: PreLoginOption::Nonce,
                data,
            });
        }

        // Option table: 5 bytes per entry plus the terminator.
        let header_size = entries.len() * 5 + 1;
        let mut buf = BytesMut::with_capacity(header_size + 64);
        let mut offset = header_size as u16;

        for entry in &entries {
            buf.put_u8(entry.option as u8);
            buf.put_u16(offset);
            buf.put_u16(entry.data.len() as u16);
            offset += entry.data.len() as u16;
        }
        buf.put_u8(PreLoginOption::Terminator as u8);

        for entry in entries {
            buf.put_slice(&entry.data);
        }

        buf.freeze()
    }

    /// Decode a prelogin response.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut prelogin = Self::new();
        prelogin.encryption = EncryptionLevel::NotSupported;
        prelogin.mars = false;

        let mut pos = 0usize;
        loop {
            if pos >= data.len() {
                return Err(ProtocolError::MalformedPrelogin("missing terminator"));
            }
            let option = data[pos];
            if option == PreLoginOption::Terminator as u8 {
                break;
            }
            if pos + 5 > data.len() {
                return Err(ProtocolError::MalformedPrelogin("truncated option table"));
            }
            let offset = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as usize;
            let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
            pos += 5;

            if offset + length > data.len() {
                return Err(ProtocolError::MalformedPrelogin("option out of bounds"));
            }
            let body = &data[offset..offset + length];

            match option {
                0x00 => {
                    if body.len() >= 6 {
                        prelogin.version =
                            u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                        prelogin.sub_build = u16::from_le_bytes([body[4], body[5]]);
                    }
                }
                0x01 => {
                    if let Some(&b) = body.first() {
                        prelogin.encryption = EncryptionLevel::from_u8(b);
                    }
                }
                0x04 => {
                    prelogin.mars = body.first().copied() == Some(1);
                }
                0x06 => {
                    prelogin.fed_auth_required = body.first().copied() == Some(1);
                }
                _ => {}
            }
        }

        Ok(prelogin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let prelogin = PreLogin::new()
            .with_encryption(EncryptionLevel::On)
            .with_mars(true)
            .with_thread_id(7);

        let encoded = prelogin.encode();
        let decoded = PreLogin::decode(&encoded).unwrap();

        assert_eq!(decoded.encryption, EncryptionLevel::On);
        assert!(decoded.mars);
    }

    #[test]
    fn rejects_missing_terminator() {
        assert!(PreLogin::decode(&[0x00, 0x00, 0x10, 0x00, 0x06]).is_err());
    }

    #[test]
    fn rejects_out_of_bounds_option() {
        // Option table points past the end of the buffer.
        let data = [0x01, 0x00, 0x40, 0x00, 0x01, 0xFF];
        assert!(PreLogin::decode(&data).is_err());
    }

    #[test]
    fn default_reply_has_no_encryption() {
        let data = [0xFF];
        let decoded = PreLogin::decode(&data).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::NotSupported);
    }
}
