//! PostgreSQL wire protocol message encoding and decoding.
//!
//! Implements the subset of the v3 protocol the pipelined engine speaks:
//! startup/authentication, and the extended-query messages that make up one
//! pipelined batch per query (Parse, Bind, Describe, Execute, Sync).
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::error::{PgError, PgResult};
use super::types::{Oid, Param};

// ============================================================================
// Protocol Constants
// ============================================================================

/// PostgreSQL protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 196608; // (3 << 16) | 0

/// Transaction status indicators carried by ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
}

impl From<u8> for TransactionStatus {
    fn from(b: u8) -> Self {
        match b {
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Idle,
        }
    }
}

// ============================================================================
// Frontend (Client -> Server) Messages
// ============================================================================

/// Trait for encoding frontend messages.
pub trait FrontendMessage {
    fn encode(&self) -> BytesMut;
}

/// Startup message sent at connection start.
#[derive(Debug, Clone)]
pub struct StartupMessage {
    pub user: String,
    pub database: Option<String>,
    pub options: Vec<(String, String)>,
}

impl FrontendMessage for StartupMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();

        // Placeholder for length (filled in at the end)
        buf.put_i32(0);
        buf.put_i32(PROTOCOL_VERSION);

        buf.put_slice(b"user\0");
        buf.put_slice(self.user.as_bytes());
        buf.put_u8(0);

        if let Some(ref db) = self.database {
            buf.put_slice(b"database\0");
            buf.put_slice(db.as_bytes());
            buf.put_u8(0);
        }

        for (key, value) in &self.options {
            buf.put_slice(key.as_bytes());
            buf.put_u8(0);
            buf.put_slice(value.as_bytes());
            buf.put_u8(0);
        }

        // Terminator
        buf.put_u8(0);

        // Length includes the length field itself
        let len = buf.len() as i32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());

        buf
    }
}

/// Password message (for MD5 or cleartext auth).
#[derive(Debug, Clone)]
pub struct PasswordMessage {
    pub password: String,
}

impl FrontendMessage for PasswordMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'p');
        buf.put_i32(4 + self.password.len() as i32 + 1);
        buf.put_slice(self.password.as_bytes());
        buf.put_u8(0);
        buf
    }
}

/// SASL initial response ('p') - first SCRAM message.
#[derive(Debug, Clone)]
pub struct SaslInitialResponseMessage {
    /// SASL mechanism name (e.g., "SCRAM-SHA-256")
    pub mechanism: String,
    /// Initial client response data
    pub data: Vec<u8>,
}

impl FrontendMessage for SaslInitialResponseMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'p');
        buf.put_i32(4 + self.mechanism.len() as i32 + 1 + 4 + self.data.len() as i32);
        buf.put_slice(self.mechanism.as_bytes());
        buf.put_u8(0);
        buf.put_i32(self.data.len() as i32);
        buf.put_slice(&self.data);
        buf
    }
}

/// SASL response ('p') - subsequent SCRAM messages.
#[derive(Debug, Clone)]
pub struct SaslResponseMessage {
    pub data: Vec<u8>,
}

impl FrontendMessage for SaslResponseMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'p');
        buf.put_i32(4 + self.data.len() as i32);
        buf.put_slice(&self.data);
        buf
    }
}

/// Parse message ('P') - creates an (unnamed) prepared statement.
#[derive(Debug, Clone)]
pub struct ParseMessage<'a> {
    pub query: &'a str,
    pub param_types: &'a [Oid],
}

impl FrontendMessage for ParseMessage<'_> {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'P');

        let mut body = BytesMut::new();

        // Unnamed statement
        body.put_u8(0);

        body.put_slice(self.query.as_bytes());
        body.put_u8(0);

        body.put_i16(self.param_types.len() as i16);
        for oid in self.param_types {
            body.put_i32(oid.as_i32());
        }

        buf.put_i32(body.len() as i32 + 4);
        buf.put_slice(&body);

        buf
    }
}

/// Bind message ('B') - binds textual parameters to the unnamed statement.
///
/// Zero parameter-format codes and zero result-format codes select text
/// format throughout; each value is sent as its textual form.
#[derive(Debug, Clone)]
pub struct BindMessage<'a> {
    pub params: &'a [Param],
}

impl FrontendMessage for BindMessage<'_> {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'B');

        let mut body = BytesMut::new();

        // Unnamed portal, unnamed statement
        body.put_u8(0);
        body.put_u8(0);

        // No parameter format codes: all text
        body.put_i16(0);

        body.put_i16(self.params.len() as i16);
        for param in self.params {
            body.put_i32(param.value.len() as i32);
            body.put_slice(param.value.as_bytes());
        }

        // No result format codes: all text
        body.put_i16(0);

        buf.put_i32(body.len() as i32 + 4);
        buf.put_slice(&body);

        buf
    }
}

/// Describe message ('D') for the unnamed portal - requests the
/// RowDescription that carries the result field names.
#[derive(Debug, Clone, Copy)]
pub struct DescribePortalMessage;

impl FrontendMessage for DescribePortalMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'D');
        buf.put_i32(4 + 1 + 1);
        buf.put_u8(b'P');
        buf.put_u8(0);
        buf
    }
}

/// Execute message ('E') - executes the unnamed portal without a row limit.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteMessage;

impl FrontendMessage for ExecuteMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'E');
        buf.put_i32(4 + 1 + 4);
        buf.put_u8(0);
        buf.put_i32(0);
        buf
    }
}

/// Sync message ('S') - the pipeline-sync marker closing one batch.
#[derive(Debug, Clone, Copy)]
pub struct SyncMessage;

impl FrontendMessage for SyncMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'S');
        buf.put_i32(4);
        buf
    }
}

/// Terminate message ('X') - closes the connection.
#[derive(Debug, Clone, Copy)]
pub struct TerminateMessage;

impl FrontendMessage for TerminateMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'X');
        buf.put_i32(4);
        buf
    }
}

// ============================================================================
// Backend (Server -> Client) Messages
// ============================================================================

/// Result field description from a RowDescription message.
///
/// Only the pieces the engine reads are retained; table/column origin and
/// size/modifier fields are consumed and discarded during decoding.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    pub name: String,
    pub type_oid: Oid,
}

/// Backend message types.
#[derive(Debug, Clone)]
pub enum BackendMessage {
    // Authentication
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMD5Password {
        salt: [u8; 4],
    },
    AuthenticationSASL {
        mechanisms: Vec<String>,
    },
    AuthenticationSASLContinue {
        data: Bytes,
    },
    AuthenticationSASLFinal {
        data: Bytes,
    },

    // Query responses
    RowDescription {
        fields: Vec<FieldDescription>,
    },
    DataRow {
        values: Vec<Option<Bytes>>,
    },
    CommandComplete {
        tag: String,
    },
    EmptyQueryResponse,

    // Extended query protocol
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    PortalSuspended,

    // Copy sub-protocol announcements (never initiated by the engine, but a
    // user query can still be a COPY statement)
    CopyInResponse,
    CopyOutResponse,
    CopyBothResponse,

    // Status
    ReadyForQuery {
        status: TransactionStatus,
    },
    ParameterStatus {
        name: String,
        value: String,
    },
    BackendKeyData {
        process_id: i32,
        secret_key: i32,
    },

    // Errors and notices
    ErrorResponse {
        fields: HashMap<u8, String>,
    },
    NoticeResponse {
        fields: HashMap<u8, String>,
    },

    // Other
    NotificationResponse {
        process_id: i32,
        channel: String,
        payload: String,
    },

    /// A message type the engine does not interpret. The body has already
    /// been consumed via the length framing, so it is safe to skip.
    Unknown(u8),
}

/// Split one complete message frame off the front of `buf`, if present.
///
/// Returns the whole frame (type byte + length + body). `buf` keeps any
/// trailing partial data for the next read.
pub fn split_frame(buf: &mut BytesMut) -> PgResult<Option<Bytes>> {
    if buf.len() < 5 {
        return Ok(None);
    }

    let length = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if length < 4 {
        return Err(PgError::Protocol(format!(
            "Invalid message length: {}",
            length
        )));
    }

    let total = 1 + length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some(buf.split_to(total).freeze()))
}

impl BackendMessage {
    /// Decode a backend message from a complete frame produced by
    /// [`split_frame`].
    pub fn decode(mut frame: Bytes) -> PgResult<Self> {
        if frame.remaining() < 5 {
            return Err(PgError::Protocol("Incomplete message header".to_string()));
        }

        let msg_type = frame.get_u8();
        let len = frame.get_i32() as usize;

        if frame.remaining() < len - 4 {
            return Err(PgError::Protocol("Incomplete message body".to_string()));
        }

        let body = frame.split_to(len - 4);

        match msg_type {
            b'R' => Self::decode_auth(body),
            b'T' => Self::decode_row_description(body),
            b'D' => Self::decode_data_row(body),
            b'C' => Self::decode_command_complete(body),
            b'Z' => Self::decode_ready_for_query(body),
            b'E' => Self::decode_error_response(body),
            b'N' => Self::decode_notice_response(body),
            b'S' => Self::decode_parameter_status(body),
            b'K' => Self::decode_backend_key_data(body),
            b'1' => Ok(BackendMessage::ParseComplete),
            b'2' => Ok(BackendMessage::BindComplete),
            b'3' => Ok(BackendMessage::CloseComplete),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'n' => Ok(BackendMessage::NoData),
            b's' => Ok(BackendMessage::PortalSuspended),
            b'G' => Ok(BackendMessage::CopyInResponse),
            b'H' => Ok(BackendMessage::CopyOutResponse),
            b'W' => Ok(BackendMessage::CopyBothResponse),
            b'A' => Self::decode_notification_response(body),
            other => Ok(BackendMessage::Unknown(other)),
        }
    }

    fn decode_auth(mut body: Bytes) -> PgResult<Self> {
        if body.remaining() < 4 {
            return Err(PgError::Protocol(
                "Truncated authentication message".to_string(),
            ));
        }
        let auth_type = body.get_i32();

        match auth_type {
            0 => Ok(BackendMessage::AuthenticationOk),
            3 => Ok(BackendMessage::AuthenticationCleartextPassword),
            5 => {
                if body.remaining() < 4 {
                    return Err(PgError::Protocol("Truncated MD5 salt".to_string()));
                }
                let mut salt = [0u8; 4];
                salt.copy_from_slice(&body[..4]);
                Ok(BackendMessage::AuthenticationMD5Password { salt })
            }
            10 => {
                let mut mechanisms = Vec::new();
                while body.remaining() > 0 {
                    let mech = read_cstring(&mut body)?;
                    if mech.is_empty() {
                        break;
                    }
                    mechanisms.push(mech);
                }
                Ok(BackendMessage::AuthenticationSASL { mechanisms })
            }
            11 => Ok(BackendMessage::AuthenticationSASLContinue { data: body }),
            12 => Ok(BackendMessage::AuthenticationSASLFinal { data: body }),
            _ => Err(PgError::Protocol(format!(
                "Unknown authentication type: {}",
                auth_type
            ))),
        }
    }

    fn decode_row_description(mut body: Bytes) -> PgResult<Self> {
        let num_fields = body.get_i16() as usize;
        let mut fields = Vec::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = read_cstring(&mut body)?;
            let _table_oid = body.get_i32();
            let _column_attr = body.get_i16();
            let type_oid = Oid::from_i32(body.get_i32());
            let _type_size = body.get_i16();
            let _type_modifier = body.get_i32();
            let _format = body.get_i16();

            fields.push(FieldDescription { name, type_oid });
        }

        Ok(BackendMessage::RowDescription { fields })
    }

    fn decode_data_row(mut body: Bytes) -> PgResult<Self> {
        let num_cols = body.get_i16() as usize;
        let mut values = Vec::with_capacity(num_cols);

        for _ in 0..num_cols {
            let len = body.get_i32();
            if len < 0 {
                values.push(None);
            } else {
                values.push(Some(body.split_to(len as usize)));
            }
        }

        Ok(BackendMessage::DataRow { values })
    }

    fn decode_command_complete(mut body: Bytes) -> PgResult<Self> {
        let tag = read_cstring(&mut body)?;
        Ok(BackendMessage::CommandComplete { tag })
    }

    fn decode_ready_for_query(mut body: Bytes) -> PgResult<Self> {
        let status = TransactionStatus::from(body.get_u8());
        Ok(BackendMessage::ReadyForQuery { status })
    }

    fn decode_error_response(body: Bytes) -> PgResult<Self> {
        let fields = read_error_fields(body)?;
        Ok(BackendMessage::ErrorResponse { fields })
    }

    fn decode_notice_response(body: Bytes) -> PgResult<Self> {
        let fields = read_error_fields(body)?;
        Ok(BackendMessage::NoticeResponse { fields })
    }

    fn decode_parameter_status(mut body: Bytes) -> PgResult<Self> {
        let name = read_cstring(&mut body)?;
        let value = read_cstring(&mut body)?;
        Ok(BackendMessage::ParameterStatus { name, value })
    }

    fn decode_backend_key_data(mut body: Bytes) -> PgResult<Self> {
        let process_id = body.get_i32();
        let secret_key = body.get_i32();
        Ok(BackendMessage::BackendKeyData {
            process_id,
            secret_key,
        })
    }

    fn decode_notification_response(mut body: Bytes) -> PgResult<Self> {
        let process_id = body.get_i32();
        let channel = read_cstring(&mut body)?;
        let payload = read_cstring(&mut body)?;

        Ok(BackendMessage::NotificationResponse {
            process_id,
            channel,
            payload,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read a null-terminated string from the buffer.
fn read_cstring(buf: &mut Bytes) -> PgResult<String> {
    let mut end = 0;
    while end < buf.remaining() && buf[end] != 0 {
        end += 1;
    }

    if end >= buf.remaining() {
        return Err(PgError::Protocol(
            "Missing null terminator in string".to_string(),
        ));
    }

    let s = std::str::from_utf8(&buf[..end])
        .map(|s| s.to_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&buf[..end]).into_owned());

    buf.advance(end + 1);
    Ok(s)
}

/// Read error/notice response fields keyed by their single-byte field type.
fn read_error_fields(mut body: Bytes) -> PgResult<HashMap<u8, String>> {
    let mut fields = HashMap::new();

    while body.remaining() > 0 {
        let field_type = body.get_u8();
        if field_type == 0 {
            break;
        }
        let value = read_cstring(&mut body)?;
        fields.insert(field_type, value);
    }

    Ok(fields)
}

/// Format an ErrorResponse's fields into the user-visible error text:
/// `SEVERITY: message (CODE)` with the detail line appended when present.
pub fn error_text(fields: &HashMap<u8, String>) -> String {
    let severity = fields.get(&b'S').map(String::as_str).unwrap_or("ERROR");
    let message = fields
        .get(&b'M')
        .map(String::as_str)
        .unwrap_or("unknown server error");
    let code = fields.get(&b'C').map(String::as_str).unwrap_or("?????");

    match fields.get(&b'D') {
        Some(detail) => format!("{}: {} ({})\nDetail: {}", severity, message, code, detail),
        None => format!("{}: {} ({})", severity, message, code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_message_structure() {
        let msg = StartupMessage {
            user: "test".to_string(),
            database: Some("testdb".to_string()),
            options: vec![],
        };

        let encoded = msg.encode();
        assert!(encoded.len() >= 8);

        let len = i32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len as usize, encoded.len());
    }

    #[test]
    fn test_sync_message_structure() {
        let encoded = SyncMessage.encode();
        assert_eq!(encoded[0], b'S');
        assert_eq!(encoded.len(), 5);
    }
}
