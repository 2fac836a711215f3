//! Wire-level tests for the protocol layer.

use bytes::{BufMut, BytesMut};

use super::protocol::*;
use super::types::{Oid, Param};

fn frame(kind: u8, body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(kind);
    buf.put_i32(4 + body.len() as i32);
    buf.put_slice(body);
    buf
}

fn decode_one(kind: u8, body: &[u8]) -> BackendMessage {
    let mut buf = frame(kind, body);
    let frame = split_frame(&mut buf).unwrap().unwrap();
    BackendMessage::decode(frame).unwrap()
}

mod message_encoding {
    use super::*;

    #[test]
    fn test_parse_targets_unnamed_statement() {
        let msg = ParseMessage {
            query: "select 1 from tbl where id=$1",
            param_types: &[Oid::INT4],
        };
        let encoded = msg.encode();

        assert_eq!(encoded[0], b'P');
        // Statement name is the empty string: a lone null right after the
        // length field
        assert_eq!(encoded[5], 0);

        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("select 1 from tbl where id=$1"));

        // One parameter type: INT4
        let tail = &encoded[encoded.len() - 6..];
        assert_eq!(i16::from_be_bytes([tail[0], tail[1]]), 1);
        assert_eq!(
            i32::from_be_bytes([tail[2], tail[3], tail[4], tail[5]]),
            Oid::INT4.as_i32()
        );
    }

    #[test]
    fn test_bind_sends_text_format_params() {
        let params = [Param::int4(42), Param::varchar("abc")];
        let encoded = BindMessage { params: &params }.encode();

        assert_eq!(encoded[0], b'B');

        // Body: portal "", statement "", 0 format codes, 2 params
        let body = &encoded[5..];
        assert_eq!(body[0], 0);
        assert_eq!(body[1], 0);
        assert_eq!(i16::from_be_bytes([body[2], body[3]]), 0);
        assert_eq!(i16::from_be_bytes([body[4], body[5]]), 2);

        // First value: length 2, "42"
        assert_eq!(i32::from_be_bytes([body[6], body[7], body[8], body[9]]), 2);
        assert_eq!(&body[10..12], b"42");

        // Second value: length 3, "abc"
        assert_eq!(
            i32::from_be_bytes([body[12], body[13], body[14], body[15]]),
            3
        );
        assert_eq!(&body[16..19], b"abc");

        // Zero result-format codes: text results
        assert_eq!(i16::from_be_bytes([body[19], body[20]]), 0);
        assert_eq!(body.len(), 21);
    }

    #[test]
    fn test_describe_portal_and_execute() {
        let describe = DescribePortalMessage.encode();
        assert_eq!(&describe[..], &[b'D', 0, 0, 0, 6, b'P', 0]);

        let execute = ExecuteMessage.encode();
        assert_eq!(execute[0], b'E');
        assert_eq!(execute[5], 0); // unnamed portal
        assert_eq!(
            i32::from_be_bytes([execute[6], execute[7], execute[8], execute[9]]),
            0 // no row limit
        );
    }

    #[test]
    fn test_sync_and_terminate() {
        assert_eq!(&SyncMessage.encode()[..], &[b'S', 0, 0, 0, 4]);
        assert_eq!(&TerminateMessage.encode()[..], &[b'X', 0, 0, 0, 4]);
    }

    #[test]
    fn test_password_message() {
        let encoded = PasswordMessage {
            password: "md5abc".to_string(),
        }
        .encode();
        assert_eq!(encoded[0], b'p');
        assert_eq!(&encoded[5..11], b"md5abc");
        assert_eq!(encoded[11], 0);
    }

    #[test]
    fn test_one_query_batch_is_self_contained() {
        // The batch a connection writes per query must parse back into
        // exactly five frames ending in Sync
        let params = [Param::int8(7)];
        let mut wire = BytesMut::new();
        wire.extend_from_slice(
            &ParseMessage {
                query: "select $1",
                param_types: &[Oid::INT8],
            }
            .encode(),
        );
        wire.extend_from_slice(&BindMessage { params: &params }.encode());
        wire.extend_from_slice(&DescribePortalMessage.encode());
        wire.extend_from_slice(&ExecuteMessage.encode());
        wire.extend_from_slice(&SyncMessage.encode());

        let mut kinds = Vec::new();
        while let Some(frame) = split_frame(&mut wire).unwrap() {
            kinds.push(frame[0]);
        }
        assert_eq!(kinds, vec![b'P', b'B', b'D', b'E', b'S']);
        assert!(wire.is_empty());
    }
}

mod message_decoding {
    use super::*;

    #[test]
    fn test_split_frame_waits_for_complete_messages() {
        let mut buf = BytesMut::new();
        assert!(split_frame(&mut buf).unwrap().is_none());

        // Header only
        buf.put_u8(b'C');
        buf.put_i32(12);
        assert!(split_frame(&mut buf).unwrap().is_none());

        // Body arrives in a later read
        buf.put_slice(b"SELECT 1\0");
        let frame = split_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), 13);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_frame_rejects_bad_length() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'C');
        buf.put_i32(2);
        assert!(split_frame(&mut buf).is_err());
    }

    #[test]
    fn test_row_description() {
        let mut body = BytesMut::new();
        body.put_i16(2);
        for name in ["id", "email"] {
            body.put_slice(name.as_bytes());
            body.put_u8(0);
            body.put_i32(0);
            body.put_i16(0);
            body.put_i32(25);
            body.put_i16(-1);
            body.put_i32(-1);
            body.put_i16(0);
        }

        match decode_one(b'T', &body) {
            BackendMessage::RowDescription { fields } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name, "id");
                assert_eq!(fields[1].name, "email");
                assert_eq!(fields[0].type_oid, Oid::TEXT);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_data_row_with_null() {
        let mut body = BytesMut::new();
        body.put_i16(2);
        body.put_i32(3);
        body.put_slice(b"abc");
        body.put_i32(-1);

        match decode_one(b'D', &body) {
            BackendMessage::DataRow { values } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].as_deref(), Some(&b"abc"[..]));
                assert!(values[1].is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_command_complete_and_ready() {
        match decode_one(b'C', b"SELECT 5\0") {
            BackendMessage::CommandComplete { tag } => assert_eq!(tag, "SELECT 5"),
            other => panic!("unexpected message: {:?}", other),
        }

        match decode_one(b'Z', b"T") {
            BackendMessage::ReadyForQuery { status } => {
                assert_eq!(status, TransactionStatus::InTransaction)
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_error_response_text() {
        let body = b"SERROR\0C42P01\0Mrelation \"t\" does not exist\0\0";
        match decode_one(b'E', body) {
            BackendMessage::ErrorResponse { fields } => {
                let text = error_text(&fields);
                assert_eq!(text, "ERROR: relation \"t\" does not exist (42P01)");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_error_text_with_detail() {
        let body = b"SERROR\0C23505\0Mduplicate key\0Dalready present\0\0";
        match decode_one(b'E', body) {
            BackendMessage::ErrorResponse { fields } => {
                let text = error_text(&fields);
                assert!(text.starts_with("ERROR: duplicate key (23505)"));
                assert!(text.contains("Detail: already present"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_auth_variants() {
        assert!(matches!(
            decode_one(b'R', &0i32.to_be_bytes()),
            BackendMessage::AuthenticationOk
        ));
        assert!(matches!(
            decode_one(b'R', &3i32.to_be_bytes()),
            BackendMessage::AuthenticationCleartextPassword
        ));

        let mut body = BytesMut::new();
        body.put_i32(5);
        body.put_slice(&[9, 8, 7, 6]);
        match decode_one(b'R', &body) {
            BackendMessage::AuthenticationMD5Password { salt } => {
                assert_eq!(salt, [9, 8, 7, 6]);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let mut body = BytesMut::new();
        body.put_i32(10);
        body.put_slice(b"SCRAM-SHA-256\0\0");
        match decode_one(b'R', &body) {
            BackendMessage::AuthenticationSASL { mechanisms } => {
                assert_eq!(mechanisms, vec!["SCRAM-SHA-256"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_is_skippable() {
        // Length framing lets the engine step over message types it does
        // not interpret
        let mut buf = frame(b'y', b"whatever");
        buf.extend_from_slice(&frame(b'Z', b"I"));

        let first = split_frame(&mut buf).unwrap().unwrap();
        assert!(matches!(
            BackendMessage::decode(first).unwrap(),
            BackendMessage::Unknown(b'y')
        ));

        let second = split_frame(&mut buf).unwrap().unwrap();
        assert!(matches!(
            BackendMessage::decode(second).unwrap(),
            BackendMessage::ReadyForQuery { .. }
        ));
    }

    #[test]
    fn test_pipelined_replies_split_in_order() {
        // Two complete query replies in one buffer, as a pipelined read
        // would deliver them
        let mut buf = BytesMut::new();
        for _ in 0..2 {
            buf.extend_from_slice(&frame(b'1', b""));
            buf.extend_from_slice(&frame(b'2', b""));
            buf.extend_from_slice(&frame(b'C', b"SELECT 0\0"));
            buf.extend_from_slice(&frame(b'Z', b"I"));
        }

        let mut kinds = Vec::new();
        while let Some(frame) = split_frame(&mut buf).unwrap() {
            kinds.push(frame[0]);
        }
        assert_eq!(
            kinds,
            vec![b'1', b'2', b'C', b'Z', b'1', b'2', b'C', b'Z']
        );
    }
}
