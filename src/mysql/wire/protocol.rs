//! MySQL wire protocol: packet framing, parsing and command encoding.
//!
//! Covers the slice of the protocol this driver speaks:
//! - Initial handshake (server greeting)
//! - Handshake response, with an optional SSL request first
//! - COM_QUERY / COM_QUIT
//! - Text result sets (columns + rows) and OK / ERR / EOF packets

use bytes::{BufMut, BytesMut};

/// Packet header: 3-byte little-endian length plus a sequence byte.
pub(crate) const HEADER_SIZE: usize = 4;

pub(crate) const COM_QUIT: u8 = 0x01;
pub(crate) const COM_QUERY: u8 = 0x03;

// Capability bits used in the handshake.
pub(crate) const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
pub(crate) const CLIENT_COMPRESS: u32 = 0x0000_0020;
pub(crate) const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
pub(crate) const CLIENT_SSL: u32 = 0x0000_0800;
pub(crate) const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
pub(crate) const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
pub(crate) const CLIENT_DEPRECATE_EOF: u32 = 0x0100_0000;

/// `client_flags` bits this client cannot honor: compressed framing, the
/// TLS bit (driven by `ssl_ca` instead) and OK-terminated result sets.
pub(crate) const UNSUPPORTED_CLIENT_FLAGS: u32 =
    CLIENT_COMPRESS | CLIENT_SSL | CLIENT_DEPRECATE_EOF;

/// Payloads of exactly this size continue in the next packet.
pub(crate) const MAX_PACKET_SIZE: u32 = 16_777_215;

/// The server itself refuses statements with more fields than this, so a
/// bigger column count can only be a corrupt or hostile header.
pub(crate) const MAX_RESULT_COLUMNS: u64 = 4096;

/// Capabilities this client always announces, plus whatever the
/// `client_flags` setting adds, minus the bits it cannot honor.
pub(crate) fn base_capabilities(extra: u32) -> u32 {
    CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_CONNECT_WITH_DB | CLIENT_PLUGIN_AUTH
        | (extra & !UNSUPPORTED_CLIENT_FLAGS)
}

/// Read a length-encoded integer, advancing `buf` past it.
pub(crate) fn read_lenenc_int(buf: &mut &[u8]) -> Option<u64> {
    let first = *buf.first()?;
    *buf = &buf[1..];
    let value = match first {
        0xfc => {
            let bytes = buf.get(..2)?;
            let value = u16::from_le_bytes([bytes[0], bytes[1]]) as u64;
            *buf = &buf[2..];
            value
        }
        0xfd => {
            let bytes = buf.get(..3)?;
            let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) as u64;
            *buf = &buf[3..];
            value
        }
        0xfe => {
            let bytes = buf.get(..8)?;
            let value = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            *buf = &buf[8..];
            value
        }
        // 0xfb is the NULL marker and 0xff an error header; neither starts
        // a valid integer.
        0xfb | 0xff => return None,
        n => n as u64,
    };
    Some(value)
}

/// Read a length-encoded byte string, advancing `buf` past it.
pub(crate) fn read_lenenc_bytes(buf: &mut &[u8]) -> Option<Vec<u8>> {
    let len = read_lenenc_int(buf)? as usize;
    let bytes = buf.get(..len)?.to_vec();
    *buf = &buf[len..];
    Some(bytes)
}

/// Read up to a NUL byte (or the end of the buffer), advancing `buf`.
pub(crate) fn read_null_terminated(buf: &mut &[u8]) -> Vec<u8> {
    match buf.iter().position(|&b| b == 0) {
        Some(pos) => {
            let bytes = buf[..pos].to_vec();
            *buf = &buf[pos + 1..];
            bytes
        }
        None => {
            let bytes = buf.to_vec();
            *buf = &[];
            bytes
        }
    }
}

/// Initial handshake packet from the server.
#[derive(Debug)]
pub(crate) struct ServerHandshake {
    pub server_version: String,
    pub scramble: Vec<u8>,
    pub capabilities: u32,
    pub character_set: u8,
    pub auth_plugin: String,
}

impl ServerHandshake {
    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let mut buf = data;

        // Protocol version; everything current speaks 10.
        if *buf.first()? != 10 {
            return None;
        }
        buf = &buf[1..];

        let server_version = String::from_utf8_lossy(&read_null_terminated(&mut buf)).into_owned();
        buf = buf.get(4..)?; // connection id

        // Auth plugin data, part 1.
        let mut scramble = buf.get(..8)?.to_vec();
        buf = buf.get(9..)?; // 8 scramble bytes + filler

        let cap_lower = u16::from_le_bytes([*buf.first()?, *buf.get(1)?]) as u32;
        buf = &buf[2..];
        let character_set = *buf.first()?;
        buf = &buf[1..];
        buf = buf.get(2..)?; // status flags
        let cap_upper = u16::from_le_bytes([*buf.first()?, *buf.get(1)?]) as u32;
        buf = &buf[2..];
        let capabilities = cap_lower | (cap_upper << 16);

        let auth_data_len = *buf.first()? as usize;
        buf = buf.get(11..)?; // length byte + 10 reserved bytes

        // Auth plugin data, part 2.
        if auth_data_len > 8 {
            let part2 = (auth_data_len - 8).min(buf.len());
            scramble.extend_from_slice(&buf[..part2]);
            buf = &buf[part2..];
        }
        while scramble.last() == Some(&0) {
            scramble.pop();
        }

        let auth_plugin = String::from_utf8_lossy(&read_null_terminated(&mut buf)).into_owned();

        Some(Self {
            server_version,
            scramble,
            capabilities,
            character_set,
            auth_plugin,
        })
    }
}

/// OK packet payload (leading 0x00 included in `data`).
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct OkPacket {
    pub affected_rows: u64,
}

impl OkPacket {
    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let mut buf = data.get(1..)?;
        let affected_rows = read_lenenc_int(&mut buf)?;
        let _last_insert_id = read_lenenc_int(&mut buf)?;
        Some(Self { affected_rows })
    }
}

/// ERR packet: server error code plus human-readable message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ErrPacket {
    pub code: u16,
    pub message: String,
}

impl ErrPacket {
    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let mut buf = data.get(1..)?; // 0xff marker
        let code = u16::from_le_bytes([*buf.first()?, *buf.get(1)?]);
        buf = &buf[2..];

        // Protocol 4.1 prefixes the message with '#' and a 5-byte sqlstate.
        if buf.first() == Some(&b'#') {
            buf = buf.get(6..)?;
        }
        let message = String::from_utf8_lossy(buf).into_owned();
        Some(Self { code, message })
    }
}

/// EOF packets mark the end of the column list and of the row stream.
pub(crate) fn is_eof(packet: &[u8]) -> bool {
    packet.first() == Some(&0xfe) && packet.len() < 9
}

/// Column definition packet from a result set header.
#[derive(Debug, Clone)]
pub(crate) struct ColumnDef {
    pub name: String,
}

impl ColumnDef {
    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let mut buf = data;
        for _ in 0..4 {
            read_lenenc_bytes(&mut buf)?; // catalog, schema, table, org_table
        }
        let name = String::from_utf8_lossy(&read_lenenc_bytes(&mut buf)?).into_owned();
        Some(Self { name })
    }
}

/// Parse one text-protocol row packet; `None` in the output is SQL NULL.
pub(crate) fn parse_row(data: &[u8], columns: usize) -> Option<Vec<Option<String>>> {
    let mut buf = data;
    let mut values = Vec::with_capacity(columns);
    for _ in 0..columns {
        if buf.first() == Some(&0xfb) {
            buf = &buf[1..];
            values.push(None);
        } else {
            let bytes = read_lenenc_bytes(&mut buf)?;
            values.push(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
    }
    Some(values)
}

/// Frame `payload` with the packet header.
pub(crate) fn frame_packet(seq: u8, payload: &[u8]) -> BytesMut {
    let len = payload.len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);
    buf.put_u8((len & 0xff) as u8);
    buf.put_u8(((len >> 8) & 0xff) as u8);
    buf.put_u8(((len >> 16) & 0xff) as u8);
    buf.put_u8(seq);
    buf.put_slice(payload);
    buf
}

/// Encode the SSL request sent before the TLS upgrade.
pub(crate) fn encode_ssl_request(capabilities: u32, character_set: u8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(32);
    buf.put_u32_le(capabilities | CLIENT_SSL);
    buf.put_u32_le(MAX_PACKET_SIZE);
    buf.put_u8(character_set);
    buf.put_slice(&[0u8; 23]);
    buf
}

/// Encode the handshake response (client authentication).
pub(crate) fn encode_handshake_response(
    capabilities: u32,
    character_set: u8,
    user: &str,
    auth_response: &[u8],
    database: &str,
    auth_plugin: &str,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_u32_le(capabilities);
    buf.put_u32_le(MAX_PACKET_SIZE);
    buf.put_u8(character_set);
    buf.put_slice(&[0u8; 23]);
    buf.put_slice(user.as_bytes());
    buf.put_u8(0);
    buf.put_u8(auth_response.len() as u8);
    buf.put_slice(auth_response);
    buf.put_slice(database.as_bytes());
    buf.put_u8(0);
    buf.put_slice(auth_plugin.as_bytes());
    buf.put_u8(0);
    buf
}

/// Encode a COM_QUERY command.
pub(crate) fn encode_query(sql: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(1 + sql.len());
    buf.put_u8(COM_QUERY);
    buf.put_slice(sql.as_bytes());
    buf
}

/// Encode a COM_QUIT command.
pub(crate) fn encode_quit() -> BytesMut {
    let mut buf = BytesMut::with_capacity(1);
    buf.put_u8(COM_QUIT);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A plausible MySQL 8 greeting: protocol 10, 20-byte scramble split in
    /// two parts, caching_sha2_password announced.
    fn greeting() -> Vec<u8> {
        let mut data = vec![10];
        data.extend_from_slice(b"8.0.36\0");
        data.extend_from_slice(&42u32.to_le_bytes()); // connection id
        data.extend_from_slice(b"abcdefgh"); // scramble part 1
        data.push(0); // filler
        data.extend_from_slice(&0x880au16.to_le_bytes()); // caps lower
        data.push(33); // utf8 charset
        data.extend_from_slice(&2u16.to_le_bytes()); // status
        data.extend_from_slice(&0x0008u16.to_le_bytes()); // caps upper
        data.push(21); // auth data length
        data.extend_from_slice(&[0u8; 10]); // reserved
        data.extend_from_slice(b"ijklmnopqrst\0"); // scramble part 2
        data.extend_from_slice(b"caching_sha2_password\0");
        data
    }

    #[test]
    fn test_parse_server_handshake() {
        let handshake = ServerHandshake::parse(&greeting()).unwrap();

        assert_eq!(handshake.server_version, "8.0.36");
        assert_eq!(handshake.scramble, b"abcdefghijklmnopqrst");
        assert_eq!(handshake.character_set, 33);
        assert_eq!(handshake.auth_plugin, "caching_sha2_password");
        assert_eq!(handshake.capabilities, 0x0008_880a);
    }

    #[test]
    fn test_parse_truncated_handshake() {
        let data = greeting();
        assert!(ServerHandshake::parse(&data[..20]).is_none());
    }

    #[test]
    fn test_lenenc_int_prefixes() {
        let mut buf: &[u8] = &[0xfa];
        assert_eq!(read_lenenc_int(&mut buf), Some(0xfa));

        let mut buf: &[u8] = &[0xfc, 0x10, 0x27];
        assert_eq!(read_lenenc_int(&mut buf), Some(10000));

        let mut buf: &[u8] = &[0xfd, 0x01, 0x00, 0x10];
        assert_eq!(read_lenenc_int(&mut buf), Some(0x10_0001));

        let mut buf: &[u8] = &[0xfe, 1, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_lenenc_int(&mut buf), Some(1));

        // Truncated two-byte form.
        let mut buf: &[u8] = &[0xfc, 0x10];
        assert_eq!(read_lenenc_int(&mut buf), None);
    }

    #[test]
    fn test_parse_err_packet_with_sqlstate() {
        let mut data = vec![0xff];
        data.extend_from_slice(&1146u16.to_le_bytes());
        data.extend_from_slice(b"#42S02Table 'mail.users' doesn't exist");

        let err = ErrPacket::parse(&data).unwrap();
        assert_eq!(err.code, 1146);
        assert_eq!(err.message, "Table 'mail.users' doesn't exist");
    }

    #[test]
    fn test_parse_err_packet_without_sqlstate() {
        let mut data = vec![0xff];
        data.extend_from_slice(&1045u16.to_le_bytes());
        data.extend_from_slice(b"Access denied");

        let err = ErrPacket::parse(&data).unwrap();
        assert_eq!(err.code, 1045);
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn test_parse_ok_packet() {
        // 0x00, affected = 3, last insert id = 0
        let ok = OkPacket::parse(&[0x00, 0x03, 0x00, 0x02, 0x00]).unwrap();
        assert_eq!(ok.affected_rows, 3);
    }

    #[test]
    fn test_eof_detection() {
        assert!(is_eof(&[0xfe, 0x00, 0x00, 0x02, 0x00]));
        // A row whose first value is lenenc-64-bit starts with 0xfe but the
        // packet is longer.
        assert!(!is_eof(&[0xfe, 1, 0, 0, 0, 0, 0, 0, 0, 5, b'h']));
        assert!(!is_eof(&[0x00]));
    }

    #[test]
    fn test_parse_column_def() {
        let mut data = Vec::new();
        for part in [&b"def"[..], b"mail", b"users", b"users"] {
            data.push(part.len() as u8);
            data.extend_from_slice(part);
        }
        data.push(6);
        data.extend_from_slice(b"userid"); // name
        data.push(3);
        data.extend_from_slice(b"uid"); // org_name
        data.extend_from_slice(&[0x0c, 33, 0, 255, 0, 0, 0, 253, 0, 0, 0, 0, 0]);

        let col = ColumnDef::parse(&data).unwrap();
        assert_eq!(col.name, "userid");
    }

    #[test]
    fn test_parse_row_with_null() {
        // "jane", NULL, "x"
        let data = [4, b'j', b'a', b'n', b'e', 0xfb, 1, b'x'];
        let row = parse_row(&data, 3).unwrap();
        assert_eq!(row, vec![Some("jane".to_string()), None, Some("x".to_string())]);
    }

    #[test]
    fn test_frame_packet_header() {
        let framed = frame_packet(1, &[0xab; 300]);
        assert_eq!(&framed[..4], &[0x2c, 0x01, 0x00, 0x01]);
        assert_eq!(framed.len(), 304);
    }

    #[test]
    fn test_unsupported_client_flags_are_dropped() {
        // CLIENT_FOUND_ROWS (0x2) passes through, the rest must not.
        let caps = base_capabilities(CLIENT_COMPRESS | CLIENT_DEPRECATE_EOF | CLIENT_SSL | 0x2);

        assert_eq!(caps & CLIENT_COMPRESS, 0);
        assert_eq!(caps & CLIENT_DEPRECATE_EOF, 0);
        assert_eq!(caps & CLIENT_SSL, 0);
        assert_ne!(caps & 0x2, 0);
        assert_ne!(caps & CLIENT_PROTOCOL_41, 0);
    }
}
