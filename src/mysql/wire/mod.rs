//! Production transport: the MySQL client protocol over blocking sockets.
//!
//! [`WireConnector`] dials TCP or a unix socket, optionally upgrades to TLS
//! (when a CA is configured), authenticates, and yields a [`WireLink`] that
//! runs one statement at a time. Replies are buffered in full before they
//! are handed to the pool, so the link is always quiescent between queries.

mod auth;
mod protocol;
mod stream;

use crate::mysql::link::{Connector, FieldDef, LinkError, QueryReply, Row, Rows, ServerLink};
use crate::mysql::settings::MySqlSettings;

use auth::{scramble_caching_sha2, scramble_native_password};
use stream::NetStream;

/// [`Connector`] speaking the MySQL wire protocol.
pub struct WireConnector;

impl WireConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WireConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WireConnector {
    fn connect(
        &self,
        host: &str,
        settings: &MySqlSettings,
    ) -> Result<Box<dyn ServerLink>, LinkError> {
        Ok(Box::new(WireLink::open(host, settings)?))
    }
}

/// One authenticated protocol session.
pub struct WireLink {
    stream: NetStream,
    sequence: u8,
}

impl WireLink {
    fn open(host: &str, settings: &MySqlSettings) -> Result<Self, LinkError> {
        let mut stream = stream::dial(host, settings.effective_port())?;

        let (greeting, mut seq) = read_packet(&mut stream)?;
        if greeting.first() == Some(&0xff) {
            return Err(parse_server_error(&greeting));
        }
        let handshake = protocol::ServerHandshake::parse(&greeting)
            .ok_or_else(|| LinkError::Protocol("cannot parse server handshake".into()))?;

        let caching_sha2 = handshake.auth_plugin == "caching_sha2_password";
        let dropped_flags = settings.client_flags & protocol::UNSUPPORTED_CLIENT_FLAGS;
        if dropped_flags != 0 {
            tracing::warn!("ignoring unsupported client_flags {dropped_flags:#x}");
        }
        let mut capabilities = protocol::base_capabilities(settings.client_flags);
        let tls = settings.uses_tls(host);
        if settings.ssl_enabled() && !tls {
            tracing::debug!("skipping TLS for unix socket {host}");
        }

        if tls {
            if handshake.capabilities & protocol::CLIENT_SSL == 0 {
                return Err(LinkError::Protocol(format!(
                    "server at {host} does not support TLS"
                )));
            }
            seq = seq.wrapping_add(1);
            let ssl_request = protocol::encode_ssl_request(capabilities, handshake.character_set);
            write_packet(&mut stream, seq, &ssl_request)?;
            stream = stream.upgrade_tls(stream::tls_config(settings)?, host)?;
            capabilities |= protocol::CLIENT_SSL;
        }

        let password = settings.password.as_deref().unwrap_or("");
        let auth_response: Vec<u8> = if password.is_empty() {
            Vec::new()
        } else if caching_sha2 {
            scramble_caching_sha2(password.as_bytes(), &handshake.scramble).to_vec()
        } else {
            scramble_native_password(password.as_bytes(), &handshake.scramble).to_vec()
        };

        let plugin = if caching_sha2 {
            "caching_sha2_password"
        } else {
            "mysql_native_password"
        };
        let response = protocol::encode_handshake_response(
            capabilities,
            handshake.character_set,
            settings.user.as_deref().unwrap_or(""),
            &auth_response,
            settings.dbname.as_deref().unwrap_or(""),
            plugin,
        );
        seq = seq.wrapping_add(1);
        write_packet(&mut stream, seq, &response)?;

        // A local socket carries cleartext auth data as safely as TLS.
        let secure_channel = tls || host.starts_with('/');
        let mut link = Self { stream, sequence: seq };
        link.finish_auth(password, caching_sha2, secure_channel)?;
        tracing::debug!("Authenticated to MySQL {} at {}", handshake.server_version, host);
        Ok(link)
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.sequence = self.sequence.wrapping_add(1);
        write_packet(&mut self.stream, self.sequence, payload)
    }

    fn recv(&mut self) -> Result<Vec<u8>, LinkError> {
        let (payload, seq) = read_packet(&mut self.stream)?;
        self.sequence = seq;
        Ok(payload)
    }

    /// Handle the server's answer to the handshake response.
    fn finish_auth(
        &mut self,
        password: &str,
        caching_sha2: bool,
        secure_channel: bool,
    ) -> Result<(), LinkError> {
        let packet = self.recv()?;
        match packet.first().copied() {
            Some(0x00) => Ok(()),
            Some(0x01) if caching_sha2 => match packet.get(1) {
                // Fast auth hit the server's cache; an OK packet follows.
                Some(&0x03) => expect_auth_ok(&self.recv()?),
                // Full auth wants the password itself; only send it over
                // TLS or a local socket.
                Some(&0x04) => {
                    if !secure_channel {
                        return Err(LinkError::Protocol(
                            "server requires caching_sha2 full authentication; \
                             configure ssl_ca to enable TLS"
                                .into(),
                        ));
                    }
                    let mut cleartext = password.as_bytes().to_vec();
                    cleartext.push(0);
                    self.send(&cleartext)?;
                    expect_auth_ok(&self.recv()?)
                }
                other => Err(LinkError::Protocol(format!(
                    "unexpected auth continuation: {other:?}"
                ))),
            },
            Some(0xfe) => {
                // AuthSwitchRequest: plugin name plus a fresh scramble.
                let mut buf = packet.get(1..).unwrap_or(&[]);
                let plugin =
                    String::from_utf8_lossy(&protocol::read_null_terminated(&mut buf)).into_owned();
                let scramble: Vec<u8> = buf.iter().copied().take_while(|&b| b != 0).collect();
                let response = if password.is_empty() {
                    Vec::new()
                } else {
                    match plugin.as_str() {
                        "mysql_native_password" => {
                            scramble_native_password(password.as_bytes(), &scramble).to_vec()
                        }
                        "caching_sha2_password" => {
                            scramble_caching_sha2(password.as_bytes(), &scramble).to_vec()
                        }
                        other => {
                            return Err(LinkError::Protocol(format!(
                                "unsupported auth plugin: {other}"
                            )));
                        }
                    }
                };
                self.send(&response)?;
                expect_auth_ok(&self.recv()?)
            }
            Some(0xff) => Err(parse_server_error(&packet)),
            _ => Err(LinkError::Protocol("unexpected authentication reply".into())),
        }
    }

    fn read_result_set(&mut self, header: &[u8]) -> Result<QueryReply, LinkError> {
        let mut buf = header;
        let column_count = protocol::read_lenenc_int(&mut buf)
            .ok_or_else(|| LinkError::Protocol("cannot parse column count".into()))?;
        // The count comes off the wire; cap it before it sizes anything.
        if column_count == 0 || column_count > protocol::MAX_RESULT_COLUMNS {
            return Err(LinkError::Protocol(format!(
                "result set claims {column_count} columns"
            )));
        }
        let column_count = column_count as usize;

        let mut fields = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let packet = self.recv()?;
            let column = protocol::ColumnDef::parse(&packet)
                .ok_or_else(|| LinkError::Protocol("cannot parse column definition".into()))?;
            fields.push(FieldDef { name: column.name });
        }

        let eof = self.recv()?;
        if !protocol::is_eof(&eof) {
            return Err(LinkError::Protocol(
                "missing EOF after column definitions".into(),
            ));
        }

        // From here on the statement has run on the server; a break is
        // recorded on the result instead of failing the dispatch, so the
        // rows that did arrive are still served.
        let mut rows: Vec<Row> = Vec::new();
        let mut tail = None;
        loop {
            let packet = match self.recv() {
                Ok(packet) => packet,
                Err(err) => {
                    tail = Some(err);
                    break;
                }
            };
            if protocol::is_eof(&packet) {
                break;
            }
            if packet.first() == Some(&0xff) {
                tail = Some(parse_server_error(&packet));
                break;
            }
            match protocol::parse_row(&packet, fields.len()) {
                Some(row) => rows.push(row),
                None => {
                    tail = Some(LinkError::Protocol("cannot parse row packet".into()));
                    break;
                }
            }
        }

        Ok(QueryReply::ResultSet(Rows::new(fields, rows, tail)))
    }
}

impl ServerLink for WireLink {
    fn run_query(&mut self, query: &str) -> Result<QueryReply, LinkError> {
        // Commands restart the sequence counter.
        self.sequence = 0;
        write_packet(&mut self.stream, 0, &protocol::encode_query(query))?;

        let packet = self.recv()?;
        match packet.first().copied() {
            Some(0x00) => {
                let ok = protocol::OkPacket::parse(&packet)
                    .ok_or_else(|| LinkError::Protocol("cannot parse OK packet".into()))?;
                Ok(QueryReply::Done {
                    affected_rows: ok.affected_rows,
                })
            }
            Some(0xff) => Err(parse_server_error(&packet)),
            Some(0xfb) => Err(LinkError::Protocol("LOCAL INFILE is not supported".into())),
            _ => self.read_result_set(&packet),
        }
    }
}

impl Drop for WireLink {
    fn drop(&mut self) {
        let _ = write_packet(&mut self.stream, 0, &protocol::encode_quit());
    }
}

fn read_packet(stream: &mut NetStream) -> Result<(Vec<u8>, u8), LinkError> {
    let mut payload = Vec::new();
    loop {
        let mut header = [0u8; protocol::HEADER_SIZE];
        stream.read_exact(&mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let seq = header[3];
        let start = payload.len();
        payload.resize(start + len, 0);
        stream.read_exact(&mut payload[start..])?;
        // A maximum-length payload continues in the next packet.
        if len < protocol::MAX_PACKET_SIZE as usize {
            return Ok((payload, seq));
        }
    }
}

fn write_packet(stream: &mut NetStream, seq: u8, payload: &[u8]) -> Result<(), LinkError> {
    let framed = protocol::frame_packet(seq, payload);
    stream.write_all(&framed)?;
    Ok(())
}

fn parse_server_error(packet: &[u8]) -> LinkError {
    match protocol::ErrPacket::parse(packet) {
        Some(err) => LinkError::Server {
            code: err.code,
            message: err.message,
        },
        None => LinkError::Protocol("cannot parse server error packet".into()),
    }
}

fn expect_auth_ok(packet: &[u8]) -> Result<(), LinkError> {
    match packet.first().copied() {
        Some(0x00) => Ok(()),
        Some(0xff) => Err(parse_server_error(packet)),
        _ => Err(LinkError::Protocol("unexpected authentication reply".into())),
    }
}
