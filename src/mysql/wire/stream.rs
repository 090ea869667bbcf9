//! Blocking byte streams: plain TCP, TLS, or a unix socket.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::mysql::link::LinkError;
use crate::mysql::settings::MySqlSettings;

/// One established transport to a server.
pub(crate) enum NetStream {
    Tcp(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl NetStream {
    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match self {
            NetStream::Tcp(stream) => stream.read_exact(buf),
            NetStream::Tls(stream) => stream.read_exact(buf),
            #[cfg(unix)]
            NetStream::Unix(stream) => stream.read_exact(buf),
        }
    }

    pub(crate) fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            NetStream::Tcp(stream) => stream.write_all(buf),
            NetStream::Tls(stream) => stream.write_all(buf),
            #[cfg(unix)]
            NetStream::Unix(stream) => stream.write_all(buf),
        }
    }

    /// Wrap the plain TCP stream in TLS. The SSL request packet must
    /// already have been written.
    pub(crate) fn upgrade_tls(self, config: Arc<ClientConfig>, host: &str) -> Result<Self, LinkError> {
        let NetStream::Tcp(tcp) = self else {
            return Err(LinkError::Protocol("TLS upgrade on a non-TCP stream".into()));
        };
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| LinkError::Protocol(format!("invalid TLS server name: {host}")))?;
        let conn = ClientConnection::new(config, server_name)
            .map_err(|err| LinkError::ConnectionLost(format!("TLS setup failed: {err}")))?;
        Ok(NetStream::Tls(Box::new(StreamOwned::new(conn, tcp))))
    }
}

/// Open the raw transport for `host`. A host beginning with `/` is a unix
/// socket path.
pub(crate) fn dial(host: &str, port: u16) -> io::Result<NetStream> {
    #[cfg(unix)]
    if host.starts_with('/') {
        return Ok(NetStream::Unix(UnixStream::connect(host)?));
    }
    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(true)?;
    Ok(NetStream::Tcp(stream))
}

/// Build the rustls client config from the `ssl_*` settings.
///
/// Only called when a CA was configured; there is no default root store.
/// The `ssl_cipher` preference cannot be mapped onto rustls, which
/// negotiates from its own suite list.
pub(crate) fn tls_config(settings: &MySqlSettings) -> Result<Arc<ClientConfig>, LinkError> {
    let mut roots = RootCertStore::empty();
    if let Some(ca) = &settings.ssl_ca {
        add_pem_roots(&mut roots, Path::new(ca))?;
    }
    if let Some(dir) = &settings.ssl_ca_path {
        let entries = std::fs::read_dir(dir)
            .map_err(|err| LinkError::ConnectionLost(format!("cannot read {dir}: {err}")))?;
        for entry in entries {
            let entry =
                entry.map_err(|err| LinkError::ConnectionLost(format!("cannot read {dir}: {err}")))?;
            if entry.path().is_file() {
                add_pem_roots(&mut roots, &entry.path())?;
            }
        }
    }
    if roots.is_empty() {
        return Err(LinkError::Protocol(
            "no usable CA certificates in ssl_ca / ssl_ca_path".into(),
        ));
    }
    tracing::debug!(
        "TLS enabled, {} roots loaded (ssl_cipher={} ignored, rustls picks its own suites)",
        roots.len(),
        settings.ssl_cipher
    );

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match (&settings.ssl_cert, &settings.ssl_key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|err| LinkError::Protocol(format!("bad client certificate: {err}")))?,
        _ => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<(), LinkError> {
    let file = File::open(path).map_err(|err| {
        LinkError::ConnectionLost(format!("cannot read CA {}: {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|err| {
            LinkError::Protocol(format!("bad certificate in {}: {err}", path.display()))
        })?;
        roots.add(cert).map_err(|err| {
            LinkError::Protocol(format!("rejected certificate in {}: {err}", path.display()))
        })?;
    }
    Ok(())
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, LinkError> {
    let file = File::open(path)
        .map_err(|err| LinkError::ConnectionLost(format!("cannot read {path}: {err}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| LinkError::Protocol(format!("bad certificate in {path}: {err}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, LinkError> {
    let file = File::open(path)
        .map_err(|err| LinkError::ConnectionLost(format!("cannot read {path}: {err}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| LinkError::Protocol(format!("bad private key in {path}: {err}")))?
        .ok_or_else(|| LinkError::Protocol(format!("no private key in {path}")))
}
