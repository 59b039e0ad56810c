use std::time::Duration;

use ::time::macros::format_description;
use ::time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::time;
use tokio_native_tls::native_tls::{self, Protocol as TlsVersion};
use tokio_native_tls::{TlsConnector, TlsStream};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::types::{CertInfo, TlsProbe};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
/// Assumed when the public key type does not expose a size.
const DEFAULT_KEY_SIZE: u32 = 2048;

/// Probe a TLS endpoint for legacy protocol support and certificate
/// weaknesses. Partial results are valid; every sub-probe failure is
/// swallowed.
pub async fn check_tls(host: &str, port: u16, vhost: Option<&str>) -> TlsProbe {
    let sni = vhost.unwrap_or(host);
    let mut probe = TlsProbe::default();

    // Serial on purpose: two quick handshakes, no fan-out needed.
    for (label, version) in [
        ("TLSv1.0", TlsVersion::Tlsv10),
        ("TLSv1.1", TlsVersion::Tlsv11),
    ] {
        if negotiate(host, port, sni, Some(version)).await.is_some() {
            probe.weak_protocols.push(label.to_string());
        }
    }

    if let Some(info) = fetch_cert_info(host, port, sni).await {
        if info.is_expired {
            probe.vulnerabilities.push("CERT_EXPIRED".to_string());
        }
        if info.key_size < 2048 {
            probe.vulnerabilities.push("WEAK_KEY_SIZE".to_string());
        }
        probe.cert_info = Some(info);
    }

    probe
}

/// Handshake with `sni`, optionally pinned to a single protocol version.
async fn negotiate(
    host: &str,
    port: u16,
    sni: &str,
    version: Option<TlsVersion>,
) -> Option<TlsStream<TcpStream>> {
    let stream = time::timeout(HANDSHAKE_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .ok()?
        .ok()?;
    let mut builder = native_tls::TlsConnector::builder();
    builder
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true);
    if let Some(version) = version {
        builder.min_protocol_version(Some(version));
        builder.max_protocol_version(Some(version));
    }
    let connector = TlsConnector::from(builder.build().ok()?);
    time::timeout(HANDSHAKE_TIMEOUT, connector.connect(sni, stream))
        .await
        .ok()?
        .ok()
}

async fn fetch_cert_info(host: &str, port: u16, sni: &str) -> Option<CertInfo> {
    let tls = negotiate(host, port, sni, None).await?;
    let cert = tls.get_ref().peer_certificate().ok()??;
    let der = cert.to_der().ok()?;
    parse_cert_info(&der)
}

fn parse_cert_info(der: &[u8]) -> Option<CertInfo> {
    let (_rem, x509) = parse_x509_certificate(der).ok()?;

    let not_after = x509.validity().not_after.to_datetime();
    let expiry = not_after
        .format(&format_description!("[year]-[month]-[day]"))
        .ok()?;
    let is_expired = OffsetDateTime::now_utc() > not_after;

    let key_size = match x509.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => rsa.key_size() as u32,
        _ => DEFAULT_KEY_SIZE,
    };

    Some(CertInfo {
        subject: x509.subject().to_string(),
        expiry,
        key_size,
        is_expired,
    })
}
