use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, redirect::Policy, Client, StatusCode};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_native_tls::native_tls;
use tokio_native_tls::TlsConnector;
use x509_parser::prelude::*;

use crate::types::{DeepScan, ExposedPath, WebProbe};

pub const USER_AGENT: &str = "NetAudit-Audit-Bot/3.1";

/// Paths probed during the web deep scan.
pub const SENSITIVE_PATHS: &[&str] = &[
    "/.git/config",
    "/.env",
    "/phpinfo.php",
    "/info.php",
    "/.vscode/sftp.json",
    "/admin/",
    "/backup/",
    "/config.php.bak",
    "/.htaccess",
    "/robots.txt",
    "/server-status",
];

/// Response headers whose absence is reported.
pub const SECURITY_HEADERS: &[&str] = &[
    "Content-Security-Policy",
    "X-Frame-Options",
    "X-Content-Type-Options",
    "Strict-Transport-Security",
    "Referrer-Policy",
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);
const PATH_TIMEOUT: Duration = Duration::from_secs(2);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_PATH_PROBES: usize = 5;
const SOFT_404_WINDOW: usize = 200;

fn is_tls_port(port: u16) -> bool {
    matches!(port, 443 | 8443)
}

fn build_client(timeout: Duration) -> Option<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .ok()
}

/// Fingerprint an HTTP(S) service and run the deep scan against it.
///
/// One GET with redirects off and certificate checks disabled; the Server
/// header becomes the banner (`Unknown` when absent). Any failure yields no
/// record.
pub async fn scan_http(host: &str, port: u16, vhost: Option<&str>) -> Option<WebProbe> {
    let scheme = if is_tls_port(port) { "https" } else { "http" };
    let base_url = format!("{scheme}://{host}:{port}");
    let client = build_client(REQUEST_TIMEOUT)?;

    let mut request = client.get(&base_url);
    if let Some(vhost) = vhost {
        request = request.header(header::HOST, vhost);
    }
    let response = request.send().await.ok()?;

    let status = response.status().as_u16();
    let banner = response
        .headers()
        .get(header::SERVER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("Unknown")
        .to_string();
    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
        .collect();
    let missing_headers: Vec<String> = SECURITY_HEADERS
        .iter()
        .filter(|name| !response.headers().contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    let exposed_paths = probe_sensitive_paths(&base_url, vhost).await;

    Some(WebProbe {
        port,
        status,
        banner,
        headers,
        vhost_matched: vhost.unwrap_or(host).to_string(),
        deep_scan: DeepScan {
            exposed_paths,
            missing_headers,
        },
    })
}

/// Fan out over [`SENSITIVE_PATHS`] with a tighter timeout, at most
/// [`MAX_PATH_PROBES`] requests in flight. Results keep the list order.
async fn probe_sensitive_paths(base_url: &str, vhost: Option<&str>) -> Vec<ExposedPath> {
    let client = match build_client(PATH_TIMEOUT) {
        Some(c) => c,
        None => return Vec::new(),
    };
    let base = base_url.trim_end_matches('/').to_string();
    let sem = Arc::new(Semaphore::new(MAX_PATH_PROBES));
    let mut set = JoinSet::new();

    for (idx, path) in SENSITIVE_PATHS.iter().enumerate() {
        let permit = match sem.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let client = client.clone();
        let url = format!("{base}{path}");
        let vhost = vhost.map(str::to_string);
        let path = path.to_string();
        set.spawn(async move {
            let _permit = permit;
            check_path(&client, &url, vhost.as_deref(), path)
                .await
                .map(|hit| (idx, hit))
        });
    }

    let mut hits: Vec<(usize, ExposedPath)> = Vec::new();
    while let Some(res) = set.join_next().await {
        if let Ok(Some(hit)) = res {
            hits.push(hit);
        }
    }
    hits.sort_unstable_by_key(|hit| hit.0);
    hits.into_iter().map(|(_, hit)| hit).collect()
}

async fn check_path(
    client: &Client,
    url: &str,
    vhost: Option<&str>,
    path: String,
) -> Option<ExposedPath> {
    let mut request = client.get(url);
    if let Some(vhost) = vhost {
        request = request.header(header::HOST, vhost);
    }
    let response = request.send().await.ok()?;
    if response.status() != StatusCode::OK {
        return None;
    }
    let status = response.status().as_u16();
    let body = response.bytes().await.ok()?;
    if looks_like_soft_404(&body) {
        return None;
    }
    Some(ExposedPath { path, status })
}

/// A 200 whose leading bytes mention "404" is a soft-404 page, not a hit.
pub(crate) fn looks_like_soft_404(body: &[u8]) -> bool {
    let head = &body[..body.len().min(SOFT_404_WINDOW)];
    String::from_utf8_lossy(head).to_lowercase().contains("404")
}

/// Check whether `vhost` is actually served by `host:port`.
///
/// TLS ports answer through their certificate: any SAN DNS entry (or the CN
/// when SAN is absent) must match. Ports without a working TLS endpoint fall
/// back to a plain GET with a `Host` override, valid unless the server
/// answers 404 or 421.
pub async fn verify_vhost(host: &str, port: u16, vhost: &str) -> bool {
    match verify_vhost_tls(host, port, vhost).await {
        Some(matched) => matched,
        None => verify_vhost_http(host, port, vhost).await,
    }
}

async fn verify_vhost_tls(host: &str, port: u16, vhost: &str) -> Option<bool> {
    let stream = time::timeout(VERIFY_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .ok()?
        .ok()?;
    let builder = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .ok()?;
    let connector = TlsConnector::from(builder);
    let tls = time::timeout(VERIFY_TIMEOUT, connector.connect(vhost, stream))
        .await
        .ok()?
        .ok()?;
    let cert = tls.get_ref().peer_certificate().ok()??;
    let der = cert.to_der().ok()?;
    let (_rem, x509) = parse_x509_certificate(&der).ok()?;
    Some(cert_matches_vhost(&x509, vhost))
}

fn cert_matches_vhost(cert: &X509Certificate<'_>, vhost: &str) -> bool {
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        let dns_names: Vec<&str> = san
            .value
            .general_names
            .iter()
            .filter_map(|gn| match gn {
                GeneralName::DNSName(name) => Some(*name),
                _ => None,
            })
            .collect();
        if !dns_names.is_empty() {
            return dns_names.iter().any(|name| san_matches(name, vhost));
        }
    }
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|cn| cn.eq_ignore_ascii_case(vhost))
        .unwrap_or(false)
}

/// SAN pattern match. A DNS wildcard stands for one or more label characters:
/// `*.example.com` matches `a.example.com` but neither `example.com` nor
/// `a.b.example.com`.
pub(crate) fn san_matches(pattern: &str, vhost: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", "[^.]+");
    match regex::RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(vhost),
        Err(_) => false,
    }
}

async fn verify_vhost_http(host: &str, port: u16, vhost: &str) -> bool {
    let client = match build_client(PATH_TIMEOUT) {
        Some(c) => c,
        None => return false,
    };
    let url = format!("http://{host}:{port}");
    match client.get(&url).header(header::HOST, vhost).send().await {
        Ok(response) => !matches!(response.status().as_u16(), 404 | 421),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_single_label() {
        assert!(san_matches("*.example.com", "a.example.com"));
        assert!(san_matches("*.example.com", "API.Example.Com"));
        assert!(!san_matches("*.example.com", "example.com"));
        assert!(!san_matches("*.example.com", "a.b.example.com"));
    }

    #[test]
    fn literal_san_is_exact_and_case_insensitive() {
        assert!(san_matches("www.example.com", "WWW.example.COM"));
        assert!(!san_matches("www.example.com", "www2.example.com"));
    }

    #[test]
    fn soft_404_filter_reads_leading_window_only() {
        assert!(looks_like_soft_404(b"<html>404 Not Found</html>"));
        assert!(looks_like_soft_404(b"Error 404"));
        let mut late = vec![b'a'; 300];
        late.extend_from_slice(b"404");
        assert!(!looks_like_soft_404(&late));
        assert!(!looks_like_soft_404(b"root:x:0:0"));
    }
}
