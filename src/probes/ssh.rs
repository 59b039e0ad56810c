use std::net::{TcpStream as StdTcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use ssh2::Session;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::types::Credential;

const BANNER_READ_LIMIT: usize = 1024;
const BANNER_TIMEOUT: Duration = Duration::from_secs(3);
const AUTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const AUTH_SESSION_TIMEOUT_MS: u32 = 10_000;
const MAX_AUTH_IN_FLIGHT: usize = 5;
const TRANSPORT_RETRIES: u32 = 2;
const SLOW_BACKOFF: Duration = Duration::from_secs(2);
const FAST_BACKOFF: Duration = Duration::from_millis(500);
const INTER_ATTEMPT_GAP: Duration = Duration::from_millis(100);

// libssh2 status codes consulted when classifying a failed attempt.
const LIBSSH2_ERROR_BANNER_RECV: i32 = -2;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;

/// Grab the SSH identification banner.
///
/// Reads up to 1 KiB with a short timeout and decodes lossily. An open port
/// that stays silent yields the synthetic `SSH-2.0-Generic` marker; any
/// failure yields `SSH Connection Refused`. Never errors.
pub async fn banner_grab(host: &str, port: u16) -> String {
    match try_banner(host, port).await {
        Some(banner) => banner,
        None => "SSH Connection Refused".to_string(),
    }
}

async fn try_banner(host: &str, port: u16) -> Option<String> {
    let mut stream = time::timeout(BANNER_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .ok()?
        .ok()?;
    let mut buf = vec![0u8; BANNER_READ_LIMIT];
    let n = time::timeout(BANNER_TIMEOUT, stream.read(&mut buf))
        .await
        .ok()?
        .ok()?;
    let banner = String::from_utf8_lossy(&buf[..n]).trim().to_string();
    Some(if banner.is_empty() {
        "SSH-2.0-Generic".to_string()
    } else {
        banner
    })
}

/// Concurrent password audit over the cartesian product of the cleaned
/// dictionaries, at most [`MAX_AUTH_IN_FLIGHT`] attempts in flight.
///
/// The first confirmed credential cancels everything still pending and is
/// returned alone; the result is always empty or a single entry. All failure
/// conditions are swallowed.
pub async fn brute_force(
    host: &str,
    port: u16,
    usernames: &[String],
    passwords: &[String],
) -> Vec<Credential> {
    let users = clean(usernames);
    let passes = clean(passwords);
    if users.is_empty() || passes.is_empty() {
        return Vec::new();
    }

    let cancel = CancellationToken::new();
    let sem = Arc::new(Semaphore::new(MAX_AUTH_IN_FLIGHT));
    let mut set = JoinSet::new();

    for user in &users {
        for pass in &passes {
            let cancel = cancel.clone();
            let sem = sem.clone();
            let host = host.to_string();
            let user = user.clone();
            let pass = pass.clone();
            set.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return None,
                };
                // Work queued behind a success is refused, not attempted.
                if cancel.is_cancelled() {
                    return None;
                }
                let attempt_cancel = cancel.clone();
                let found = tokio::task::spawn_blocking(move || {
                    attempt_login(&host, port, &user, &pass, &attempt_cancel)
                })
                .await
                .ok()
                .flatten();
                // Small gap between completions keeps burst pressure down.
                time::sleep(INTER_ATTEMPT_GAP).await;
                found
            });
        }
    }

    while let Some(res) = set.join_next().await {
        if let Ok(Some(cred)) = res {
            cancel.cancel();
            set.abort_all();
            return vec![cred];
        }
    }
    Vec::new()
}

fn clean(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

enum Attempt {
    Success(Credential),
    /// Wrong user or password. Expected control signal, never retried.
    AuthFailed,
    Transport {
        slow: bool,
    },
}

/// One credential attempt with transport-level retries. Auth rejections end
/// the attempt immediately; transport errors are retried up to
/// [`TRANSPORT_RETRIES`] times with a backoff matched to the error class.
fn attempt_login(
    host: &str,
    port: u16,
    user: &str,
    pass: &str,
    cancel: &CancellationToken,
) -> Option<Credential> {
    let mut transport_errors = 0;
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        match try_auth(host, port, user, pass) {
            Attempt::Success(cred) => return Some(cred),
            Attempt::AuthFailed => return None,
            Attempt::Transport { slow } => {
                transport_errors += 1;
                if transport_errors > TRANSPORT_RETRIES {
                    return None;
                }
                std::thread::sleep(if slow { SLOW_BACKOFF } else { FAST_BACKOFF });
            }
        }
    }
}

fn try_auth(host: &str, port: u16, user: &str, pass: &str) -> Attempt {
    let addr = match (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
    {
        Some(addr) => addr,
        None => return Attempt::Transport { slow: false },
    };

    let stream = match StdTcpStream::connect_timeout(&addr, AUTH_CONNECT_TIMEOUT) {
        Ok(s) => s,
        Err(_) => return Attempt::Transport { slow: false },
    };
    let io_timeout = Duration::from_millis(u64::from(AUTH_SESSION_TIMEOUT_MS));
    let _ = stream.set_read_timeout(Some(io_timeout));
    let _ = stream.set_write_timeout(Some(io_timeout));

    let mut session = match Session::new() {
        Ok(s) => s,
        Err(_) => return Attempt::Transport { slow: false },
    };
    session.set_tcp_stream(stream);
    session.set_timeout(AUTH_SESSION_TIMEOUT_MS);

    // Password only: no key lookup, no agent forwarding.
    if let Err(e) = session.handshake() {
        return Attempt::Transport {
            slow: is_slow_class(&e),
        };
    }
    match session.userauth_password(user, pass) {
        Ok(()) => Attempt::Success(Credential {
            user: user.to_string(),
            pass: pass.to_string(),
        }),
        Err(e) if session_code(&e) == LIBSSH2_ERROR_AUTHENTICATION_FAILED => Attempt::AuthFailed,
        Err(e) => Attempt::Transport {
            slow: is_slow_class(&e),
        },
    }
}

fn session_code(e: &ssh2::Error) -> i32 {
    match e.code() {
        ssh2::ErrorCode::Session(code) => code,
        ssh2::ErrorCode::SFTP(code) => code as i32,
    }
}

/// Banner/timeout-class errors back off longer than plain connect failures.
fn is_slow_class(e: &ssh2::Error) -> bool {
    matches!(
        session_code(e),
        LIBSSH2_ERROR_BANNER_RECV | LIBSSH2_ERROR_TIMEOUT
    )
}
