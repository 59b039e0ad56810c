use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_IN_FLIGHT: usize = 50;

/// Parallel TCP connect sweep. A port is active iff the connect succeeds
/// within the timeout; per-port failures are silently non-active.
///
/// Returns the active subset in input order.
pub async fn sweep(host: &str, ports: &[u16]) -> Vec<u16> {
    let sem = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut set = JoinSet::new();

    for (idx, &port) in ports.iter().enumerate() {
        let permit = match sem.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let host = host.to_string();
        set.spawn(async move {
            let _permit = permit; // keep permit until the probe completes
            let open = time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
                .await
                .map(|res| res.is_ok())
                .unwrap_or(false);
            open.then_some((idx, port))
        });
    }

    let mut active: Vec<(usize, u16)> = Vec::new();
    while let Some(res) = set.join_next().await {
        if let Ok(Some(hit)) = res {
            active.push(hit);
        }
    }
    active.sort_unstable_by_key(|hit| hit.0);
    active.into_iter().map(|(_, port)| port).collect()
}
