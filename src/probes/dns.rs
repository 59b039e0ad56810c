use std::time::Duration;

use anyhow::Result;
use hickory_client::client::{AsyncClient, ClientHandle};
use hickory_client::proto::iocompat::AsyncIoTokioAsStd;
use hickory_client::rr::{DNSClass, Name, RecordType};
use hickory_client::tcp::TcpClientStream;
use tokio::net::{lookup_host, TcpStream};
use tokio::time;

use crate::types::DnsProbe;

const AXFR_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_EVIDENCE_RECORDS: usize = 10;

/// Attempt a zone transfer (AXFR) for `domain` against `nameserver:port`.
///
/// A server that answers the transfer leaks its whole zone; the record names
/// are kept as evidence. Errors and empty answers are negative results, never
/// failures.
pub async fn check_zone_transfer(domain: &str, nameserver: &str, port: u16) -> DnsProbe {
    match time::timeout(AXFR_TIMEOUT, try_axfr(domain, nameserver, port)).await {
        Ok(Ok(Some(probe))) => probe,
        Ok(Ok(None)) => not_vulnerable("Connection Refused or No Data".to_string()),
        Ok(Err(e)) => not_vulnerable(format!("探测失败: {e}")),
        Err(_) => not_vulnerable("探测失败: timed out".to_string()),
    }
}

fn not_vulnerable(detail: String) -> DnsProbe {
    DnsProbe {
        vulnerable: false,
        records_count: 0,
        detail,
        records: Vec::new(),
    }
}

async fn try_axfr(domain: &str, nameserver: &str, port: u16) -> Result<Option<DnsProbe>> {
    let addr = match lookup_host((nameserver, port)).await?.next() {
        Some(addr) => addr,
        None => return Ok(None),
    };

    // AXFR only runs over TCP.
    let (stream, sender) = TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::new(addr);
    let (mut client, background) = AsyncClient::new(stream, sender, None).await?;
    tokio::spawn(background);

    let zone = Name::from_ascii(domain)?;
    let response = client.query(zone, DNSClass::IN, RecordType::AXFR).await?;
    let answers = response.answers();
    if answers.is_empty() {
        return Ok(None);
    }

    // Unique owner names, in response order, as leak evidence.
    let mut names: Vec<String> = Vec::new();
    for record in answers {
        let owner = record.name().to_string();
        if !names.contains(&owner) {
            names.push(owner);
        }
    }
    let count = names.len();
    names.truncate(MAX_EVIDENCE_RECORDS);

    Ok(Some(DnsProbe {
        vulnerable: true,
        records_count: count,
        detail: format!("探测到敏感域: {domain}。成功获取到 {count} 条解析记录。"),
        records: names,
    }))
}
