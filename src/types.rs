use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scan submission accepted by the API and handed to the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    #[serde(default)]
    pub domains: Vec<String>,
    pub port_range: String,
    #[serde(default)]
    pub ports_config: HashMap<String, String>,
    #[serde(default)]
    pub dictionaries: HashMap<String, String>,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default)]
    pub enable_brute: bool,
    /// When set, virtual hosts that fail certificate/Host verification are
    /// skipped before web probing. Off by default: probe all supplied hosts.
    #[serde(default)]
    pub verify_vhosts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanMode {
    #[default]
    #[serde(rename = "快速扫描")]
    Quick,
    #[serde(rename = "深度审计")]
    Deep,
}

/// Protocol tag attached to findings by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "SSH")]
    Ssh,
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
    #[serde(rename = "DNS")]
    Dns,
    #[serde(rename = "TCP")]
    Tcp,
}

/// Localized risk label used on the report wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "高危")]
    High,
    #[serde(rename = "中危")]
    Medium,
    #[serde(rename = "低危")]
    Low,
    #[serde(rename = "安全")]
    Safe,
}

/// One normalized defect produced by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub protocol: Protocol,
    pub check_item: String,
    pub risk_level: RiskLabel,
    pub description: String,
    pub detail_value: String,
    pub suggestion: String,
    pub mlps_clause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Service tag for the per-port status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceTag {
    #[serde(rename = "SSH")]
    Ssh,
    #[serde(rename = "WEB")]
    Web,
    #[serde(rename = "DNS")]
    Dns,
    #[serde(rename = "TCP")]
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortStatusRow {
    pub port: u16,
    pub protocol: ServiceTag,
    pub status: String,
    pub detail: String,
}

impl PortStatusRow {
    pub fn open(port: u16, protocol: ServiceTag, detail: impl Into<String>) -> Self {
        Self {
            port,
            protocol,
            status: "OPEN".to_string(),
            detail: detail.into(),
        }
    }
}

/// Counts of localized risk levels; 安全 findings are intentionally omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Finished audit report, as persisted and served to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub target: String,
    pub score: i64,
    pub timestamp: String,
    pub defects: Vec<Finding>,
    pub port_statuses: Vec<PortStatusRow>,
    pub summary: RiskSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub percent: u8,
    pub log: String,
}

/// Task record observable through the status endpoint. Mutated only by the
/// owning scan worker; running → completed/failed transitions are terminal.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub status: TaskStatus,
    pub result: Option<Report>,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A credential pair confirmed against the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub pass: String,
}

/// Sensitive path confirmed reachable during the web deep scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPath {
    pub path: String,
    pub status: u16,
}

#[derive(Debug, Clone, Default)]
pub struct DeepScan {
    pub exposed_paths: Vec<ExposedPath>,
    pub missing_headers: Vec<String>,
}

/// Raw record from one HTTP(S) probe.
#[derive(Debug, Clone)]
pub struct WebProbe {
    pub port: u16,
    pub status: u16,
    pub banner: String,
    pub headers: HashMap<String, String>,
    pub vhost_matched: String,
    pub deep_scan: DeepScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub subject: String,
    pub expiry: String,
    pub key_size: u32,
    pub is_expired: bool,
}

/// Raw record from the TLS prober. Partial results are valid: any sub-probe
/// that fails simply leaves its field empty.
#[derive(Debug, Clone, Default)]
pub struct TlsProbe {
    pub weak_protocols: Vec<String>,
    pub cert_info: Option<CertInfo>,
    pub vulnerabilities: Vec<String>,
}

/// Raw record from the zone-transfer probe.
#[derive(Debug, Clone)]
pub struct DnsProbe {
    pub vulnerable: bool,
    pub records_count: usize,
    pub detail: String,
    pub records: Vec<String>,
}

/// Protocol-specific evidence handed to the analyzer alongside the banner.
#[derive(Debug, Clone, Default)]
pub enum ServiceExtra {
    #[default]
    None,
    Ssh {
        weak_creds: Vec<Credential>,
    },
    /// HTTP and HTTPS share a variant; the TLS record is only present for
    /// ports probed in the HTTPS role.
    Web {
        web: Option<WebProbe>,
        tls: Option<TlsProbe>,
    },
    Dns(DnsProbe),
}
