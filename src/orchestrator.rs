use std::collections::HashSet;
use std::sync::Arc;

use ::time::macros::format_description;
use ::time::OffsetDateTime;
use anyhow::{Context, Result};

use crate::analyzer::{calculate_score, Analyzer};
use crate::history::HistoryStore;
use crate::ports::parse_port_expr;
use crate::probes::{dns, liveness, ssh, tls, web};
use crate::tasks::TaskStore;
use crate::types::{
    Finding, PortStatusRow, Protocol, Report, RiskLabel, RiskSummary, ScanMode, ScanRequest,
    ServiceExtra, ServiceTag,
};

/// Drives one scan end to end: liveness sweep, per-protocol probing,
/// analysis, scoring, persistence, and progress reporting.
///
/// The orchestrator is the only writer of a task's slot while the scan runs;
/// probers hand it raw records and never raise.
pub struct Orchestrator {
    analyzer: Analyzer,
    tasks: TaskStore,
    history: Arc<HistoryStore>,
}

impl Orchestrator {
    pub fn new(analyzer: Analyzer, tasks: TaskStore, history: Arc<HistoryStore>) -> Self {
        Self {
            analyzer,
            tasks,
            history,
        }
    }

    /// Run a scan task to its terminal state. Any error escaping the worker
    /// flips the task to failed; the id stays queryable either way.
    pub async fn run_scan(&self, task_id: String, request: ScanRequest) {
        if let Err(e) = self.run_scan_inner(&task_id, &request).await {
            tracing::error!(task_id = %task_id, error = %e, "scan task failed");
            self.tasks.fail(&task_id, e.to_string()).await;
        }
    }

    async fn run_scan_inner(&self, task_id: &str, request: &ScanRequest) -> Result<()> {
        let target = request.target.as_str();
        let domain_list: Vec<String> = request
            .domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        let ports_to_scan = parse_port_expr(&request.port_range);

        self.tasks
            .update_progress(task_id, 10, "正在执行存活节点探测...")
            .await;
        let active_ports = liveness::sweep(target, &ports_to_scan).await;
        tracing::info!(target, active = active_ports.len(), "liveness sweep done");

        let ssh_ports = role_ports(request, "ssh", "22");
        let http_ports = role_ports(request, "http", "80");
        let https_ports = role_ports(request, "https", "443");
        let dns_ports = role_ports(request, "dns", "53");

        let mut all_findings: Vec<Finding> = Vec::new();
        let mut port_statuses: Vec<PortStatusRow> = Vec::new();
        let total = active_ports.len();

        for (idx, &port) in active_ports.iter().enumerate() {
            let base = (20 + (idx * 60) / total) as u8;
            self.tasks
                .update_progress(
                    task_id,
                    base,
                    format!("正在审计端口 {port} ({}/{total})...", idx + 1),
                )
                .await;

            let mut matched = false;

            if ssh_ports.contains(&port) {
                let banner = ssh::banner_grab(target, port).await;
                let mut weak_creds = Vec::new();
                if request.mode == ScanMode::Deep && request.enable_brute {
                    let users = dictionary(request, "usernames", "admin");
                    let passes = dictionary(request, "passwords", "123456");
                    let combinations = users.len() * passes.len();
                    self.tasks
                        .update_progress(
                            task_id,
                            base,
                            format!("正在执行 SSH 弱口令爆破 (测试 {combinations} 组密码)..."),
                        )
                        .await;
                    weak_creds = ssh::brute_force(target, port, &users, &passes).await;
                }
                all_findings.extend(self.analyzer.analyze_service(
                    Protocol::Ssh,
                    port,
                    &banner,
                    &ServiceExtra::Ssh { weak_creds },
                ));
                port_statuses.push(PortStatusRow::open(
                    port,
                    ServiceTag::Ssh,
                    format!("Banner: {banner}"),
                ));
                matched = true;
            }

            if http_ports.contains(&port) || https_ports.contains(&port) {
                // A port in both web role sets is analyzed as HTTPS but still
                // yields exactly one WEB status row.
                let is_https = https_ports.contains(&port);
                let protocol = if is_https {
                    Protocol::Https
                } else {
                    Protocol::Http
                };

                let vhosts = self
                    .web_targets(request, &domain_list, target, port)
                    .await;
                for vhost in &vhosts {
                    let vhost_ref = vhost.as_deref();
                    let web_probe = web::scan_http(target, port, vhost_ref).await;
                    let tls_probe = if is_https {
                        Some(tls::check_tls(target, port, vhost_ref).await)
                    } else {
                        None
                    };
                    let banner = web_probe
                        .as_ref()
                        .map(|w| w.banner.clone())
                        .unwrap_or_else(|| "Unknown".to_string());
                    let mut findings = self.analyzer.analyze_service(
                        protocol,
                        port,
                        &banner,
                        &ServiceExtra::Web {
                            web: web_probe,
                            tls: tls_probe,
                        },
                    );
                    if let Some(domain) = vhost {
                        for finding in &mut findings {
                            finding.domain = Some(domain.clone());
                        }
                    }
                    all_findings.extend(findings);
                }
                port_statuses.push(PortStatusRow::open(
                    port,
                    ServiceTag::Web,
                    "Web Service Detected",
                ));
                matched = true;
            }

            if dns_ports.contains(&port) {
                for domain in &domain_list {
                    let dns_probe = dns::check_zone_transfer(domain, target, port).await;
                    if dns_probe.vulnerable {
                        let mut findings = self.analyzer.analyze_service(
                            Protocol::Dns,
                            port,
                            "DNS-AXFR",
                            &ServiceExtra::Dns(dns_probe),
                        );
                        for finding in &mut findings {
                            finding.domain = Some(domain.clone());
                        }
                        all_findings.extend(findings);
                    }
                }
                port_statuses.push(PortStatusRow::open(
                    port,
                    ServiceTag::Dns,
                    "DNS Service Active",
                ));
                matched = true;
            }

            if !matched {
                all_findings.push(Finding {
                    id: format!("PORT-{port}"),
                    protocol: Protocol::Tcp,
                    check_item: "通用端口开放".to_string(),
                    risk_level: RiskLabel::Safe,
                    description: format!("检测到非预设业务端口 {port} 开放。"),
                    detail_value: format!("Port: {port}"),
                    suggestion: "请核查此端口是否为业务必需。".to_string(),
                    mlps_clause: "G3-访问控制".to_string(),
                    domain: None,
                    metadata: None,
                });
                port_statuses.push(PortStatusRow::open(port, ServiceTag::Tcp, "Active"));
            }
        }

        self.tasks
            .update_progress(task_id, 95, "正在执行风险建模与评分...")
            .await;

        let score = calculate_score(&all_findings);
        let summary = summarize(&all_findings);
        let mut report = Report {
            id: None,
            target: target.to_string(),
            score,
            timestamp: local_timestamp(),
            defects: all_findings,
            port_statuses,
            summary,
        };

        let history = self.history.clone();
        report = tokio::task::spawn_blocking(move || {
            history.save(&mut report).map(|_| report)
        })
        .await
        .context("history writer panicked")??;

        self.tasks.complete(task_id, report).await;
        Ok(())
    }

    /// Resolve the virtual hosts to probe on a web port. With verification
    /// enabled, hosts the endpoint does not actually serve are dropped; when
    /// everything drops out the port is still probed once without a Host
    /// override.
    async fn web_targets(
        &self,
        request: &ScanRequest,
        domain_list: &[String],
        target: &str,
        port: u16,
    ) -> Vec<Option<String>> {
        if domain_list.is_empty() {
            return vec![None];
        }
        if !request.verify_vhosts {
            return domain_list.iter().cloned().map(Some).collect();
        }
        let mut verified = Vec::new();
        for domain in domain_list {
            if web::verify_vhost(target, port, domain).await {
                verified.push(Some(domain.clone()));
            } else {
                tracing::debug!(domain = %domain, port, "virtual host failed verification, skipped");
            }
        }
        if verified.is_empty() {
            vec![None]
        } else {
            verified
        }
    }
}

fn role_ports(request: &ScanRequest, role: &str, default_expr: &str) -> HashSet<u16> {
    let expr = request
        .ports_config
        .get(role)
        .map(String::as_str)
        .unwrap_or(default_expr);
    parse_port_expr(expr).into_iter().collect()
}

fn dictionary(request: &ScanRequest, key: &str, default_entry: &str) -> Vec<String> {
    let raw = request
        .dictionaries
        .get(key)
        .map(String::as_str)
        .unwrap_or(default_entry);
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn summarize(defects: &[Finding]) -> RiskSummary {
    RiskSummary {
        high: count(defects, RiskLabel::High),
        medium: count(defects, RiskLabel::Medium),
        low: count(defects, RiskLabel::Low),
    }
}

fn count(defects: &[Finding], label: RiskLabel) -> usize {
    defects.iter().filter(|f| f.risk_level == label).count()
}

fn local_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| String::from("1970-01-01 00:00:00"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request_with(ports_config: &[(&str, &str)], dictionaries: &[(&str, &str)]) -> ScanRequest {
        ScanRequest {
            target: "127.0.0.1".to_string(),
            domains: vec![],
            port_range: "22".to_string(),
            ports_config: ports_config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            dictionaries: dictionaries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            mode: ScanMode::Quick,
            enable_brute: false,
            verify_vhosts: false,
        }
    }

    #[test]
    fn role_ports_fall_back_to_defaults() {
        let request = request_with(&[("ssh", "22,2222")], &[]);
        assert_eq!(
            role_ports(&request, "ssh", "22"),
            HashSet::from([22, 2222])
        );
        assert_eq!(role_ports(&request, "https", "443"), HashSet::from([443]));
    }

    #[test]
    fn dictionary_splits_and_cleans_lines() {
        let request = request_with(&[], &[("usernames", "root\n admin \n\n")]);
        assert_eq!(
            dictionary(&request, "usernames", "admin"),
            vec!["root".to_string(), "admin".to_string()]
        );
        assert_eq!(
            dictionary(&request, "passwords", "123456"),
            vec!["123456".to_string()]
        );
    }

    #[test]
    fn summary_omits_safe_findings() {
        let finding = |risk| Finding {
            id: "PORT-1".to_string(),
            protocol: Protocol::Tcp,
            check_item: String::new(),
            risk_level: risk,
            description: String::new(),
            detail_value: String::new(),
            suggestion: String::new(),
            mlps_clause: String::new(),
            domain: None,
            metadata: None,
        };
        let defects = vec![
            finding(RiskLabel::High),
            finding(RiskLabel::High),
            finding(RiskLabel::Low),
            finding(RiskLabel::Safe),
        ];
        let summary = summarize(&defects);
        assert_eq!(summary.high, 2);
        assert_eq!(summary.medium, 0);
        assert_eq!(summary.low, 1);
    }

    #[test]
    fn timestamp_shape() {
        let ts = local_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
    }
}
