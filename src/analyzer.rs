use std::sync::Arc;

use crate::rules::{Rule, RuleCatalog};
use crate::types::{Finding, Protocol, RiskLabel, ServiceExtra};

/// Rule-driven finding construction. Pure: no I/O beyond rule lookup, so the
/// same probe evidence always yields the same findings.
pub struct Analyzer {
    rules: Arc<RuleCatalog>,
}

impl Analyzer {
    pub fn new(rules: Arc<RuleCatalog>) -> Self {
        Self { rules }
    }

    /// Convert one service's raw probe evidence into normalized findings.
    ///
    /// The checks run in a fixed order; when none of them fires, exactly one
    /// fallback finding is emitted (SSH banner leak for OpenSSH banners,
    /// generic open-port otherwise).
    pub fn analyze_service(
        &self,
        protocol: Protocol,
        port: u16,
        banner: &str,
        extra: &ServiceExtra,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let banner_low = banner.to_lowercase();

        match extra {
            // A confirmed credential always produces this finding, whatever
            // else the probes saw.
            ServiceExtra::Ssh { weak_creds } => {
                if let Some(cred) = weak_creds.first() {
                    findings.push(Finding {
                        id: format!("SSH-PWD-{port}"),
                        protocol,
                        check_item: "系统权限已失陷 (SSH 弱口令)".to_string(),
                        risk_level: RiskLabel::High,
                        description: format!(
                            "成功获取系统登录凭据：{} / {}",
                            cred.user, cred.pass
                        ),
                        detail_value: format!(
                            "Exploit Data: Found Valid Credential pair on port {port}"
                        ),
                        suggestion: "1. 立即强制修改该账户密码；2. 启用多因素认证 (MFA)；3. 限制 SSH 来源 IP。"
                            .to_string(),
                        mlps_clause: "G3-安全计算环境-身份鉴别".to_string(),
                        domain: None,
                        metadata: Some(serde_json::json!({ "is_compromised": true })),
                    });
                }
            }

            ServiceExtra::Web { web, tls } => {
                if protocol == Protocol::Https {
                    if let Some(tls) = tls {
                        if !tls.weak_protocols.is_empty() {
                            let rule = self.rules.get("TLS_OLD_PROTO");
                            findings.push(self.format_finding(
                                format!("TLS-PROTO-{port}"),
                                protocol,
                                &rule,
                                format!("支持不安全协议: {}", tls.weak_protocols.join(", ")),
                            ));
                        }
                        if let Some(info) = &tls.cert_info {
                            if info.is_expired {
                                let rule = Rule {
                                    name: Some("数字证书已过期".to_string()),
                                    risk_level: Some("High".to_string()),
                                    clause_id: Some("G3-安全通信网络".to_string()),
                                    ..Rule::default()
                                };
                                findings.push(self.format_finding(
                                    format!("TLS-CERT-EXP-{port}"),
                                    protocol,
                                    &rule,
                                    format!("过期时间: {}", info.expiry),
                                ));
                            }
                            if info.key_size < 2048 {
                                let rule = self.rules.get("TLS_WEAK_CERT");
                                findings.push(self.format_finding(
                                    format!("TLS-CERT-SIZE-{port}"),
                                    protocol,
                                    &rule,
                                    format!("当前 RSA 密钥长度: {} bit", info.key_size),
                                ));
                            }
                        }
                    }
                }

                if let Some(web) = web {
                    let deep = &web.deep_scan;

                    if !deep.exposed_paths.is_empty() {
                        let rule = self.rules.get("WEB_SENSITIVE_EXPOSURE");
                        let paths: Vec<String> = deep
                            .exposed_paths
                            .iter()
                            .map(|p| format!("{} (HTTP {})", p.path, p.status))
                            .collect();
                        findings.push(self.format_finding(
                            format!("WEB-EXPOSED-{port}"),
                            protocol,
                            &rule,
                            format!("发现敏感暴露路径: {}", paths.join(", ")),
                        ));
                    }

                    if !deep.missing_headers.is_empty() {
                        let rule = self.rules.get("WEB_MISSING_HEADERS");
                        findings.push(self.format_finding(
                            format!("WEB-HEADERS-{port}"),
                            protocol,
                            &rule,
                            format!("缺失安全响应头: {}", deep.missing_headers.join(", ")),
                        ));
                    }

                    if ["nginx", "apache", "iis"]
                        .iter()
                        .any(|s| banner_low.contains(s))
                    {
                        let rule = self.rules.get("HTTP_BANNER_LEAK");
                        findings.push(self.format_finding(
                            format!("WEB-BANNER-{port}"),
                            protocol,
                            &rule,
                            banner.to_string(),
                        ));
                    }
                }
            }

            ServiceExtra::Dns(dns) => {
                if dns.vulnerable {
                    let rule = self.rules.get("DNS_ZONE_TRANSFER");
                    findings.push(self.format_finding(
                        format!("DNS-AXFR-{port}"),
                        protocol,
                        &rule,
                        dns.detail.clone(),
                    ));
                }
            }

            ServiceExtra::None => {}
        }

        if findings.is_empty() {
            if protocol == Protocol::Ssh && banner_low.contains("openssh") {
                let rule = self.rules.get("SSH_BANNER_LEAK");
                findings.push(self.format_finding(
                    format!("SSH-BANNER-{port}"),
                    protocol,
                    &rule,
                    banner.to_string(),
                ));
            } else {
                let rule = self.rules.get("TCP_PORT_OPEN");
                findings.push(self.format_finding(
                    format!("PORT-{port}"),
                    protocol,
                    &rule,
                    format!("开放端口: {port}"),
                ));
            }
        }

        findings
    }

    fn format_finding(
        &self,
        id: String,
        protocol: Protocol,
        rule: &Rule,
        detail: String,
    ) -> Finding {
        let risk_level = match rule.risk_level.as_deref() {
            Some("High") => RiskLabel::High,
            Some("Medium") => RiskLabel::Medium,
            Some("Info") => RiskLabel::Safe,
            // Unrecognized levels degrade to 低危.
            _ => RiskLabel::Low,
        };
        Finding {
            id,
            protocol,
            check_item: rule
                .name
                .clone()
                .unwrap_or_else(|| "通用安全检查".to_string()),
            risk_level,
            description: rule
                .description
                .clone()
                .unwrap_or_else(|| "检测到潜在安全风险。".to_string()),
            detail_value: detail,
            suggestion: rule
                .suggestion
                .clone()
                .unwrap_or_else(|| "请核查此服务的必要性。".to_string()),
            mlps_clause: rule
                .clause_id
                .clone()
                .unwrap_or_else(|| "G3-访问控制".to_string()),
            domain: None,
            metadata: None,
        }
    }
}

/// Overall report score: start at 100, subtract a weight per finding
/// (高危 25, 中危 10, 低危 2, 安全 0), floored at 0.
pub fn calculate_score(defects: &[Finding]) -> i64 {
    let mut score: i64 = 100;
    for d in defects {
        score -= match d.risk_level {
            RiskLabel::High => 25,
            RiskLabel::Medium => 10,
            RiskLabel::Low => 2,
            RiskLabel::Safe => 0,
        };
    }
    score.max(0)
}
