use std::sync::Arc;

use netaudit_rs::analyzer::{calculate_score, Analyzer};
use netaudit_rs::rules::RuleCatalog;
use netaudit_rs::types::{
    CertInfo, Credential, DeepScan, DnsProbe, ExposedPath, Finding, Protocol, RiskLabel,
    ServiceExtra, TlsProbe, WebProbe,
};

const TEST_RULES: &str = r#"{
    "SSH_BANNER_LEAK": {"name": "SSH 版本信息泄露", "risk_level": "Low"},
    "TLS_OLD_PROTO": {"name": "支持老旧 TLS 协议", "risk_level": "Medium"},
    "TLS_WEAK_CERT": {"name": "证书密钥强度不足", "risk_level": "Medium"},
    "WEB_SENSITIVE_EXPOSURE": {"name": "敏感路径暴露", "risk_level": "High"},
    "WEB_MISSING_HEADERS": {"name": "安全响应头缺失", "risk_level": "Low"},
    "HTTP_BANNER_LEAK": {"name": "Web 服务指纹泄露", "risk_level": "Low"},
    "DNS_ZONE_TRANSFER": {"name": "DNS 区域传送漏洞", "risk_level": "High"},
    "TCP_PORT_OPEN": {"name": "通用端口开放", "risk_level": "Info"}
}"#;

fn analyzer() -> Analyzer {
    Analyzer::new(Arc::new(RuleCatalog::from_json_str(TEST_RULES).unwrap()))
}

fn web_probe(port: u16, banner: &str, deep_scan: DeepScan) -> WebProbe {
    WebProbe {
        port,
        status: 200,
        banner: banner.to_string(),
        headers: Default::default(),
        vhost_matched: "203.0.113.10".to_string(),
        deep_scan,
    }
}

#[test]
fn ssh_weak_password_yields_single_compromise_finding() {
    let findings = analyzer().analyze_service(
        Protocol::Ssh,
        22,
        "SSH-2.0-OpenSSH_7.4",
        &ServiceExtra::Ssh {
            weak_creds: vec![Credential {
                user: "root".to_string(),
                pass: "root".to_string(),
            }],
        },
    );

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.id, "SSH-PWD-22");
    assert_eq!(finding.risk_level, RiskLabel::High);
    assert!(finding.description.contains("root / root"));
    assert_eq!(
        finding.metadata,
        Some(serde_json::json!({ "is_compromised": true }))
    );
}

#[test]
fn openssh_banner_leak_is_the_ssh_fallback() {
    let findings = analyzer().analyze_service(
        Protocol::Ssh,
        22,
        "SSH-2.0-OpenSSH_8.9p1 Ubuntu",
        &ServiceExtra::Ssh { weak_creds: vec![] },
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].id, "SSH-BANNER-22");
    assert_eq!(findings[0].risk_level, RiskLabel::Low);
    assert_eq!(findings[0].detail_value, "SSH-2.0-OpenSSH_8.9p1 Ubuntu");
}

#[test]
fn non_openssh_banner_falls_back_to_open_port() {
    let findings = analyzer().analyze_service(
        Protocol::Ssh,
        2222,
        "SSH-2.0-Generic",
        &ServiceExtra::Ssh { weak_creds: vec![] },
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].id, "PORT-2222");
    assert_eq!(findings[0].risk_level, RiskLabel::Safe);
    assert_eq!(findings[0].detail_value, "开放端口: 2222");
}

#[test]
fn expired_cert_and_old_protocol_are_separate_findings() {
    let tls = TlsProbe {
        weak_protocols: vec!["TLSv1.0".to_string()],
        cert_info: Some(CertInfo {
            subject: "CN=old.example.com".to_string(),
            expiry: "2020-01-01".to_string(),
            key_size: 2048,
            is_expired: true,
        }),
        vulnerabilities: vec!["CERT_EXPIRED".to_string()],
    };
    let findings = analyzer().analyze_service(
        Protocol::Https,
        443,
        "Unknown",
        &ServiceExtra::Web {
            web: None,
            tls: Some(tls),
        },
    );

    let ids: Vec<&str> = findings.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["TLS-PROTO-443", "TLS-CERT-EXP-443"]);
    assert!(!ids.contains(&"TLS-CERT-SIZE-443"));

    let proto = &findings[0];
    assert_eq!(proto.risk_level, RiskLabel::Medium);
    assert_eq!(proto.detail_value, "支持不安全协议: TLSv1.0");

    let expired = &findings[1];
    assert_eq!(expired.risk_level, RiskLabel::High);
    assert_eq!(expired.check_item, "数字证书已过期");
    assert_eq!(expired.detail_value, "过期时间: 2020-01-01");
    assert_eq!(expired.mlps_clause, "G3-安全通信网络");
}

#[test]
fn weak_key_size_reported_below_2048() {
    let tls = TlsProbe {
        weak_protocols: vec![],
        cert_info: Some(CertInfo {
            subject: "CN=weak.example.com".to_string(),
            expiry: "2030-01-01".to_string(),
            key_size: 1024,
            is_expired: false,
        }),
        vulnerabilities: vec!["WEAK_KEY_SIZE".to_string()],
    };
    let findings = analyzer().analyze_service(
        Protocol::Https,
        8443,
        "Unknown",
        &ServiceExtra::Web {
            web: None,
            tls: Some(tls),
        },
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].id, "TLS-CERT-SIZE-8443");
    assert_eq!(findings[0].detail_value, "当前 RSA 密钥长度: 1024 bit");
}

#[test]
fn web_exposure_headers_and_banner_leak_together() {
    let deep_scan = DeepScan {
        exposed_paths: vec![ExposedPath {
            path: "/.git/config".to_string(),
            status: 200,
        }],
        missing_headers: vec!["Content-Security-Policy".to_string()],
    };
    let findings = analyzer().analyze_service(
        Protocol::Http,
        80,
        "nginx/1.18",
        &ServiceExtra::Web {
            web: Some(web_probe(80, "nginx/1.18", deep_scan)),
            tls: None,
        },
    );

    let ids: Vec<&str> = findings.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["WEB-EXPOSED-80", "WEB-HEADERS-80", "WEB-BANNER-80"]);

    assert_eq!(
        findings[0].detail_value,
        "发现敏感暴露路径: /.git/config (HTTP 200)"
    );
    assert_eq!(
        findings[1].detail_value,
        "缺失安全响应头: Content-Security-Policy"
    );
    assert_eq!(findings[2].detail_value, "nginx/1.18");
}

#[test]
fn quiet_web_service_falls_back_to_open_port() {
    let findings = analyzer().analyze_service(
        Protocol::Http,
        8080,
        "Unknown",
        &ServiceExtra::Web {
            web: Some(web_probe(8080, "Unknown", DeepScan::default())),
            tls: None,
        },
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].id, "PORT-8080");
    assert_eq!(findings[0].risk_level, RiskLabel::Safe);
}

#[test]
fn zone_transfer_reported_when_vulnerable() {
    let findings = analyzer().analyze_service(
        Protocol::Dns,
        53,
        "DNS-AXFR",
        &ServiceExtra::Dns(DnsProbe {
            vulnerable: true,
            records_count: 42,
            detail: "got 42 records".to_string(),
            records: vec![],
        }),
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].id, "DNS-AXFR-53");
    assert_eq!(findings[0].risk_level, RiskLabel::High);
    assert_eq!(findings[0].detail_value, "got 42 records");
}

#[test]
fn empty_catalog_formats_with_generic_defaults() {
    let analyzer = Analyzer::new(Arc::new(RuleCatalog::empty()));
    let findings =
        analyzer.analyze_service(Protocol::Tcp, 8081, "", &ServiceExtra::None);

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.id, "PORT-8081");
    assert_eq!(finding.check_item, "通用安全检查");
    assert_eq!(finding.risk_level, RiskLabel::Low);
    assert_eq!(finding.description, "检测到潜在安全风险。");
    assert_eq!(finding.suggestion, "请核查此服务的必要性。");
    assert_eq!(finding.mlps_clause, "G3-访问控制");
}

#[test]
fn risk_levels_map_totally_and_unknown_degrades_to_low() {
    let catalog = RuleCatalog::from_json_str(
        r#"{
            "TCP_PORT_OPEN": {"risk_level": "High"},
            "SSH_BANNER_LEAK": {"risk_level": "Critical"}
        }"#,
    )
    .unwrap();
    let analyzer = Analyzer::new(Arc::new(catalog));

    let high = analyzer.analyze_service(Protocol::Tcp, 1, "", &ServiceExtra::None);
    assert_eq!(high[0].risk_level, RiskLabel::High);

    let unknown = analyzer.analyze_service(
        Protocol::Ssh,
        22,
        "OpenSSH_9.0",
        &ServiceExtra::Ssh { weak_creds: vec![] },
    );
    assert_eq!(unknown[0].risk_level, RiskLabel::Low);
}

fn finding_with(risk: RiskLabel) -> Finding {
    Finding {
        id: "X".to_string(),
        protocol: Protocol::Tcp,
        check_item: String::new(),
        risk_level: risk,
        description: String::new(),
        detail_value: String::new(),
        suggestion: String::new(),
        mlps_clause: String::new(),
        domain: None,
        metadata: None,
    }
}

#[test]
fn score_weights_and_floor() {
    assert_eq!(calculate_score(&[]), 100);
    assert_eq!(calculate_score(&[finding_with(RiskLabel::High)]), 75);
    assert_eq!(calculate_score(&[finding_with(RiskLabel::Medium)]), 90);
    assert_eq!(calculate_score(&[finding_with(RiskLabel::Low)]), 98);
    // 安全 findings never move the score.
    assert_eq!(calculate_score(&[finding_with(RiskLabel::Safe)]), 100);

    let many: Vec<Finding> = (0..10).map(|_| finding_with(RiskLabel::High)).collect();
    assert_eq!(calculate_score(&many), 0);
}

#[test]
fn score_is_monotonic_and_bounded() {
    let mut defects = vec![finding_with(RiskLabel::Medium)];
    let before = calculate_score(&defects);
    defects.push(finding_with(RiskLabel::High));
    let after = calculate_score(&defects);
    assert!(after <= before);
    assert!((0..=100).contains(&before));
    assert!((0..=100).contains(&after));
}
