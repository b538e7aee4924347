//! 스캐너 출력 파싱
//!
//! 스캐너는 로그 스트림에 JSON 보고서 하나를 출력하지만 앞뒤에 진행 메시지가 섞일 수 있습니다.
//! [`extract_report`]는 로그에서 최상위 JSON 객체들을 찾아 보고서로 보이는 마지막 객체를,
//! 없으면 마지막 객체를 선택합니다. [`parse_report`]는 선택된 객체를 취약점과
//! 컴플라이언스 결과로 변환합니다.

use serde_json::{Map, Value};

use deployscan_core::types::{
    ComplianceCheck, ComplianceCounts, Finding, Severity, VulnerabilityCounts,
};

/// 보고서 객체를 식별하는 최상위 키 (소문자)
const REPORT_KEYS: &[&str] = &[
    "vulnerabilities",
    "results",
    "imagedetails",
    "summary",
    "compliance",
    "scanid",
];

const SEVERITY_KEYS: &[(&str, Severity)] = &[
    ("critical", Severity::Critical),
    ("high", Severity::High),
    ("medium", Severity::Medium),
    ("low", Severity::Low),
    ("info", Severity::Info),
    ("informational", Severity::Info),
];

/// 로그에서 찾은 JSON 보고서
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedJson {
    /// 파싱된 객체
    pub value: Value,
    /// 로그에 나타난 JSON 원문
    pub raw: String,
}

/// 보고서 파싱 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    /// 스캐너 자체 스캔 ID
    pub tool_scan_id: Option<String>,
    pub findings: Vec<Finding>,
    pub vulnerability_counts: VulnerabilityCounts,
    pub compliance_checks: Vec<ComplianceCheck>,
    pub compliance_counts: ComplianceCounts,
}

/// 로그의 끝부분 `max_bytes`만 남깁니다. 문자 경계에서 자릅니다.
pub fn tail(log: &str, max_bytes: usize) -> &str {
    if log.len() <= max_bytes {
        return log;
    }
    let mut cut = log.len() - max_bytes;
    while !log.is_char_boundary(cut) {
        cut += 1;
    }
    &log[cut..]
}

/// 로그 텍스트에서 최상위 JSON 객체를 모두 찾습니다.
///
/// 파싱에 성공한 객체의 내부는 다시 탐색하지 않습니다. 잘린 객체 안의 온전한
/// 하위 객체는 독립 객체로 찾아집니다.
pub fn find_objects(log: &str) -> Vec<ExtractedJson> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = log[pos..].find('{') {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&log[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                let end = start + stream.byte_offset();
                found.push(ExtractedJson {
                    value,
                    raw: log[start..end].to_owned(),
                });
                pos = end;
            }
            _ => pos = start + 1,
        }
    }
    found
}

/// 로그에서 보고서 객체를 선택합니다.
///
/// 보고서 키를 가진 마지막 객체를 우선하고, 없으면 마지막 객체를 반환합니다.
pub fn extract_report(log: &str) -> Option<ExtractedJson> {
    let mut objects = find_objects(log);
    match objects.iter().rposition(|o| looks_like_report(&o.value)) {
        Some(idx) => Some(objects.swap_remove(idx)),
        None => objects.pop(),
    }
}

fn looks_like_report(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.keys().any(|k| {
        let k = k.to_lowercase();
        REPORT_KEYS.contains(&k.as_str()) || SEVERITY_KEYS.iter().any(|(s, _)| *s == k)
    })
}

/// 대소문자를 구분하지 않고 키를 조회합니다.
fn get_ci<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| get_ci(obj, k)).filter(|v| !v.is_null())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_at(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_of(obj, keys).and_then(as_text)
}

fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| get_ci(v.as_object()?, key))
}

fn severity_of(value: Option<&Value>) -> Severity {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Severity::from_tool_level)
            .unwrap_or(Severity::Medium),
        Some(Value::String(s)) => Severity::from_tool_text(s),
        _ => Severity::Medium,
    }
}

fn parse_finding(item: &Value) -> Option<Finding> {
    let obj = item.as_object()?;
    let package = get_ci(obj, "package").and_then(Value::as_object);

    let cve = match first_of(obj, &["cve", "cveId", "cves"]) {
        Some(Value::Array(list)) => list.first().and_then(as_text),
        Some(v) => as_text(v),
        None => None,
    };
    let id = text_at(obj, &["qid", "id", "vulnId"])
        .or_else(|| cve.clone())
        .unwrap_or_else(|| "unknown".to_owned());
    let title = text_at(obj, &["title", "name", "description"]).unwrap_or_else(|| id.clone());

    Some(Finding {
        severity: severity_of(first_of(obj, &["severity", "severityLevel", "level"])),
        id,
        cve,
        title,
        package: text_at(obj, &["packageName", "package"])
            .or_else(|| package.and_then(|p| text_at(p, &["name"]))),
        installed_version: text_at(obj, &["installedVersion", "version"])
            .or_else(|| package.and_then(|p| text_at(p, &["version"]))),
        fixed_version: text_at(obj, &["fixedVersion", "fix", "fixedIn"]),
    })
}

/// 심각도별 개수 객체로 해석합니다. 심각도 키가 하나도 없으면 `None`입니다.
fn counts_from(value: &Value) -> Option<VulnerabilityCounts> {
    let obj = value.as_object()?;
    let mut counts = VulnerabilityCounts::default();
    let mut seen = false;
    for (key, severity) in SEVERITY_KEYS {
        if let Some(n) = get_ci(obj, key).and_then(as_count) {
            seen = true;
            let slot = match severity {
                Severity::Critical => &mut counts.critical,
                Severity::High => &mut counts.high,
                Severity::Medium => &mut counts.medium,
                Severity::Low => &mut counts.low,
                Severity::Info => &mut counts.info,
            };
            *slot = slot.saturating_add(n);
        }
    }
    seen.then_some(counts)
}

fn summary_counts(root: &Value) -> Option<VulnerabilityCounts> {
    [
        nested(root, &["summary"]),
        nested(root, &["summary", "vulnerabilities"]),
        nested(root, &["vulnerabilitySummary"]),
        nested(root, &["vulnerabilityCounts"]),
        nested(root, &["vulnerabilities"]),
        nested(root, &["results", "summary"]),
        Some(root),
    ]
    .into_iter()
    .flatten()
    .find_map(counts_from)
}

fn vulnerability_items(root: &Value) -> Vec<&Value> {
    [
        &["vulnerabilities"][..],
        &["results", "vulnerabilities"][..],
        &["imageDetails", "vulnerabilities"][..],
    ]
    .into_iter()
    .filter_map(|path| nested(root, path).and_then(Value::as_array))
    .flatten()
    .collect()
}

fn compliance_passed(item: &Map<String, Value>) -> Option<bool> {
    if let Some(Value::Bool(b)) = first_of(item, &["passed"]) {
        return Some(*b);
    }
    let status = text_at(item, &["status", "result"])?.to_uppercase();
    match status.as_str() {
        "PASS" | "PASSED" => Some(true),
        "FAIL" | "FAILED" => Some(false),
        _ => None,
    }
}

fn parse_compliance(root: &Value) -> (Vec<ComplianceCheck>, ComplianceCounts) {
    let mut checks = Vec::new();
    let mut counts = ComplianceCounts::default();

    for path in [&["compliance"][..], &["results", "compliance"][..]] {
        match nested(root, path) {
            Some(Value::Array(items)) => {
                for item in items.iter().filter_map(Value::as_object) {
                    let Some(passed) = compliance_passed(item) else {
                        continue;
                    };
                    let id = text_at(item, &["id", "controlId", "cid"])
                        .unwrap_or_else(|| "unknown".to_owned());
                    checks.push(ComplianceCheck {
                        title: text_at(item, &["title", "name", "description"])
                            .unwrap_or_else(|| id.clone()),
                        id,
                        passed,
                    });
                    let slot = if passed {
                        &mut counts.passed
                    } else {
                        &mut counts.failed
                    };
                    *slot = slot.saturating_add(1);
                }
            }
            Some(Value::Object(obj)) => {
                let passed = get_ci(obj, "passed").and_then(as_count).unwrap_or(0);
                let failed = get_ci(obj, "failed").and_then(as_count).unwrap_or(0);
                counts.passed = counts.passed.saturating_add(passed);
                counts.failed = counts.failed.saturating_add(failed);
            }
            _ => {}
        }
    }
    (checks, counts)
}

/// 보고서 객체를 파싱합니다.
///
/// 요약 개수가 있으면 그 값을 사용하고, 없으면 개별 취약점 항목으로 집계합니다.
pub fn parse_report(root: &Value) -> ParsedReport {
    let findings: Vec<Finding> = vulnerability_items(root)
        .into_iter()
        .filter_map(parse_finding)
        .collect();

    let vulnerability_counts = summary_counts(root).unwrap_or_else(|| {
        let mut counts = VulnerabilityCounts::default();
        for finding in &findings {
            counts.increment(finding.severity);
        }
        counts
    });

    let (compliance_checks, compliance_counts) = parse_compliance(root);

    let tool_scan_id = root
        .as_object()
        .and_then(|obj| text_at(obj, &["scanId", "scan_id", "scanUuid"]));

    ParsedReport {
        tool_scan_id,
        findings,
        vulnerability_counts,
        compliance_checks,
        compliance_counts,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_json_surrounded_by_noise() {
        let log = "pulling layer {partial\nScanning...\n{\"summary\":{\"HIGH\":2}}\ndone {not json}";
        let report = extract_report(log).unwrap();
        assert_eq!(report.raw, "{\"summary\":{\"HIGH\":2}}");
    }

    #[test]
    fn prefers_last_report_like_object() {
        let log = r#"{"vulnerabilities":[]} {"level":"info","msg":"bye"}"#;
        let report = extract_report(log).unwrap();
        assert!(report.value.get("vulnerabilities").is_some());

        let log = r#"{"a":1} {"b":2}"#;
        assert_eq!(extract_report(log).unwrap().value, json!({"b": 2}));
    }

    #[test]
    fn no_json_yields_none() {
        assert!(extract_report("").is_none());
        assert!(extract_report("error: unauthorized { oops").is_none());
        assert!(extract_report("[1,2,3]").is_none());
    }

    #[test]
    fn truncated_outer_object_exposes_inner() {
        let log = r#"{"outer": {"critical": 1}"#;
        let objects = find_objects(log);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].value, json!({"critical": 1}));
    }

    #[test]
    fn tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("é", 1), "");
    }

    #[test]
    fn parses_summary_counts_case_insensitively() {
        let report = parse_report(&json!({
            "summary": { "Critical": 0, "HIGH": 2, "medium": "5" }
        }));
        assert_eq!(report.vulnerability_counts.critical, 0);
        assert_eq!(report.vulnerability_counts.high, 2);
        assert_eq!(report.vulnerability_counts.medium, 5);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn top_level_counts() {
        let report = parse_report(&json!({"critical": 1, "low": 3}));
        assert_eq!(report.vulnerability_counts.critical, 1);
        assert_eq!(report.vulnerability_counts.low, 3);
    }

    #[test]
    fn counts_findings_when_no_summary() {
        let report = parse_report(&json!({
            "scanId": "abc-123",
            "results": {
                "vulnerabilities": [
                    { "qid": 38739, "cveId": "CVE-2023-0001", "title": "openssl", "severity": 5,
                      "packageName": "openssl", "installedVersion": "1.1", "fixedVersion": "1.2" },
                    { "id": "V2", "severity": "HIGH", "package": { "name": "zlib", "version": "1.2" } },
                    { "id": "V3", "severity": "Moderate" },
                    { "id": "V4" }
                ]
            }
        }));
        assert_eq!(report.tool_scan_id.as_deref(), Some("abc-123"));
        assert_eq!(report.findings.len(), 4);
        let counts = report.vulnerability_counts;
        assert_eq!((counts.critical, counts.high, counts.medium), (1, 1, 2));

        let first = &report.findings[0];
        assert_eq!(first.id, "38739");
        assert_eq!(first.cve.as_deref(), Some("CVE-2023-0001"));
        assert_eq!(first.fixed_version.as_deref(), Some("1.2"));
        let second = &report.findings[1];
        assert_eq!(second.package.as_deref(), Some("zlib"));
        assert_eq!(second.installed_version.as_deref(), Some("1.2"));
    }

    #[test]
    fn compliance_array_and_object() {
        let report = parse_report(&json!({
            "compliance": [
                { "id": "C1", "title": "no root", "status": "PASS" },
                { "id": "C2", "status": "failed" },
                { "id": "C3", "status": "SKIPPED" }
            ]
        }));
        assert_eq!(report.compliance_checks.len(), 2);
        assert_eq!(report.compliance_counts, ComplianceCounts { passed: 1, failed: 1 });

        let report = parse_report(&json!({"results": {"compliance": {"passed": 7, "failed": 2}}}));
        assert_eq!(report.compliance_counts, ComplianceCounts { passed: 7, failed: 2 });
        assert!(report.compliance_checks.is_empty());
    }

    // Property-based tests using proptest
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn extract_arbitrary_text_does_not_panic(log in "\\PC{0,500}") {
                let _ = find_objects(&log);
                if let Some(report) = extract_report(&log) {
                    let _ = parse_report(&report.value);
                }
            }

            #[test]
            fn extract_brace_soup_returns_verbatim_objects(log in "[{}\\[\\]\":,a0 \n]{0,300}") {
                for object in find_objects(&log) {
                    let reparsed: Value = serde_json::from_str(&object.raw).unwrap();
                    prop_assert_eq!(reparsed, object.value);
                    prop_assert!(log.contains(&object.raw));
                }
            }

            #[test]
            fn report_is_found_after_noise(prefix in "[^{}]{0,200}", high in 0u64..1000) {
                let log = format!("{prefix}\n{{\"summary\":{{\"high\":{high}}}}}\n");
                let report = extract_report(&log).unwrap();
                prop_assert_eq!(parse_report(&report.value).vulnerability_counts.high, high);
            }

            #[test]
            fn tail_never_exceeds_limit(log in "\\PC{0,300}", max in 0usize..400) {
                prop_assert!(tail(&log, max).len() <= max);
                prop_assert!(log.ends_with(tail(&log, max)));
            }
        }
    }
}
