//! 스캐너 출력 추출/파싱 벤치마크

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use deployscan_scan_job::output::{extract_report, parse_report};

fn noisy_log(findings: usize) -> String {
    let mut log = String::new();
    for i in 0..200 {
        log.push_str(&format!("[{i:04}] pulling layer {{sha256:{i:064x}}} ... done\n"));
    }
    let items: Vec<String> = (0..findings)
        .map(|i| {
            format!(
                r#"{{"qid":{i},"cveId":"CVE-2024-{i:05}","title":"pkg-{i}","severity":{},"packageName":"pkg-{i}","installedVersion":"1.0","fixedVersion":"1.1"}}"#,
                i % 5 + 1
            )
        })
        .collect();
    log.push_str(&format!(
        r#"{{"scanId":"bench","results":{{"vulnerabilities":[{}]}}}}"#,
        items.join(",")
    ));
    log.push_str("\nscan complete\n");
    log
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner_output");
    for findings in [10, 500] {
        let log = noisy_log(findings);
        group.throughput(Throughput::Bytes(log.len() as u64));
        group.bench_function(format!("extract_{findings}"), |b| {
            b.iter(|| black_box(extract_report(black_box(&log))))
        });
        if let Some(report) = extract_report(&log) {
            group.bench_function(format!("parse_{findings}"), |b| {
                b.iter(|| black_box(parse_report(black_box(&report.value))))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
