//! 파이프라인 통합 테스트
//!
//! 테일러 → 처리기 → 집계기 전체 체인을 실제 파일로 검증합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use emberpost_core::config::{
    ExtractSpec, MatchSpec, MetricKind, MetricSpec, SourceConfig, SourceFormat,
};
use emberpost_pipeline::aggregator::ObservedValue;
use emberpost_pipeline::{tailer, Aggregator, SourceProcessor, StartFrom, Tailer, TailerConfig};

/// nginx combined 로그 25줄 — 5xx 3줄, 고유 IP 6개
const NGINX_FIXTURE: &str = "\
203.0.113.1 - - [12/Jul/2025:10:00:01 +0000] \"GET / HTTP/1.1\" 200 612
203.0.113.2 - - [12/Jul/2025:10:00:02 +0000] \"GET /index.html HTTP/1.1\" 200 1024
203.0.113.1 - - [12/Jul/2025:10:00:03 +0000] \"GET /style.css HTTP/1.1\" 200 2048
203.0.113.3 - - [12/Jul/2025:10:00:04 +0000] \"POST /api/login HTTP/1.1\" 200 128
203.0.113.2 - - [12/Jul/2025:10:00:05 +0000] \"GET /app.js HTTP/1.1\" 200 4096
203.0.113.4 - - [12/Jul/2025:10:00:06 +0000] \"GET /favicon.ico HTTP/1.1\" 404 169
203.0.113.1 - - [12/Jul/2025:10:00:07 +0000] \"GET /api/items HTTP/1.1\" 500 56
203.0.113.5 - - [12/Jul/2025:10:00:08 +0000] \"GET / HTTP/1.1\" 200 612
203.0.113.3 - - [12/Jul/2025:10:00:09 +0000] \"POST /api/items HTTP/1.1\" 201 89
203.0.113.2 - - [12/Jul/2025:10:00:10 +0000] \"GET /about HTTP/1.1\" 200 734
203.0.113.6 - - [12/Jul/2025:10:00:11 +0000] \"GET /contact HTTP/1.1\" 200 512
203.0.113.1 - - [12/Jul/2025:10:00:12 +0000] \"GET /api/items HTTP/1.1\" 503 44
203.0.113.4 - - [12/Jul/2025:10:00:13 +0000] \"GET /robots.txt HTTP/1.1\" 200 24
203.0.113.5 - - [12/Jul/2025:10:00:14 +0000] \"POST /api/logout HTTP/1.1\" 200 64
203.0.113.2 - - [12/Jul/2025:10:00:15 +0000] \"GET /img/logo.png HTTP/1.1\" 200 8192
203.0.113.3 - - [12/Jul/2025:10:00:16 +0000] \"GET /api/profile HTTP/1.1\" 200 456
203.0.113.6 - - [12/Jul/2025:10:00:17 +0000] \"GET /search?q=rust HTTP/1.1\" 200 1337
203.0.113.1 - - [12/Jul/2025:10:00:18 +0000] \"GET /api/items HTTP/1.1\" 200 2222
203.0.113.4 - - [12/Jul/2025:10:00:19 +0000] \"DELETE /api/items/7 HTTP/1.1\" 204 0
203.0.113.5 - - [12/Jul/2025:10:00:20 +0000] \"GET /pricing HTTP/1.1\" 200 903
203.0.113.2 - - [12/Jul/2025:10:00:21 +0000] \"GET /api/status HTTP/1.1\" 502 31
203.0.113.3 - - [12/Jul/2025:10:00:22 +0000] \"GET /docs HTTP/1.1\" 200 5120
203.0.113.6 - - [12/Jul/2025:10:00:23 +0000] \"GET /blog HTTP/1.1\" 301 0
203.0.113.1 - - [12/Jul/2025:10:00:24 +0000] \"GET /blog/hello HTTP/1.1\" 200 2781
203.0.113.4 - - [12/Jul/2025:10:00:25 +0000] \"GET / HTTP/1.1\" 200 612
";

const NGINX_PATTERN: &str =
    r#"^(?P<ip>\S+) \S+ \S+ \[[^\]]+\] "(?P<method>\S+) (?P<path>\S+) [^"]*" (?P<status>\d+) (?P<bytes>\d+)"#;

fn metric(name: &str, kind: MetricKind) -> MetricSpec {
    MetricSpec {
        name: name.to_owned(),
        kind: Some(kind),
        match_spec: None,
        extract: None,
    }
}

fn nginx_source(path: &str) -> SourceConfig {
    SourceConfig {
        path: path.to_owned(),
        format: Some(SourceFormat::Regex),
        pattern: Some(NGINX_PATTERN.to_owned()),
        metrics: vec![
            metric("http_requests", MetricKind::Counter),
            MetricSpec {
                name: "http_5xx".to_owned(),
                kind: Some(MetricKind::Counter),
                match_spec: Some(MatchSpec {
                    field: "status".to_owned(),
                    equals: None,
                    one_of: None,
                    regex: Some(r"^5\d{2}$".to_owned()),
                    contains: None,
                }),
                extract: None,
            },
            MetricSpec {
                name: "unique_ips".to_owned(),
                kind: Some(MetricKind::Set),
                match_spec: None,
                extract: Some(ExtractSpec {
                    field: "ip".to_owned(),
                }),
            },
        ],
    }
}

#[tokio::test]
async fn nginx_access_log_batch_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, NGINX_FIXTURE).unwrap();

    let aggregator = Arc::new(Aggregator::new());
    let proc = SourceProcessor::new(
        &nginx_source(&path.display().to_string()),
        Arc::clone(&aggregator),
    )
    .unwrap();

    let count = tailer::process_file(&path, 0, |line| proc.process_line(line))
        .await
        .unwrap();
    assert_eq!(count, 25);

    let peek = aggregator.peek();
    assert_eq!(peek["http_requests"], ObservedValue::Float(25.0));
    assert_eq!(peek["http_5xx"], ObservedValue::Float(3.0));
    assert_eq!(peek["unique_ips"], ObservedValue::Count(6));

    let stats = proc.stats();
    assert_eq!(stats.lines_parsed, 25);
    assert_eq!(stats.parse_errors, 0);
}

#[tokio::test]
async fn live_tail_feeds_processor() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");
    std::fs::write(&path, "{\"event\":\"preexisting\"}\n").unwrap();

    let aggregator = Arc::new(Aggregator::new());
    let source = SourceConfig {
        path: path.display().to_string(),
        format: Some(SourceFormat::Json),
        pattern: None,
        metrics: vec![
            MetricSpec {
                name: "requests".to_owned(),
                kind: Some(MetricKind::Counter),
                match_spec: Some(MatchSpec {
                    field: "event".to_owned(),
                    equals: Some("request".to_owned()),
                    one_of: None,
                    regex: None,
                    contains: None,
                }),
                extract: None,
            },
            MetricSpec {
                name: "total_bytes".to_owned(),
                kind: Some(MetricKind::Sum),
                match_spec: None,
                extract: Some(ExtractSpec {
                    field: "bytes".to_owned(),
                }),
            },
        ],
    };
    let proc = Arc::new(SourceProcessor::new(&source, Arc::clone(&aggregator)).unwrap());

    let (tx, mut rx) = mpsc::channel(64);
    let mut tailer = Tailer::new(
        &path,
        TailerConfig {
            poll_interval_ms: 10,
        },
        tx,
    );
    // from-end 시작 — 기존 라인은 무시됨
    tailer.start(StartFrom::End).await.unwrap();

    let consumer = {
        let proc = Arc::clone(&proc);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                proc.process_line(&String::from_utf8_lossy(&line));
            }
        })
    };

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "{}", r#"{"event":"request","bytes":100}"#).unwrap();
    writeln!(file, "{}", r#"{"event":"request","bytes":200}"#).unwrap();
    writeln!(file, "{}", r#"{"event":"other","bytes":999}"#).unwrap();
    file.flush().unwrap();

    // 세 라인이 모두 집계될 때까지 대기
    timeout(Duration::from_secs(5), async {
        loop {
            let peek = aggregator.peek();
            if peek["total_bytes"] == ObservedValue::Float(1299.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("metrics did not converge");

    let peek = aggregator.peek();
    // from-end이므로 preexisting 라인은 집계되지 않음
    assert_eq!(peek["requests"], ObservedValue::Float(2.0));
    assert_eq!(peek["total_bytes"], ObservedValue::Float(1299.0));

    tailer.stop().await;
    consumer.await.unwrap();
}

#[tokio::test]
async fn snapshot_between_tail_batches() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");
    std::fs::write(&path, "").unwrap();

    let aggregator = Arc::new(Aggregator::new());
    let source = SourceConfig {
        path: path.display().to_string(),
        format: Some(SourceFormat::Json),
        pattern: None,
        metrics: vec![metric("n", MetricKind::Counter)],
    };
    let proc = Arc::new(SourceProcessor::new(&source, Arc::clone(&aggregator)).unwrap());

    let (tx, mut rx) = mpsc::channel(64);
    let mut tailer = Tailer::new(
        &path,
        TailerConfig {
            poll_interval_ms: 10,
        },
        tx,
    );
    tailer.start(StartFrom::End).await.unwrap();

    let consumer = {
        let proc = Arc::clone(&proc);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                proc.process_line(&String::from_utf8_lossy(&line));
            }
        })
    };

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "{{}}").unwrap();
    writeln!(file, "{{}}").unwrap();
    file.flush().unwrap();

    timeout(Duration::from_secs(5), async {
        while aggregator.peek()["n"] != ObservedValue::Float(2.0) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first batch did not arrive");

    let snap = aggregator.snapshot();
    assert_eq!(snap["n"], ObservedValue::Float(2.0));
    assert_eq!(aggregator.peek()["n"], ObservedValue::Float(0.0));

    writeln!(file, "{{}}").unwrap();
    file.flush().unwrap();

    timeout(Duration::from_secs(5), async {
        while aggregator.peek()["n"] != ObservedValue::Float(1.0) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("second batch did not arrive");

    tailer.stop().await;
    consumer.await.unwrap();
}
