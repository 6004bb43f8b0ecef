//! 소스 처리기 — 소스 하나의 파서·매처·집계를 묶습니다.
//!
//! 생성 시 파서를 구성하고 메트릭별 매처를 만들며, 모든 메트릭을
//! 집계기에 등록합니다. 런타임 연산은 [`process_line`] 하나입니다:
//! 파싱 → 메트릭별 매칭 → 유형별 갱신 수집 → 단일 잠금으로 일괄 적용.
//!
//! 소스 단위 관측 카운터(파싱/매칭/에러)는 dry-run 보고용이며
//! 수집 서버로는 전송되지 않습니다.
//!
//! [`process_line`]: SourceProcessor::process_line

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use emberpost_core::config::{MetricKind, SourceConfig};
use emberpost_core::record;

use crate::aggregator::{Aggregator, MetricUpdate};
use crate::error::PipelineError;
use crate::matcher::Matcher;
use crate::parser::LineParser;

/// 메트릭 하나의 처리 바인딩
#[derive(Debug)]
struct MetricBinding {
    /// 메트릭 이름
    name: String,
    /// 메트릭 유형
    kind: MetricKind,
    /// 추출 대상 필드 (counter는 None일 수 있음)
    extract_field: Option<String>,
    /// 사전 구성된 매처
    matcher: Matcher,
}

/// 소스 단위 관측 통계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    /// 파싱에 성공한 라인 수
    pub lines_parsed: u64,
    /// 하나 이상의 메트릭에 매칭된 라인 수
    pub lines_matched: u64,
    /// 파싱에 실패한 라인 수
    pub parse_errors: u64,
}

/// 소스 처리기
#[derive(Debug)]
pub struct SourceProcessor {
    /// 소스 파일 경로
    path: String,
    /// 라인 파서
    parser: LineParser,
    /// 설정 순서의 메트릭 바인딩
    metrics: Vec<MetricBinding>,
    /// 공유 집계기
    aggregator: Arc<Aggregator>,

    lines_parsed: AtomicU64,
    lines_matched: AtomicU64,
    parse_errors: AtomicU64,
}

impl SourceProcessor {
    /// 소스 설정으로부터 처리기를 생성합니다.
    ///
    /// 모든 메트릭을 집계기에 등록하고 매처를 미리 컴파일합니다.
    /// 검증을 통과한 설정에서는 실패하지 않습니다.
    pub fn new(source: &SourceConfig, aggregator: Arc<Aggregator>) -> Result<Self, PipelineError> {
        let format = source.format.ok_or_else(|| PipelineError::Parser {
            source_path: source.path.clone(),
            reason: "format is required".to_owned(),
        })?;

        let parser = LineParser::from_format(format, source.pattern.as_deref(), &source.path)?;

        let mut metrics = Vec::with_capacity(source.metrics.len());
        for spec in &source.metrics {
            let kind = spec.kind.ok_or_else(|| PipelineError::Matcher {
                metric: spec.name.clone(),
                reason: "metric type is required".to_owned(),
            })?;

            aggregator.register(&spec.name, kind);

            let matcher = Matcher::from_spec(spec.match_spec.as_ref(), &spec.name)?;

            metrics.push(MetricBinding {
                name: spec.name.clone(),
                kind,
                extract_field: spec.extract.as_ref().map(|e| e.field.clone()),
                matcher,
            });
        }

        Ok(Self {
            path: source.path.clone(),
            parser,
            metrics,
            aggregator,
            lines_parsed: AtomicU64::new(0),
            lines_matched: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        })
    }

    /// 라인 하나를 처리합니다.
    ///
    /// 파싱 실패는 에러 카운트 후 무시합니다. 매칭된 메트릭의 갱신은
    /// 수집된 뒤 단일 잠금 획득으로 적용되므로, 스냅샷은 한 라인의
    /// 효과를 전부 보거나 전혀 보지 않습니다. 추출·변환 실패는 해당
    /// 메트릭만 건너뜁니다.
    pub fn process_line(&self, line: &str) {
        let Some(rec) = self.parser.parse(line) else {
            self.parse_errors.fetch_add(1, Ordering::Relaxed);
            debug!(path = %self.path, "failed to parse line");
            return;
        };

        self.lines_parsed.fetch_add(1, Ordering::Relaxed);

        let mut updates: Vec<MetricUpdate<'_>> = Vec::new();
        for binding in &self.metrics {
            if !binding.matcher.matches(&rec) {
                continue;
            }

            match binding.kind {
                MetricKind::Counter => {
                    updates.push(MetricUpdate::Increment(&binding.name));
                }
                MetricKind::Gauge => {
                    if let Some(field) = &binding.extract_field {
                        if let Some(value) = record::get_float(&rec, field) {
                            updates.push(MetricUpdate::SetGauge(&binding.name, value));
                        }
                    }
                }
                MetricKind::Sum => {
                    if let Some(field) = &binding.extract_field {
                        if let Some(value) = record::get_float(&rec, field) {
                            updates.push(MetricUpdate::Add(&binding.name, value));
                        }
                    }
                }
                MetricKind::Set => {
                    if let Some(field) = &binding.extract_field {
                        if let Some(value) = record::get_string(&rec, field) {
                            updates.push(MetricUpdate::Insert(&binding.name, value));
                        }
                    }
                }
            }
        }

        if !updates.is_empty() {
            self.lines_matched.fetch_add(1, Ordering::Relaxed);
            self.aggregator.apply(updates);
        }
    }

    /// 소스 파일 경로를 반환합니다.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 현재 관측 통계를 반환합니다.
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            lines_parsed: self.lines_parsed.load(Ordering::Relaxed),
            lines_matched: self.lines_matched.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}
