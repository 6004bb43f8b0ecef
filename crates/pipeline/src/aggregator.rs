//! 집계기 — 유형별 메트릭 누산기 레지스트리
//!
//! 이름으로 키된 메트릭 상태를 하나의 `RwLock` 아래에서 관리합니다.
//! 쓰기 연산은 호출 단위로 쓰기 잠금을 잡고, [`Aggregator::apply`]는
//! 한 라인의 모든 갱신을 단일 잠금 획득으로 처리하여 스냅샷이 한
//! 라인의 효과를 전부 보거나 전혀 보지 않도록 보장합니다.
//!
//! # 초기화 계약
//! [`snapshot`](Aggregator::snapshot)은 counter/sum/set을 빈 상태로
//! 되돌리고 gauge는 유지합니다. [`reset`](Aggregator::reset)은 gauge를
//! 포함한 전체를 되돌립니다 (테스트용).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use serde::Serialize;

use emberpost_core::config::MetricKind;

/// 메트릭 셀 — 등록된 메트릭 하나의 현재 상태
#[derive(Debug)]
enum MetricCell {
    /// 음이 아닌 누산기
    Counter(f64),
    /// 마지막 기록 값
    Gauge(f64),
    /// 가산 누산기 (음수 허용)
    Sum(f64),
    /// 고유 문자열 집합
    Set(HashSet<String>),
}

impl MetricCell {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(0.0),
            MetricKind::Gauge => Self::Gauge(0.0),
            MetricKind::Sum => Self::Sum(0.0),
            MetricKind::Set => Self::Set(HashSet::new()),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Sum(_) => MetricKind::Sum,
            Self::Set(_) => MetricKind::Set,
        }
    }

    fn observe(&self) -> ObservedValue {
        match self {
            Self::Counter(v) | Self::Gauge(v) | Self::Sum(v) => ObservedValue::Float(*v),
            Self::Set(s) => ObservedValue::Count(s.len() as u64),
        }
    }
}

/// 관측값 — peek/snapshot이 반환하는 값
///
/// counter/gauge/sum은 실수, set은 원소 수(정수)입니다.
/// untagged 직렬화로 JSON에서도 실수/정수 구분이 그대로 드러나며,
/// 이 구분은 공개 계약의 일부입니다.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ObservedValue {
    /// counter / gauge / sum의 값
    Float(f64),
    /// set의 원소 수
    Count(u64),
}

impl ObservedValue {
    /// 값을 f64로 반환합니다 (set은 원소 수).
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Float(v) => *v,
            Self::Count(n) => *n as f64,
        }
    }
}

/// 한 라인에서 파생된 단일 메트릭 갱신
///
/// [`SourceProcessor`](crate::processor::SourceProcessor)가 라인당
/// 갱신 목록을 만들어 [`Aggregator::apply`]로 일괄 적용합니다.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate<'a> {
    /// counter +1
    Increment(&'a str),
    /// gauge 덮어쓰기
    SetGauge(&'a str, f64),
    /// sum 가산
    Add(&'a str, f64),
    /// set 삽입
    Insert(&'a str, String),
}

/// 메트릭 집계기
///
/// 모든 연산은 전체 레지스트리를 덮는 단일 잠금을 사용합니다.
/// 경합은 낮습니다 — 라인당 잠금 한 번, 스냅샷당 한 번.
#[derive(Debug, Default)]
pub struct Aggregator {
    metrics: RwLock<HashMap<String, MetricCell>>,
}

impl Aggregator {
    /// 새 집계기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 메트릭을 등록합니다.
    ///
    /// 멱등 연산입니다 — 같은 이름의 재등록은 유형과 무관하게
    /// 상태를 보존하는 no-op입니다 (재타이핑도, 초기화도 없음).
    pub fn register(&self, name: &str, kind: MetricKind) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        metrics
            .entry(name.to_owned())
            .or_insert_with(|| MetricCell::new(kind));
    }

    /// counter를 1 증가시킵니다. counter가 아니거나 미등록이면 no-op.
    pub fn increment(&self, name: &str) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        if let Some(MetricCell::Counter(v)) = metrics.get_mut(name) {
            *v += 1.0;
        }
    }

    /// gauge 값을 덮어씁니다. gauge가 아니거나 미등록이면 no-op.
    pub fn set_gauge(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        if let Some(MetricCell::Gauge(v)) = metrics.get_mut(name) {
            *v = value;
        }
    }

    /// sum에 값을 더합니다. sum이 아니거나 미등록이면 no-op.
    pub fn add(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        if let Some(MetricCell::Sum(v)) = metrics.get_mut(name) {
            *v += value;
        }
    }

    /// set에 값을 삽입합니다. set이 아니거나 미등록이면 no-op.
    ///
    /// 집합 멤버십은 문자열의 바이트 단위 동등성입니다.
    pub fn insert(&self, name: &str, value: impl Into<String>) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        if let Some(MetricCell::Set(s)) = metrics.get_mut(name) {
            s.insert(value.into());
        }
    }

    /// 갱신 목록을 단일 잠금 획득으로 적용합니다.
    ///
    /// 한 라인의 모든 메트릭 갱신이 스냅샷 초기화와 인터리빙되지
    /// 않도록 보장하는 경로입니다. 유형 불일치·미등록 갱신은
    /// 개별적으로 무시됩니다.
    pub fn apply<'a>(&self, updates: impl IntoIterator<Item = MetricUpdate<'a>>) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        for update in updates {
            match update {
                MetricUpdate::Increment(name) => {
                    if let Some(MetricCell::Counter(v)) = metrics.get_mut(name) {
                        *v += 1.0;
                    }
                }
                MetricUpdate::SetGauge(name, value) => {
                    if let Some(MetricCell::Gauge(v)) = metrics.get_mut(name) {
                        *v = value;
                    }
                }
                MetricUpdate::Add(name, value) => {
                    if let Some(MetricCell::Sum(v)) = metrics.get_mut(name) {
                        *v += value;
                    }
                }
                MetricUpdate::Insert(name, value) => {
                    if let Some(MetricCell::Set(s)) = metrics.get_mut(name) {
                        s.insert(value);
                    }
                }
            }
        }
    }

    /// 현재 관측값을 초기화 없이 반환합니다.
    pub fn peek(&self) -> BTreeMap<String, ObservedValue> {
        let metrics = self.metrics.read().expect("aggregator lock poisoned");
        metrics
            .iter()
            .map(|(name, cell)| (name.clone(), cell.observe()))
            .collect()
    }

    /// 현재 관측값을 반환하고 counter/sum/set을 초기화합니다.
    ///
    /// gauge는 유지됩니다.
    pub fn snapshot(&self) -> BTreeMap<String, ObservedValue> {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        let mut result = BTreeMap::new();

        for (name, cell) in metrics.iter_mut() {
            result.insert(name.clone(), cell.observe());
            match cell {
                MetricCell::Counter(v) | MetricCell::Sum(v) => *v = 0.0,
                MetricCell::Gauge(_) => {}
                MetricCell::Set(s) => s.clear(),
            }
        }

        result
    }

    /// gauge를 포함한 모든 누산기를 초기 상태로 되돌립니다.
    pub fn reset(&self) {
        let mut metrics = self.metrics.write().expect("aggregator lock poisoned");
        for cell in metrics.values_mut() {
            match cell {
                MetricCell::Counter(v) | MetricCell::Gauge(v) | MetricCell::Sum(v) => *v = 0.0,
                MetricCell::Set(s) => s.clear(),
            }
        }
    }

    /// 등록된 메트릭의 유형을 반환합니다.
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        let metrics = self.metrics.read().expect("aggregator lock poisoned");
        metrics.get(name).map(MetricCell::kind)
    }
}
