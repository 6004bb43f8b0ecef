//! 설정 관리 — agent.yaml 파싱 및 유효성 검증
//!
//! YAML 설정 트리를 serde로 역직렬화한 뒤 [`AgentConfig::validate`]로
//! 검증합니다. 알 수 없는 키는 무시됩니다 (전방 호환성).
//! 기간 필드는 humantime 접미사 문자열(`60s`, `5m`)을 받습니다.
//!
//! # YAML 스키마
//! ```yaml
//! server_url: https://collector.example.com
//! identity_file: /var/lib/emberpost/identity.json
//! app_name: web-frontend
//! app_version: 1.4.2
//! environment: production
//! interval: 60s
//! sources:
//!   - path: /var/log/app/access.log
//!     format: json
//!     metrics:
//!       - name: requests
//!         type: counter
//!         match:
//!           field: event
//!           equals: request
//!       - name: total_bytes
//!         type: sum
//!         extract:
//!           field: bytes
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 스냅샷 간격 최소값
const MIN_INTERVAL: Duration = Duration::from_secs(1);

fn default_identity_file() -> PathBuf {
    PathBuf::from("./emberpost_identity.json")
}

fn default_environment() -> String {
    "production".to_owned()
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

/// 에이전트 통합 설정
///
/// 로드 후 읽기 전용으로 사용됩니다. 모든 필드는 serde 기본값을 가지며
/// 필수 여부는 [`validate`](Self::validate)에서 검사합니다 —
/// 누락된 필드도 정확한 필드 경로와 함께 보고하기 위함입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 수집 서버 URL
    #[serde(default)]
    pub server_url: String,
    /// 식별자 파일 경로
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,
    /// 애플리케이션 이름
    #[serde(default)]
    pub app_name: String,
    /// 애플리케이션 버전
    #[serde(default)]
    pub app_version: String,
    /// 배포 환경 (production, staging 등)
    #[serde(default = "default_environment")]
    pub environment: String,
    /// 스냅샷 전송 간격 (최소 1초)
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// 로그 소스 목록
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// 로그 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 감시할 로그 파일 경로
    #[serde(default)]
    pub path: String,
    /// 라인 형식 (json 또는 regex)
    #[serde(default)]
    pub format: Option<SourceFormat>,
    /// 정규식 패턴 (format: regex일 때 필수)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// 이 소스에서 추출할 메트릭 목록
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// 라인 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// 한 줄이 하나의 JSON 객체
    Json,
    /// 명명된 캡처 그룹을 가진 정규식
    Regex,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Regex => write!(f, "regex"),
        }
    }
}

/// 메트릭 추출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    /// 메트릭 이름 (프로세스 내에서 유일해야 함)
    #[serde(default)]
    pub name: String,
    /// 메트릭 유형
    #[serde(rename = "type", default)]
    pub kind: Option<MetricKind>,
    /// 매칭 조건 (없으면 모든 레코드에 매칭)
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_spec: Option<MatchSpec>,
    /// 값 추출 대상 필드 (gauge, sum, set은 필수)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractSpec>,
}

/// 메트릭 유형
///
/// 스냅샷 시 counter/sum/set은 초기화되고 gauge는 유지됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// 매칭된 라인 수 (+1 누적)
    Counter,
    /// 마지막 값 유지
    Gauge,
    /// 값 합산 (음수 허용)
    Sum,
    /// 고유 문자열 집합 (관측값은 원소 수)
    Set,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Sum => write!(f, "sum"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// 매칭 조건
///
/// `field`에 대해 equals / in / regex / contains 중 정확히 하나의
/// 조건을 지정해야 합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    /// 검사할 필드 경로 (dot notation)
    #[serde(default)]
    pub field: String,
    /// 완전 일치
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    /// 목록 내 포함 여부
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
    /// 정규식 부분 일치 (앵커링은 패턴이 제어)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// 부분 문자열 포함
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

/// 필드 추출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSpec {
    /// 추출할 필드 경로 (dot notation)
    #[serde(default)]
    pub field: String,
}

impl AgentConfig {
    /// 설정 파일을 읽고 파싱·검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::FileUnreadable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        Self::parse_str(&data)
    }

    /// YAML 문자열을 파싱하고 검증합니다.
    pub fn parse_str(data: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(data).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 실패 시 문제가 된 필드 경로를 포함한 에러를 반환합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.is_empty() {
            return Err(invalid("server_url", "server_url is required"));
        }

        if self.app_name.is_empty() {
            return Err(invalid("app_name", "app_name is required"));
        }

        if self.app_version.is_empty() {
            return Err(invalid("app_version", "app_version is required"));
        }

        if self.interval < MIN_INTERVAL {
            return Err(invalid("interval", "interval must be at least 1 second"));
        }

        if self.sources.is_empty() {
            return Err(invalid("sources", "at least one source is required"));
        }

        let mut seen_names = HashSet::new();
        for (i, src) in self.sources.iter().enumerate() {
            src.validate(i)?;

            // 메트릭 이름은 프로세스 전체에서 유일해야 함
            for (j, m) in src.metrics.iter().enumerate() {
                if !seen_names.insert(m.name.as_str()) {
                    return Err(invalid(
                        &format!("sources[{i}].metrics[{j}].name"),
                        &format!("duplicate metric name '{}'", m.name),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl SourceConfig {
    fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        let prefix = format!("sources[{idx}]");

        if self.path.is_empty() {
            return Err(invalid(&format!("{prefix}.path"), "path is required"));
        }

        let format = self
            .format
            .ok_or_else(|| invalid(&format!("{prefix}.format"), "format is required"))?;

        if format == SourceFormat::Regex {
            let pattern = self.pattern.as_deref().unwrap_or_default();
            if pattern.is_empty() {
                return Err(invalid(
                    &format!("{prefix}.pattern"),
                    "pattern is required for regex format",
                ));
            }
            Regex::new(pattern).map_err(|e| {
                invalid(
                    &format!("{prefix}.pattern"),
                    &format!("invalid regex pattern: {e}"),
                )
            })?;
        }

        if self.metrics.is_empty() {
            return Err(invalid(
                &format!("{prefix}.metrics"),
                "at least one metric is required",
            ));
        }

        for (j, m) in self.metrics.iter().enumerate() {
            m.validate(&format!("{prefix}.metrics[{j}]"))?;
        }

        Ok(())
    }
}

impl MetricSpec {
    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(invalid(&format!("{prefix}.name"), "name is required"));
        }

        let kind = self.kind.ok_or_else(|| {
            invalid(
                &format!("{prefix}.type"),
                "type must be one of: counter, gauge, sum, set",
            )
        })?;

        // counter는 값을 추출하지 않으므로 extract가 무시됩니다
        if matches!(kind, MetricKind::Gauge | MetricKind::Sum | MetricKind::Set)
            && self.extract.is_none()
        {
            return Err(invalid(
                &format!("{prefix}.extract"),
                &format!("extract is required for type '{kind}'"),
            ));
        }

        if let Some(extract) = &self.extract {
            if extract.field.is_empty() {
                return Err(invalid(
                    &format!("{prefix}.extract.field"),
                    "field is required",
                ));
            }
        }

        if let Some(m) = &self.match_spec {
            m.validate(&format!("{prefix}.match"))?;
        }

        Ok(())
    }
}

impl MatchSpec {
    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if self.field.is_empty() {
            return Err(invalid(&format!("{prefix}.field"), "field is required"));
        }

        let mut conditions = 0;
        if self.equals.is_some() {
            conditions += 1;
        }
        if self.one_of.is_some() {
            conditions += 1;
        }
        if self.regex.is_some() {
            conditions += 1;
        }
        if self.contains.is_some() {
            conditions += 1;
        }

        if conditions == 0 {
            return Err(invalid(
                prefix,
                "exactly one condition (equals, in, regex, contains) is required",
            ));
        }

        if conditions > 1 {
            return Err(invalid(
                prefix,
                "only one condition (equals, in, regex, contains) is allowed",
            ));
        }

        if let Some(values) = &self.one_of {
            if values.is_empty() {
                return Err(invalid(&format!("{prefix}.in"), "list must not be empty"));
            }
        }

        if let Some(pattern) = &self.regex {
            Regex::new(pattern).map_err(|e| {
                invalid(&format!("{prefix}.regex"), &format!("invalid regex: {e}"))
            })?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}
