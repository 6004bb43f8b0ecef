//! 매처 — 레코드 한 필드에 대한 조건 평가
//!
//! 설정의 `match` 블록에서 생성됩니다. 블록이 없으면 항상 참인
//! 매처가 됩니다. 정규식은 생성 시 한 번만 컴파일하고 `in` 목록은
//! 해시 집합으로 변환하여, 평가는 잠금 없는 읽기 전용 연산입니다.
//!
//! 모든 비교는 대소문자를 구분하며 바이트 단위로 정확합니다. 숫자
//! 필드는 표준 문자열 표기로 비교되므로 `status: 500`은
//! `equals: "500"`과 `regex: "^5\d{2}$"` 모두에 매칭됩니다.

use std::collections::HashSet;

use regex::Regex;

use emberpost_core::config::MatchSpec;
use emberpost_core::{record, Record};

use crate::error::PipelineError;

/// 단일 조건
#[derive(Debug)]
pub enum Condition {
    /// 완전 일치
    Equals(String),
    /// 사전 해시된 집합 내 포함
    In(HashSet<String>),
    /// 컴파일된 정규식 부분 일치 (앵커링은 패턴이 제어)
    Pattern(Regex),
    /// 부분 문자열 포함
    Contains(String),
}

/// 레코드 매처
#[derive(Debug)]
pub enum Matcher {
    /// 조건 없음 — 모든 레코드에 매칭
    Always,
    /// 한 필드에 대한 단일 조건
    Field {
        /// 검사할 필드 경로
        field: String,
        /// 평가할 조건
        condition: Condition,
    },
}

impl Matcher {
    /// `match` 블록으로부터 매처를 생성합니다.
    ///
    /// `spec`이 `None`이면 항상 참인 매처를 반환합니다.
    /// 설정 검증이 정확히 하나의 조건을 보장하지만, 방어적으로
    /// 조건이 없으면 에러를 반환합니다.
    pub fn from_spec(spec: Option<&MatchSpec>, metric: &str) -> Result<Self, PipelineError> {
        let Some(spec) = spec else {
            return Ok(Self::Always);
        };

        let condition = if let Some(value) = &spec.equals {
            Condition::Equals(value.clone())
        } else if let Some(values) = &spec.one_of {
            Condition::In(values.iter().cloned().collect())
        } else if let Some(pattern) = &spec.regex {
            let re = Regex::new(pattern).map_err(|e| PipelineError::Matcher {
                metric: metric.to_owned(),
                reason: format!("invalid regex: {e}"),
            })?;
            Condition::Pattern(re)
        } else if let Some(value) = &spec.contains {
            Condition::Contains(value.clone())
        } else {
            return Err(PipelineError::Matcher {
                metric: metric.to_owned(),
                reason: "match block has no condition".to_owned(),
            });
        };

        Ok(Self::Field {
            field: spec.field.clone(),
            condition,
        })
    }

    /// 레코드가 조건에 매칭되는지 평가합니다.
    ///
    /// 필드를 문자열로 해석할 수 없으면 (경로 미스, 변환 실패)
    /// false입니다.
    pub fn matches(&self, rec: &Record) -> bool {
        let Self::Field { field, condition } = self else {
            return true;
        };

        let Some(value) = record::get_string(rec, field) else {
            return false;
        };

        match condition {
            Condition::Equals(expected) => value == *expected,
            Condition::In(set) => set.contains(&value),
            Condition::Pattern(re) => re.is_match(&value),
            Condition::Contains(needle) => value.contains(needle.as_str()),
        }
    }

    /// 이 매처가 검사하는 필드 경로를 반환합니다.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Always => None,
            Self::Field { field, .. } => Some(field),
        }
    }

    /// 조건 없이 항상 매칭되는지 여부를 반환합니다.
    pub fn always_matches(&self) -> bool {
        matches!(self, Self::Always)
    }
}
