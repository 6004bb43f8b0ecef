//! 정규식 라인 파서
//!
//! 소스 설정의 패턴으로 한 번만 컴파일됩니다. 매칭된 라인의 모든
//! **명명된** 캡처 그룹이 문자열 필드가 되고, 익명 그룹은 버려집니다.
//! 명명된 그룹이 하나도 없는 매치는 파싱 실패로 취급합니다 —
//! "레코드가 없으면 하위 단계는 무시한다"는 계약을 지키기 위함입니다.

use emberpost_core::Record;
use regex::Regex;
use serde_json::Value;

/// 정규식 라인 파서
#[derive(Debug)]
pub struct RegexParser {
    /// 컴파일된 패턴
    re: Regex,
}

impl RegexParser {
    /// 패턴을 컴파일하여 파서를 생성합니다.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            re: Regex::new(pattern)?,
        })
    }

    /// 라인을 패턴에 매칭하여 명명된 그룹을 레코드로 변환합니다.
    ///
    /// 매칭 실패 또는 명명된 그룹 없음은 `None`입니다.
    /// 매칭됐지만 값이 없는 선택적 그룹(`(?P<x>...)?`)은 제외됩니다.
    pub fn parse(&self, line: &str) -> Option<Record> {
        let caps = self.re.captures(line)?;

        let mut record = Record::new();
        for name in self.re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                record.insert(name.to_owned(), Value::String(m.as_str().to_owned()));
            }
        }

        if record.is_empty() {
            return None;
        }

        Some(record)
    }

    /// 패턴 문자열을 반환합니다.
    pub fn pattern(&self) -> &str {
        self.re.as_str()
    }

    /// 명명된 캡처 그룹 목록을 반환합니다.
    pub fn group_names(&self) -> Vec<&str> {
        self.re.capture_names().flatten().collect()
    }
}
