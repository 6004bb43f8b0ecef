//! 라인 파서 — 원시 라인을 레코드로 변환합니다.
//!
//! 파서는 닫힌 두 변형의 enum입니다. 파싱 실패는 에러가 아니라
//! `None`이며, 레코드가 없으면 하위 단계(매처·집계기)는 해당 라인을
//! 완전히 무시합니다.

pub mod json;
pub mod regex;

pub use json::JsonParser;
pub use regex::RegexParser;

use emberpost_core::config::SourceFormat;
use emberpost_core::Record;

use crate::error::PipelineError;

/// 라인 파서
///
/// 소스 설정의 `format`에 따라 구성됩니다. 파서 집합은 닫혀 있으므로
/// trait object 대신 enum을 사용합니다.
#[derive(Debug)]
pub enum LineParser {
    /// 한 줄이 하나의 JSON 객체
    Json(JsonParser),
    /// 명명된 캡처 그룹을 가진 정규식
    Pattern(RegexParser),
}

impl LineParser {
    /// 소스 형식으로부터 파서를 생성합니다.
    ///
    /// `format: regex`인데 패턴이 없거나 컴파일되지 않으면 에러를
    /// 반환합니다. 설정 검증을 통과한 설정에서는 실패하지 않습니다.
    pub fn from_format(
        format: SourceFormat,
        pattern: Option<&str>,
        source_path: &str,
    ) -> Result<Self, PipelineError> {
        match format {
            SourceFormat::Json => Ok(Self::Json(JsonParser::new())),
            SourceFormat::Regex => {
                let pattern = pattern.filter(|p| !p.is_empty()).ok_or_else(|| {
                    PipelineError::Parser {
                        source_path: source_path.to_owned(),
                        reason: "pattern is required for regex format".to_owned(),
                    }
                })?;
                let parser =
                    RegexParser::new(pattern).map_err(|e| PipelineError::Parser {
                        source_path: source_path.to_owned(),
                        reason: e.to_string(),
                    })?;
                Ok(Self::Pattern(parser))
            }
        }
    }

    /// 라인을 파싱하여 레코드를 반환합니다. 파싱 불가 시 `None`.
    pub fn parse(&self, line: &str) -> Option<Record> {
        match self {
            Self::Json(p) => p.parse(line),
            Self::Pattern(p) => p.parse(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_format_builds_json_parser() {
        let parser = LineParser::from_format(SourceFormat::Json, None, "/var/log/a.log").unwrap();
        assert!(matches!(parser, LineParser::Json(_)));
    }

    #[test]
    fn from_format_builds_regex_parser() {
        let parser = LineParser::from_format(
            SourceFormat::Regex,
            Some(r"^(?P<level>\w+)"),
            "/var/log/a.log",
        )
        .unwrap();
        assert!(matches!(parser, LineParser::Pattern(_)));
    }

    #[test]
    fn regex_format_without_pattern_fails() {
        let err =
            LineParser::from_format(SourceFormat::Regex, None, "/var/log/a.log").unwrap_err();
        assert!(err.to_string().contains("/var/log/a.log"));
    }

    #[test]
    fn regex_format_with_bad_pattern_fails() {
        assert!(
            LineParser::from_format(SourceFormat::Regex, Some("[bad"), "/var/log/a.log").is_err()
        );
    }
}
