//! JSON 라인 파서
//!
//! 한 줄을 단일 최상위 JSON 객체로 해석합니다. 디코딩 실패, 빈 줄,
//! 최상위가 객체가 아닌 값(배열 등)은 모두 `None`입니다.
//! 중첩 객체는 그대로 보존되어 필드 경로 탐색이 가능합니다.

use emberpost_core::Record;
use serde_json::Value;

/// JSON 라인 파서
#[derive(Debug, Default)]
pub struct JsonParser;

impl JsonParser {
    /// 새 JSON 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 라인을 JSON 객체로 파싱합니다.
    pub fn parse(&self, line: &str) -> Option<Record> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}
