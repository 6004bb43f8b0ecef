//! 레코드 모델 — 파싱된 라인의 필드 트리와 경로 탐색
//!
//! 파서가 생성한 레코드는 문자열 키에서 임의 값으로 가는 매핑입니다.
//! 필드 경로는 dot notation(`response.bytes`)으로 중첩 매핑을
//! 탐색하며, 여기 정의된 문자열/실수 변환 규칙이 비정형 레코드와
//! 매처·집계기의 타입 세계를 잇는 유일한 다리입니다.

use serde_json::Value;

/// 파싱된 한 라인의 필드 매핑
///
/// 파서가 생성한 뒤에는 변경되지 않습니다.
pub type Record = serde_json::Map<String, Value>;

/// 레코드에서 dot notation 경로의 값을 조회합니다.
///
/// 각 경로 세그먼트는 현재 노드(매핑이어야 함)에서 조회됩니다.
/// 세그먼트가 없거나 중간 노드가 매핑이 아니면 `None`을 반환합니다.
pub fn get<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}

/// 경로의 값을 문자열로 변환하여 조회합니다.
///
/// 변환 규칙:
/// - 문자열: 그대로
/// - 정수: 십진 표기
/// - 실수: 최단 왕복 십진 표기 (정수값이면 소수점 없이)
/// - 불리언: `"true"` / `"false"`
/// - 그 외 (null, 매핑, 배열): 실패
pub fn get_string(record: &Record, path: &str) -> Option<String> {
    match get(record, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                // f64 Display는 최단 왕복 표기이며 정수값은 소수점 없이 출력
                n.as_f64().map(|f| format!("{f}"))
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 경로의 값을 f64로 변환하여 조회합니다.
///
/// 숫자는 직접 변환, 문자열은 십진 실수로 파싱합니다.
/// 불리언과 복합 값은 실패합니다.
pub fn get_float(record: &Record, path: &str) -> Option<f64> {
    match get(record, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> Record {
        match serde_json::from_str::<Value>(json).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn get_top_level_field() {
        let r = record(r#"{"event":"request"}"#);
        assert_eq!(get(&r, "event"), Some(&Value::String("request".into())));
    }

    #[test]
    fn get_nested_field() {
        let r = record(r#"{"response":{"status":200,"meta":{"cached":true}}}"#);
        assert!(get(&r, "response.status").is_some());
        assert_eq!(get(&r, "response.meta.cached"), Some(&Value::Bool(true)));
    }

    #[test]
    fn get_missing_segment_fails() {
        let r = record(r#"{"response":{"status":200}}"#);
        assert_eq!(get(&r, "response.bytes"), None);
        assert_eq!(get(&r, "request.status"), None);
    }

    #[test]
    fn get_through_non_mapping_fails() {
        let r = record(r#"{"status":200,"items":[1,2,3]}"#);
        assert_eq!(get(&r, "status.code"), None);
        assert_eq!(get(&r, "items.0"), None);
    }

    #[test]
    fn get_string_passes_strings_through() {
        let r = record(r#"{"user":"alice"}"#);
        assert_eq!(get_string(&r, "user"), Some("alice".to_owned()));
    }

    #[test]
    fn get_string_formats_integers_without_decimal_point() {
        let r = record(r#"{"status":500,"big":9007199254740993}"#);
        assert_eq!(get_string(&r, "status"), Some("500".to_owned()));
        assert_eq!(get_string(&r, "big"), Some("9007199254740993".to_owned()));
    }

    #[test]
    fn get_string_formats_floats_shortest_round_trip() {
        let r = record(r#"{"ratio":3.14,"whole":500.0}"#);
        assert_eq!(get_string(&r, "ratio"), Some("3.14".to_owned()));
        // 정수값 실수는 소수점 없이
        assert_eq!(get_string(&r, "whole"), Some("500".to_owned()));
    }

    #[test]
    fn get_string_formats_booleans() {
        let r = record(r#"{"ok":true,"fail":false}"#);
        assert_eq!(get_string(&r, "ok"), Some("true".to_owned()));
        assert_eq!(get_string(&r, "fail"), Some("false".to_owned()));
    }

    #[test]
    fn get_string_fails_on_null_and_compound() {
        let r = record(r#"{"gone":null,"obj":{},"arr":[]}"#);
        assert_eq!(get_string(&r, "gone"), None);
        assert_eq!(get_string(&r, "obj"), None);
        assert_eq!(get_string(&r, "arr"), None);
    }

    #[test]
    fn get_float_converts_numbers() {
        let r = record(r#"{"count":42,"ratio":0.5,"neg":-7}"#);
        assert_eq!(get_float(&r, "count"), Some(42.0));
        assert_eq!(get_float(&r, "ratio"), Some(0.5));
        assert_eq!(get_float(&r, "neg"), Some(-7.0));
    }

    #[test]
    fn get_float_parses_numeric_strings() {
        let r = record(r#"{"bytes":"1024","bad":"12x"}"#);
        assert_eq!(get_float(&r, "bytes"), Some(1024.0));
        assert_eq!(get_float(&r, "bad"), None);
    }

    #[test]
    fn get_float_fails_on_bool_and_compound() {
        let r = record(r#"{"ok":true,"obj":{"v":1}}"#);
        assert_eq!(get_float(&r, "ok"), None);
        assert_eq!(get_float(&r, "obj"), None);
    }

    #[test]
    fn nested_extraction_for_floats() {
        let r = record(r#"{"metrics":{"active_sessions":17}}"#);
        assert_eq!(get_float(&r, "metrics.active_sessions"), Some(17.0));
    }

    #[test]
    fn empty_path_segment_misses() {
        let r = record(r#"{"a":{"b":1}}"#);
        assert_eq!(get(&r, "a..b"), None);
        assert_eq!(get(&r, ""), None);
    }
}
