//! 에러 타입 — 설정 도메인 에러 정의

/// 설정 관련 에러
///
/// 설정 파일 로딩과 유효성 검증 실패를 표현합니다.
/// 사용자에게 보여지는 메시지이므로 항상 문제가 된 경로 또는
/// 필드명을 포함합니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 읽을 수 없음
    #[error("config file unreadable: {path}: {reason}")]
    FileUnreadable {
        /// 설정 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// YAML 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed {
        /// 파싱 실패 사유
        reason: String,
    },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// 문제가 된 필드 경로 (예: "sources[0].metrics[1].match")
        field: String,
        /// 검증 실패 사유
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_display_includes_field() {
        let err = ConfigError::InvalidValue {
            field: "sources[0].path".to_owned(),
            reason: "path is required".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sources[0].path"));
        assert!(msg.contains("path is required"));
    }

    #[test]
    fn file_unreadable_display_includes_path() {
        let err = ConfigError::FileUnreadable {
            path: "/etc/emberpost/agent.yaml".to_owned(),
            reason: "permission denied".to_owned(),
        };
        assert!(err.to_string().contains("agent.yaml"));
    }
}
