//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 파서 구성, 매처 구성, 테일러 생명주기 등
//! 파이프라인 내부의 에러 상황을 포괄합니다. 라인 단위 파싱 실패는
//! 에러가 아니라 카운트되는 미스이므로 여기에 없습니다.

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파서 구성 실패
    #[error("parser error: {source_path}: {reason}")]
    Parser {
        /// 소스 파일 경로
        source_path: String,
        /// 실패 사유
        reason: String,
    },

    /// 매처 구성 실패
    #[error("matcher error: metric '{metric}': {reason}")]
    Matcher {
        /// 문제가 된 메트릭 이름
        metric: String,
        /// 실패 사유
        reason: String,
    },

    /// 테일러 에러 (파일 열기, 생명주기 위반 등)
    #[error("tailer error: {path}: {reason}")]
    Tailer {
        /// 감시 대상 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 이미 실행 중인 테일러를 다시 시작
    #[error("tailer already running: {path}")]
    AlreadyRunning {
        /// 감시 대상 파일 경로
        path: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}
