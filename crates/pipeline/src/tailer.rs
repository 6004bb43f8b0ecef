//! 파일 테일러 — 로테이션을 감지하는 라인 팔로워
//!
//! 지정된 파일을 주기적으로 폴링하여 새로 추가된 라인을 정확히 한 번씩
//! mpsc 채널로 전달합니다. `tail -f`와 유사한 동작을 비동기로 구현합니다.
//!
//! # 로테이션 감지
//! - inode 변경 감지 (logrotate의 rename/recreate)
//! - 파일 크기 축소 감지 (truncation)
//! - 감지 후 새 파일의 오프셋 0부터 다시 읽기
//!
//! # 라인 계약
//! - 종단 `\n`(또는 `\r\n`)이 제거된 완전한 라인만 전달
//! - EOF의 불완전한 라인은 종단될 때까지 보류
//! - 1 MiB 초과 라인은 해당 라인만 폐기 (다음 라인부터 정상 전달)

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::{metadata, File};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// 전달 가능한 최대 라인 길이 (바이트)
///
/// 손상된 입력으로 인한 메모리 폭주를 막습니다. 정확히 이 길이의
/// 라인은 전달되고, 1바이트라도 초과하면 해당 라인은 실패합니다.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// 한 번의 폴링에서 읽을 최대 라인 수
const MAX_LINES_PER_POLL: usize = 1000;

/// 테일러 설정
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// 파일 상태 체크 주기 (밀리초)
    pub poll_interval_ms: u64,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

/// 시작 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFrom {
    /// 현재 파일 끝에서 시작 — 이후 추가되는 라인만 전달 (운영 모드)
    End,
    /// 파일 처음부터 전체를 전달한 뒤 팔로우 (테스트/배치 모드)
    Beginning,
}

/// 테일러 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerStatus {
    /// 시작 전
    Idle,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 파일 테일러
///
/// [`start`](Self::start)가 내부 읽기 태스크를 스폰하고,
/// [`stop`](Self::stop)이 태스크 종료를 대기합니다. 정지 후에는
/// 더 이상 라인이 전달되지 않으며 모든 파일 핸들이 해제됩니다.
#[derive(Debug)]
pub struct Tailer {
    /// 감시 대상 파일 경로
    path: PathBuf,
    /// 폴링 설정
    config: TailerConfig,
    /// 라인 전달 채널 (시작 시 읽기 태스크로 이동)
    tx: Option<mpsc::Sender<Bytes>>,
    /// 현재 상태
    status: TailerStatus,
    /// 종료 신호 송신측
    shutdown_tx: Option<broadcast::Sender<()>>,
    /// 읽기 태스크 핸들
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Tailer {
    /// 새 테일러를 생성합니다.
    pub fn new(path: impl Into<PathBuf>, config: TailerConfig, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            path: path.into(),
            config,
            tx: Some(tx),
            status: TailerStatus::Idle,
            shutdown_tx: None,
            task: None,
        }
    }

    /// 테일링을 시작합니다.
    ///
    /// 실행 중에 다시 시작하면 실패합니다. 파일이 존재하지 않으면
    /// 즉시 실패합니다.
    pub async fn start(&mut self, from: StartFrom) -> Result<(), PipelineError> {
        if self.status == TailerStatus::Running {
            return Err(PipelineError::AlreadyRunning {
                path: self.path.display().to_string(),
            });
        }

        let meta = metadata(&self.path)
            .await
            .map_err(|e| PipelineError::Tailer {
                path: self.path.display().to_string(),
                reason: format!("file does not exist: {e}"),
            })?;

        let tx = self.tx.take().ok_or_else(|| PipelineError::Tailer {
            path: self.path.display().to_string(),
            reason: "tailer already stopped, cannot restart".to_owned(),
        })?;

        // 시작 위치는 start() 시점의 파일 길이로 고정
        let offset = match from {
            StartFrom::End => meta.len(),
            StartFrom::Beginning => 0,
        };

        #[cfg(unix)]
        let inode = inode_of(&self.path).await.ok();
        #[cfg(not(unix))]
        let inode = None;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let path = self.path.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let task = tokio::spawn(run_loop(path, poll_interval, offset, inode, tx, shutdown_rx));

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        self.status = TailerStatus::Running;

        info!(path = %self.path.display(), ?from, "started tailing file");
        Ok(())
    }

    /// 테일링을 정지합니다.
    ///
    /// 멱등 연산입니다. 반환 시 읽기 태스크가 종료되어 더 이상
    /// 라인이 전달되지 않음이 보장됩니다.
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
            info!(path = %self.path.display(), "stopped tailing file");
        }

        if self.status == TailerStatus::Running {
            self.status = TailerStatus::Stopped;
        }
    }

    /// 감시 중인 파일 경로를 반환합니다.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 상태를 반환합니다.
    pub fn status(&self) -> TailerStatus {
        self.status
    }
}

/// 읽기 태스크 본체 — 폴링, 로테이션 감지, 라인 전달
async fn run_loop(
    path: PathBuf,
    poll_interval: Duration,
    mut offset: u64,
    #[cfg_attr(not(unix), allow(unused_mut, unused_variables))] mut inode: Option<u64>,
    tx: mpsc::Sender<Bytes>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // 초과 라인 폐기 중 여부 (종단 \n까지 폴링을 넘어 유지)
    let mut skipping = false;

    loop {
        // 로테이션 확인: inode가 바뀌면 새 파일의 0부터
        #[cfg(unix)]
        {
            if let Ok(current) = inode_of(&path).await {
                if inode.is_some() && inode != Some(current) {
                    info!(path = %path.display(), "file rotation detected, reopening at start");
                    offset = 0;
                    skipping = false;
                }
                inode = Some(current);
            }
        }

        // Truncation 확인: 파일이 오프셋보다 짧아지면 0부터
        match metadata(&path).await {
            Ok(meta) => {
                if meta.len() < offset {
                    warn!(
                        path = %path.display(),
                        size = meta.len(),
                        offset,
                        "file truncation detected, reopening at start"
                    );
                    offset = 0;
                    skipping = false;
                }

                match read_new_lines(&path, offset, skipping).await {
                    Ok(outcome) => {
                        offset = outcome.offset;
                        skipping = outcome.skipping;
                        for line in outcome.lines {
                            if tx.send(line).await.is_err() {
                                debug!(path = %path.display(), "line receiver dropped, stopping");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read file, retrying");
                    }
                }
            }
            Err(e) => {
                // 로테이션 도중 파일이 잠시 사라질 수 있음 — 다음 폴링에서 재시도
                debug!(path = %path.display(), error = %e, "file not accessible, retrying");
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(path = %path.display(), "tailer shutting down");
                return;
            }
            _ = sleep(poll_interval) => {}
        }
    }
}

/// 한 번의 폴링 읽기 결과
struct ReadOutcome {
    lines: Vec<Bytes>,
    offset: u64,
    skipping: bool,
}

/// 오프셋부터 완전한 라인들을 읽습니다.
///
/// 반환 오프셋은 마지막으로 소비한 바이트 직후를 가리킵니다.
/// EOF의 불완전한 라인은 소비하지 않고 보류합니다.
async fn read_new_lines(
    path: &Path,
    start_offset: u64,
    mut skipping: bool,
) -> std::io::Result<ReadOutcome> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    reader.seek(std::io::SeekFrom::Start(start_offset)).await?;

    // 종단 \r\n까지 포함한 읽기 한계. 한계만큼 읽고도 종단이 없으면 초과 라인.
    let limit = (MAX_LINE_BYTES + 2) as u64;

    let mut lines = Vec::new();
    let mut offset = start_offset;
    let mut buf: Vec<u8> = Vec::new();

    loop {
        buf.clear();
        let n = (&mut reader).take(limit).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }

        let terminated = buf.last() == Some(&b'\n');

        if skipping {
            // 초과 라인의 잔여 바이트 폐기
            offset += n as u64;
            if terminated {
                skipping = false;
            }
            continue;
        }

        if terminated {
            offset += n as u64;
            let line = strip_line_ending(&buf);
            if line.len() > MAX_LINE_BYTES {
                warn!(
                    path = %path.display(),
                    length = line.len(),
                    max = MAX_LINE_BYTES,
                    "line exceeds max length, dropping"
                );
                continue;
            }
            lines.push(Bytes::copy_from_slice(line));
            if lines.len() >= MAX_LINES_PER_POLL {
                debug!(path = %path.display(), "poll batch limit reached, continuing next poll");
                break;
            }
        } else if n as u64 == limit {
            // 한계까지 읽고도 종단 없음 — 초과 라인, 다음 \n까지 폐기
            warn!(
                path = %path.display(),
                max = MAX_LINE_BYTES,
                "line exceeds max length, dropping"
            );
            offset += n as u64;
            skipping = true;
        } else {
            // EOF의 불완전한 라인 — 종단될 때까지 보류
            break;
        }
    }

    Ok(ReadOutcome {
        lines,
        offset,
        skipping,
    })
}

/// 종단 `\n` / `\r\n`을 제거합니다.
fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let mut line = buf;
    if line.last() == Some(&b'\n') {
        line = &line[..line.len() - 1];
    }
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    line
}

/// 파일의 inode를 가져옵니다 (Unix 전용).
#[cfg(unix)]
async fn inode_of(path: &Path) -> std::io::Result<u64> {
    use std::os::unix::fs::MetadataExt;

    let meta = metadata(path).await?;
    Ok(meta.ino())
}

/// 파일 전체를 한 번 처리합니다 (팔로우 없음).
///
/// `limit`이 0보다 크면 그 수만큼만 처리합니다. 처리한 라인 수를
/// 반환합니다. `test` 명령과 테스트 스위트에서 사용합니다.
pub async fn process_file<F>(
    path: impl AsRef<Path>,
    limit: usize,
    handler: F,
) -> Result<usize, PipelineError>
where
    F: FnMut(&str),
{
    let path = path.as_ref();
    let file = File::open(path).await.map_err(|e| PipelineError::Tailer {
        path: path.display().to_string(),
        reason: format!("opening file: {e}"),
    })?;
    process_reader(BufReader::new(file), limit, handler).await
}

/// 임의의 버퍼 리더에서 라인을 한 번 처리합니다.
///
/// 일회성 처리이므로 EOF의 종단 없는 마지막 라인도 전달합니다.
/// 1 MiB 초과 라인은 에러입니다.
pub async fn process_reader<R, F>(
    reader: R,
    limit: usize,
    mut handler: F,
) -> Result<usize, PipelineError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = reader;
    let cap = (MAX_LINE_BYTES + 2) as u64;
    let mut buf: Vec<u8> = Vec::new();
    let mut count = 0usize;

    loop {
        if limit > 0 && count >= limit {
            break;
        }

        buf.clear();
        let n = (&mut reader).take(cap).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }

        let terminated = buf.last() == Some(&b'\n');
        let line = strip_line_ending(&buf);

        if line.len() > MAX_LINE_BYTES || (!terminated && n as u64 == cap) {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds {MAX_LINE_BYTES} bytes"),
            )));
        }

        handler(&String::from_utf8_lossy(line));
        count += 1;
    }

    Ok(count)
}
