//! Agent orchestration -- identity, processors, tailers, ticker, and
//! signal fan-in.
//!
//! The [`Agent`] owns one tailer task plus one consumer task per
//! configured source. Consumers feed lines synchronously into their
//! source processor; the main loop is strictly serial and reacts to
//! exactly three events: the snapshot ticker, SIGUSR1 (peek-and-print,
//! no reset), and termination signals (graceful shutdown).
//!
//! Snapshots are serialized: the ticker arm awaits the HTTP POST, so no
//! two snapshots are ever in flight simultaneously. A failed transmission
//! is logged and the snapshot dropped -- the aggregator has already
//! reset, and re-sending would double-count on the collector side.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use emberpost_core::AgentConfig;
use emberpost_pipeline::{
    tailer, Aggregator, ObservedValue, SourceProcessor, StartFrom, Tailer, TailerConfig,
};

use crate::error::AgentError;
use crate::identity::Identity;
use crate::report::{self, SourceReport};
use crate::sender::{Sender, SenderConfig};

/// Capacity of each tailer -> processor line channel.
const LINE_CHANNEL_CAPACITY: usize = 1024;

/// The agent: configuration, shared aggregator, and per-source pipeline.
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    aggregator: Arc<Aggregator>,
    processors: Vec<Arc<SourceProcessor>>,
    tailers: Vec<Tailer>,
    consumers: Vec<tokio::task::JoinHandle<()>>,
    sender: Option<Sender>,
    dry_run: bool,
    running: bool,
    start_time: Instant,
}

impl Agent {
    /// Build the aggregator and one processor per source.
    ///
    /// Fails fast with the offending source path or metric name if a
    /// parser or matcher cannot be constructed.
    pub fn new(config: AgentConfig, dry_run: bool) -> Result<Self, AgentError> {
        let aggregator = Arc::new(Aggregator::new());

        let mut processors = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let processor = SourceProcessor::new(source, Arc::clone(&aggregator))?;
            processors.push(Arc::new(processor));
        }

        Ok(Self {
            config,
            aggregator,
            processors,
            tailers: Vec::new(),
            consumers: Vec::new(),
            sender: None,
            dry_run,
            running: false,
            start_time: Instant::now(),
        })
    }

    /// Run the agent until a termination signal arrives.
    ///
    /// Startup order: identity, collector registration (skipped in
    /// dry-run), tailers, then the ticker + signal loop. A second call
    /// while running is rejected.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        if self.running {
            return Err(AgentError::Other("agent already running".to_owned()));
        }
        self.running = true;
        self.start_time = Instant::now();

        let identity = Arc::new(Identity::load_or_generate(&self.config.identity_file)?);
        info!(
            instance_id = %identity.instance_id,
            identity_file = %self.config.identity_file.display(),
            "loaded identity"
        );

        if !self.dry_run {
            let mut sender = Sender::new(
                SenderConfig {
                    server_url: self.config.server_url.clone(),
                    app_name: self.config.app_name.clone(),
                    app_version: self.config.app_version.clone(),
                    environment: self.config.environment.clone(),
                },
                Arc::clone(&identity),
            )?;
            sender.register().await?;
            self.sender = Some(sender);
        }

        self.start_tailers().await?;

        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;

        // First tick one interval after start; overlapping ticks are skipped
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval = ?self.config.interval,
            sources = self.processors.len(),
            dry_run = self.dry_run,
            "agent started"
        );

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
                _ = sigusr1.recv() => {
                    info!("received SIGUSR1, dumping metrics");
                    self.dump_metrics();
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_snapshot().await {
                        error!(error = %e, "failed to send snapshot");
                    }
                }
            }
        }

        self.stop_tailers().await;
        Ok(())
    }

    /// Start one tailer per source in from-end mode, plus its consumer.
    ///
    /// A tailer that cannot open its file aborts startup; already
    /// started tailers are stopped before returning the error.
    async fn start_tailers(&mut self) -> Result<(), AgentError> {
        let processors = self.processors.clone();
        for processor in processors {
            let (tx, mut rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
            let mut tailer = Tailer::new(processor.path(), TailerConfig::default(), tx);

            if let Err(e) = tailer.start(StartFrom::End).await {
                self.stop_tailers().await;
                return Err(e.into());
            }
            self.tailers.push(tailer);

            self.consumers.push(tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    processor.process_line(&String::from_utf8_lossy(&line));
                }
            }));
        }
        Ok(())
    }

    /// Stop every tailer and wait for the consumers to drain.
    ///
    /// Idempotent. Consumers end on their own once the tailer side of
    /// the line channel is dropped.
    async fn stop_tailers(&mut self) {
        for tailer in &mut self.tailers {
            tailer.stop().await;
        }
        self.tailers.clear();

        for consumer in self.consumers.drain(..) {
            let _ = consumer.await;
        }
    }

    /// Snapshot the aggregator and publish: print in dry-run, POST the
    /// signed envelope otherwise.
    async fn publish_snapshot(&self) -> Result<(), AgentError> {
        let metrics = self.aggregator.snapshot();

        if self.dry_run {
            report::print_snapshot(
                &self.config,
                &self.source_reports(),
                &metrics,
                self.start_time.elapsed(),
                true,
            );
            return Ok(());
        }

        match &self.sender {
            Some(sender) => sender.send_snapshot(&metrics).await,
            None => Ok(()),
        }
    }

    /// Print current metrics without resetting (SIGUSR1).
    fn dump_metrics(&self) {
        let metrics = self.aggregator.peek();
        report::print_snapshot(
            &self.config,
            &self.source_reports(),
            &metrics,
            self.start_time.elapsed(),
            self.dry_run,
        );
    }

    fn source_reports(&self) -> Vec<SourceReport> {
        self.processors
            .iter()
            .map(|p| SourceReport {
                path: p.path().to_owned(),
                stats: p.stats(),
            })
            .collect()
    }

    /// Process an entire file through the first source's processor.
    ///
    /// One-shot operation for the `test` command; returns the number of
    /// lines read.
    pub async fn process_file(
        &self,
        path: impl AsRef<Path>,
        limit: usize,
    ) -> Result<usize, AgentError> {
        let processor = self
            .processors
            .first()
            .ok_or_else(|| AgentError::Other("no processors configured".to_owned()))?;

        let count = tailer::process_file(path, limit, |line| processor.process_line(line)).await?;
        Ok(count)
    }

    /// Process a single line through one source's processor (tests).
    pub fn process_line(&self, source_index: usize, line: &str) {
        if let Some(processor) = self.processors.get(source_index) {
            processor.process_line(line);
        }
    }

    /// Non-mutating view of the current metric state.
    pub fn peek(&self) -> std::collections::BTreeMap<String, ObservedValue> {
        self.aggregator.peek()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}
