use crate::role::RunKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted { run: RunKind, seed: u64, first_epoch: u32, last_epoch: u32 },
    EpochStarted { run: RunKind, epoch: u32, learning_rate: f64 },
    EpochFinished { run: RunKind, epoch: u32, epoch_time_secs: f64, train_top1: f64, test_top1: f64 },
    CheckpointWritten { run: RunKind, epoch: u32, path: PathBuf },
    RunFinished { run: RunKind, epochs: u32, total_time_secs: f64 },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Reports progress through `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { run, seed, first_epoch, last_epoch } => {
                tracing::info!(%run, seed, first_epoch, last_epoch, "run started");
            }
            ProgressEvent::EpochStarted { run, epoch, learning_rate } => {
                tracing::info!(%run, epoch, lr = learning_rate, "epoch started");
            }
            ProgressEvent::EpochFinished { run, epoch, epoch_time_secs, train_top1, test_top1 } => {
                tracing::info!(
                    %run,
                    epoch,
                    secs = epoch_time_secs,
                    train_top1,
                    test_top1,
                    "epoch finished"
                );
            }
            ProgressEvent::CheckpointWritten { run, epoch, path } => {
                tracing::debug!(%run, epoch, path = %path.display(), "checkpoint written");
            }
            ProgressEvent::RunFinished { run, epochs, total_time_secs } => {
                tracing::info!(%run, epochs, total_time_secs, "run finished");
            }
        }
    }
}
