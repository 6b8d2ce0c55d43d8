use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const TRAINING_MESSAGES: [(u8, &str); 6] = [
    (0, "Initializing training environment..."),
    (15, "Analyzing character features from selected images..."),
    (40, "Building consistency model..."),
    (65, "Fine-tuning base model with character data..."),
    (85, "Compiling LoRA weights..."),
    (100, "Training complete! Your character model is ready."),
];

pub fn status_for(percent: u8) -> &'static str {
    TRAINING_MESSAGES
        .iter()
        .rev()
        .find(|(threshold, _)| percent >= *threshold)
        .map(|(_, message)| *message)
        .unwrap_or(TRAINING_MESSAGES[0].1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingProgress {
    pub percent: u8,
    pub message: &'static str,
}

impl TrainingProgress {
    pub fn start() -> Self {
        TrainingProgress {
            percent: 0,
            message: status_for(0),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.percent >= 100
    }

    /// Advances one tick, saturating at 100.
    pub fn advance(self) -> Self {
        let percent = self.percent.saturating_add(1).min(100);
        TrainingProgress {
            percent,
            message: status_for(percent),
        }
    }
}

/// Proof that a simulated training run finished. Only a completed
/// [`TrainingRun`] hands these out.
#[derive(Debug)]
pub struct TrainingComplete {
    _private: (),
}

#[cfg(test)]
impl TrainingComplete {
    pub(crate) fn for_tests() -> Self {
        TrainingComplete { _private: () }
    }
}

pub struct TrainingRun {
    progress: watch::Receiver<TrainingProgress>,
    completion: Option<oneshot::Receiver<TrainingComplete>>,
    task: JoinHandle<()>,
}

impl TrainingRun {
    pub fn start(tick: Duration, completion_delay: Duration) -> Self {
        let (progress_tx, progress_rx) = watch::channel(TrainingProgress::start());
        let (completion_tx, completion_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            info!("Simulated training started");
            let mut interval = tokio::time::interval(tick);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            let mut progress = TrainingProgress::start();
            while !progress.is_finished() {
                interval.tick().await;
                progress = progress.advance();
                if progress_tx.send(progress).is_err() {
                    debug!("Training progress receiver dropped");
                }
            }

            tokio::time::sleep(completion_delay).await;
            if completion_tx.send(TrainingComplete { _private: () }).is_err() {
                debug!("Training completion receiver dropped");
            }
            info!("Simulated training finished");
        });

        TrainingRun {
            progress: progress_rx,
            completion: Some(completion_rx),
            task,
        }
    }

    pub fn progress(&self) -> watch::Receiver<TrainingProgress> {
        self.progress.clone()
    }

    /// Resolves once the run signals completion. Returns `None` if the run was
    /// cancelled or completion was already taken.
    pub async fn completed(&mut self) -> Option<TrainingComplete> {
        let receiver = self.completion.take()?;
        receiver.await.ok()
    }

    pub fn cancel(&mut self) {
        if !self.task.is_finished() {
            debug!("Cancelling simulated training");
        }
        self.task.abort();
        self.completion = None;
    }
}

impl Drop for TrainingRun {
    fn drop(&mut self) {
        self.task.abort();
    }
}
