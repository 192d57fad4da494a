//! Training log and TensorBoard event writing.

use crate::common::*;
use async_std::{
    fs::{File, OpenOptions},
    io::{prelude::WriteExt as _, BufWriter},
};
use cellwise::metrics::ValidationReport;
use std::future::Future;

pub use logging_message::*;
pub use logging_worker::*;

/// The file name of the human-readable training log.
pub const TRAINING_LOG_FILE: &str = "log.train.txt";

const TABLE_HEADER: &str = "epoch    iter      rate     |  train_loss/acc  |    valid_loss/acc/map/focal     |best_epoch/best_focal|  min ";

mod logging_worker {
    use super::*;

    /// Appends messages to the training log and mirrors the metrics to TensorBoard.
    #[derive(Debug)]
    pub struct LoggingWorker {
        class_names: Vec<String>,
        text_log: File,
        event_writer: EventWriter<BufWriter<File>>,
        rx: mpsc::Receiver<LoggingMessage>,
    }

    impl LoggingWorker {
        async fn new(
            log_dir: &Path,
            class_names: Vec<String>,
            rx: mpsc::Receiver<LoggingMessage>,
        ) -> Result<Self> {
            let text_log_path = log_dir.join(TRAINING_LOG_FILE);
            let text_log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&text_log_path)
                .await
                .with_context(|| {
                    format!("failed to open log file '{}'", text_log_path.display())
                })?;

            let event_dir = log_dir.join("events");
            async_std::fs::create_dir_all(&event_dir).await?;
            let event_path_prefix = event_dir
                .join("cellwise")
                .into_os_string()
                .into_string()
                .map_err(|path| format_err!("non-UTF-8 event path {:?}", path))?;
            let event_writer = EventWriterInit::default()
                .from_prefix_async(event_path_prefix, None)
                .await?;

            Ok(Self {
                class_names,
                text_log,
                event_writer,
                rx,
            })
        }

        /// Runs until every sender is dropped.
        async fn start(mut self) -> Result<()> {
            while let Some(msg) = self.rx.recv().await {
                match msg {
                    LoggingMessage::Text(text) => {
                        self.write_text(&text).await?;
                    }
                    LoggingMessage::TableHeader => {
                        let rule = "-".repeat(TABLE_HEADER.len());
                        let text = format!("{}\n{}", TABLE_HEADER, rule);
                        self.write_text(&text).await?;
                    }
                    LoggingMessage::Epoch(log) => {
                        self.log_epoch(log).await?;
                    }
                }
            }

            Ok(())
        }

        async fn write_text(&mut self, text: &str) -> Result<()> {
            for line in text.lines() {
                info!("{}", line);
            }
            self.text_log.write_all(text.as_bytes()).await?;
            self.text_log.write_all(b"\n").await?;
            self.text_log.flush().await?;
            Ok(())
        }

        async fn log_epoch(&mut self, log: EpochLog) -> Result<()> {
            // per-class precision precedes the epoch row
            let ap_lines = self
                .class_names
                .iter()
                .zip(&log.validation.class_aps)
                .map(|(name, ap)| format!("{}: {:.2}", name, ap))
                .collect::<Vec<_>>()
                .join("\n");
            if !ap_lines.is_empty() {
                self.write_text(&ap_lines).await?;
            }
            self.write_text(&log.table_row()).await?;

            let EpochLog {
                epoch,
                ref train,
                ref validation,
                best_focal,
                ..
            } = log;

            if let Some(train) = train {
                self.event_writer
                    .write_scalar_async("params/learning_rate", epoch, train.lr as f32)
                    .await?;
                self.event_writer
                    .write_scalar_async("train/loss", epoch, train.loss as f32)
                    .await?;
                self.event_writer
                    .write_scalar_async("train/accuracy", epoch, train.accuracy as f32)
                    .await?;
            }

            self.event_writer
                .write_scalar_async("valid/loss", epoch, validation.loss as f32)
                .await?;
            self.event_writer
                .write_scalar_async("valid/accuracy", epoch, validation.accuracy as f32)
                .await?;
            self.event_writer
                .write_scalar_async("valid/map", epoch, validation.map as f32)
                .await?;
            self.event_writer
                .write_scalar_async("valid/focal_loss", epoch, validation.focal_loss as f32)
                .await?;
            self.event_writer
                .write_scalar_async("valid/best_focal_loss", epoch, best_focal as f32)
                .await?;

            for (name, &ap) in self.class_names.iter().zip(&validation.class_aps) {
                self.event_writer
                    .write_scalar_async(format!("valid/ap/{}", name), epoch, ap as f32)
                    .await?;
            }

            Ok(())
        }
    }

    /// Starts the logging worker and returns the future of its completion.
    pub async fn logging_worker(
        log_dir: &Path,
        class_names: Vec<String>,
        rx: mpsc::Receiver<LoggingMessage>,
    ) -> Result<impl Future<Output = Result<()>> + Send> {
        let worker = LoggingWorker::new(log_dir, class_names, rx).await?;
        Ok(tokio::task::spawn(worker.start()).map(|result| Fallible::Ok(result??)))
    }
}

mod logging_message {
    use super::*;

    #[derive(Debug)]
    pub enum LoggingMessage {
        /// Free text appended to the training log.
        Text(String),
        /// The column header of the epoch table.
        TableHeader,
        Epoch(EpochLog),
    }

    impl LoggingMessage {
        pub fn text<S>(text: S) -> Self
        where
            S: Into<String>,
        {
            Self::Text(text.into())
        }
    }

    /// Statistics of a training pass.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrainSummary {
        pub num_iterations: usize,
        pub lr: f64,
        pub loss: f64,
        pub accuracy: f64,
        pub minutes: f64,
    }

    /// The outcome of an epoch, or of the evaluation before training when
    /// `train` is absent.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct EpochLog {
        pub epoch: i64,
        pub train: Option<TrainSummary>,
        pub validation: ValidationReport,
        pub best_epoch: usize,
        pub best_focal: f64,
    }

    impl EpochLog {
        /// Formats the row of the epoch table. Training columns are `-1` when
        /// no training pass took place.
        pub fn table_row(&self) -> String {
            let Self {
                epoch,
                ref train,
                ref validation,
                best_epoch,
                best_focal,
            } = *self;

            let (epoch, num_iterations, lr, loss, accuracy, minutes) = match train {
                Some(train) => (
                    epoch as f64,
                    train.num_iterations as i64,
                    train.lr,
                    train.loss,
                    train.accuracy,
                    train.minutes,
                ),
                None => (-1.0, -1, -1.0, -1.0, -1.0, -1.0),
            };

            format!(
                "{:5.1}   {:5}    {:.6}   |  {:.4}  {:.4}  |    {:.4}  {:6.4} {:6.4}  {:6.1} |  {:6.4}  {:6.4} | {:3.1} min",
                epoch,
                num_iterations,
                lr,
                loss,
                accuracy,
                validation.loss,
                validation.accuracy,
                validation.map,
                validation.focal_loss,
                best_epoch as f64,
                best_focal,
                minutes
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ValidationReport {
        ValidationReport {
            loss: 0.5,
            accuracy: 0.25,
            map: 0.75,
            focal_loss: 0.125,
            class_aps: vec![0.5, f64::NAN],
            num_samples: 8,
        }
    }

    #[test]
    fn epoch_row() {
        let log = EpochLog {
            epoch: 3,
            train: Some(TrainSummary {
                num_iterations: 120,
                lr: 3e-4,
                loss: 0.75,
                accuracy: 0.5,
                minutes: 2.5,
            }),
            validation: report(),
            best_epoch: 3,
            best_focal: 0.125,
        };
        assert_eq!(
            log.table_row(),
            "  3.0     120    0.000300   |  0.7500  0.5000  |    0.5000  0.2500 0.7500     0.1 |  3.0000  0.1250 | 2.5 min"
        );
    }

    #[test]
    fn evaluation_row_has_placeholders() {
        let log = EpochLog {
            epoch: 0,
            train: None,
            validation: report(),
            best_epoch: 0,
            best_focal: f64::INFINITY,
        };
        let row = log.table_row();
        assert!(row.starts_with(" -1.0      -1    -1.000000   |  -1.0000  -1.0000  |"));
        assert!(row.ends_with("| -1.0 min"));
    }

    #[tokio::test]
    async fn worker_appends_text_log() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tx, rx) = mpsc::channel(4);
        let future = logging_worker(dir.path(), vec!["a".into(), "b".into()], rx).await?;

        tx.send(LoggingMessage::text("** start training here! **"))
            .await
            .map_err(|_| format_err!("logging worker stopped"))?;
        tx.send(LoggingMessage::TableHeader)
            .await
            .map_err(|_| format_err!("logging worker stopped"))?;
        tx.send(LoggingMessage::Epoch(EpochLog {
            epoch: 1,
            train: None,
            validation: report(),
            best_epoch: 0,
            best_focal: f64::INFINITY,
        }))
        .await
        .map_err(|_| format_err!("logging worker stopped"))?;
        drop(tx);
        future.await?;

        let text = std::fs::read_to_string(dir.path().join(TRAINING_LOG_FILE))?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "** start training here! **");
        assert!(lines[1].starts_with("epoch    iter"));
        assert!(lines[2].chars().all(|c| c == '-'));
        assert_eq!(lines[3], "a: 0.50");
        assert_eq!(lines[4], "b: NaN");
        assert_eq!(lines.len(), 6);
        assert!(dir.path().join("events").is_dir());
        Ok(())
    }
}
