//! The epoch loop of fold training.

use crate::{
    common::*,
    config::{Config, TrainingOptions},
    logging::{EpochLog, LoggingMessage, TrainSummary},
};
use cellwise::{
    checkpoint::{load_state_dict, save_checkpoint, try_resume, CheckpointMeta},
    dataset::{CellBatch, DataLoader},
    loss::CellLoss,
    metrics::{
        multi_label_accuracy, AverageMeter, ValidationAccumulator, ValidationReport,
        ACCURACY_THRESHOLD,
    },
    model::{CellClassifier, CellClassifierInit},
    optim::{Adam, AdamInit, LrScheduler},
    utils::RateCounter,
};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Trains the classifier of one fold. All methods block the calling thread.
pub struct Trainer {
    config: Arc<Config>,
    device: Device,
    vs: nn::VarStore,
    model: CellClassifier,
    criterion: CellLoss,
    optimizer: Adam,
    scheduler: LrScheduler,
    train_loader: DataLoader,
    valid_loader: DataLoader,
    model_dir: PathBuf,
    runtime: tokio::runtime::Handle,
    logging_tx: mpsc::Sender<LoggingMessage>,
}

impl Trainer {
    pub fn new(
        config: Arc<Config>,
        device: Device,
        train_loader: DataLoader,
        valid_loader: DataLoader,
        runtime: tokio::runtime::Handle,
        logging_tx: mpsc::Sender<LoggingMessage>,
    ) -> Result<Self> {
        let TrainingOptions {
            arch,
            num_classes,
            in_channels,
            loss,
            scheduler,
            scheduler_lr_multiplier,
            scheduler_epoch_offset,
            ref load_state_dict_path,
            ..
        } = config.options;

        tch::manual_seed(0);

        let mut vs = nn::VarStore::new(device);
        let model = CellClassifierInit {
            architecture: arch,
            in_channels,
            num_classes,
        }
        .build(&vs.root())?;

        if let Some(path) = load_state_dict_path {
            load_state_dict(&mut vs, path)?;
            info!("loaded pretrained weights '{}'", path.display());
        }

        let criterion = loss.build(device)?;
        let scheduler =
            LrScheduler::from_kind(scheduler, scheduler_lr_multiplier, scheduler_epoch_offset)?;
        let optimizer = AdamInit::default().build(&vs, scheduler.lr(0))?;
        let model_dir = config.model_dir();

        Ok(Self {
            config,
            device,
            vs,
            model,
            criterion,
            optimizer,
            scheduler,
            train_loader,
            valid_loader,
            model_dir,
            runtime,
            logging_tx,
        })
    }

    /// Runs the remaining epochs and returns the progress after the last one.
    pub fn run(mut self) -> Result<CheckpointMeta> {
        let TrainingOptions {
            epochs,
            eval_at_start,
            ..
        } = self.config.options;

        let mut progress = match self.resume()? {
            Some(meta) => meta,
            None => CheckpointMeta {
                epoch: 0,
                best_epoch: 0,
                best_metric: f64::INFINITY,
            },
        };
        let start_epoch = progress.epoch + 1;

        self.log(LoggingMessage::text("** start training here! **\n"))?;
        self.log(LoggingMessage::TableHeader)?;

        if eval_at_start {
            let validation = self.validate(-1)?;
            self.log(LoggingMessage::Epoch(EpochLog {
                epoch: start_epoch as i64 - 1,
                train: None,
                validation,
                best_epoch: progress.best_epoch,
                best_focal: progress.best_metric,
            }))?;
        }

        for epoch in start_epoch..=epochs {
            let epoch_start = Instant::now();
            tch::manual_seed(epoch as i64);

            let lr = self.scheduler.lr(epoch);
            self.optimizer.set_lr(lr);

            let (num_iterations, train_loss, train_accuracy) = self.train_epoch(epoch)?;
            let validation = self.validate(epoch as i64)?;

            let is_best = validation.focal_loss < progress.best_metric;
            if is_best {
                progress.best_epoch = epoch;
                progress.best_metric = validation.focal_loss;
            }
            progress.epoch = epoch;

            self.log(LoggingMessage::Epoch(EpochLog {
                epoch: epoch as i64,
                train: Some(TrainSummary {
                    num_iterations,
                    lr,
                    loss: train_loss,
                    accuracy: train_accuracy,
                    minutes: epoch_start.elapsed().as_secs_f64() / 60.0,
                }),
                validation,
                best_epoch: progress.best_epoch,
                best_focal: progress.best_metric,
            }))?;

            save_checkpoint(
                &self.vs,
                Some(&self.optimizer),
                &self.model_dir,
                &progress,
                is_best,
            )?;
        }

        Ok(progress)
    }

    fn resume(&mut self) -> Result<Option<CheckpointMeta>> {
        let path = match self.config.resume_path() {
            Some(path) => path,
            None => return Ok(None),
        };

        let meta = try_resume(&mut self.vs, &mut self.optimizer, &path)?;
        let text = match &meta {
            Some(meta) => format!(
                ">>>> loaded checkpoint:\n>>>> '{}' (epoch {})",
                path.display(),
                meta.epoch
            ),
            None => format!(">> No checkpoint found at '{}'", path.display()),
        };
        self.log(LoggingMessage::Text(text))?;
        Ok(meta)
    }

    /// Runs a training pass and returns the number of batches with the mean
    /// loss and accuracy.
    fn train_epoch(&mut self, epoch: usize) -> Result<(usize, f64, f64)> {
        let TrainingOptions {
            gradient_accumulation_steps,
            clipnorm,
            ..
        } = self.config.options;
        let num_batches = self.train_loader.num_batches();
        let rx = self.train_loader.epoch(&self.runtime, epoch as u64);

        let mut losses = AverageMeter::new();
        let mut accuracy = AverageMeter::new();
        let mut rate_counter = RateCounter::new(PROGRESS_INTERVAL);
        let mut num_pending = 0;
        let mut num_iterations = 0;

        self.optimizer.zero_grad();

        for result in rx.iter() {
            let CellBatch { images, labels, .. } = result?;
            let images = images.to_device(self.device);
            let labels = labels.to_device(self.device);

            let logits = self.model.forward_t(&images, true);
            let loss = self.criterion.forward(&logits, &labels);
            loss.backward();
            num_pending += 1;

            if num_pending == gradient_accumulation_steps {
                self.update_weights(clipnorm);
                num_pending = 0;
            }

            let batch_accuracy = tch::no_grad(|| {
                multi_label_accuracy(&logits.sigmoid(), &labels, ACCURACY_THRESHOLD)
            });
            losses.update(f64::from(&loss));
            accuracy.update(batch_accuracy);
            num_iterations += 1;

            rate_counter.add(1.0);
            if let Some(rate) = rate_counter.rate() {
                info!(
                    "epoch {:5.2}\titer {}/{}\tlr {:.6}\tloss {:.4}\tacc {:.4}\t{:.2} batches/s",
                    (epoch - 1) as f64 + num_iterations as f64 / num_batches.max(1) as f64,
                    num_iterations,
                    num_batches,
                    self.optimizer.lr(),
                    losses.avg(),
                    accuracy.avg(),
                    rate
                );
            }
        }

        // the gradients of trailing batches are not discarded
        if num_pending > 0 {
            self.update_weights(clipnorm);
        }

        Ok((num_iterations, losses.avg(), accuracy.avg()))
    }

    fn update_weights(&mut self, clipnorm: f64) {
        self.optimizer.clip_grad_norm(clipnorm);
        self.optimizer.step();
        self.optimizer.zero_grad();
    }

    fn validate(&self, epoch: i64) -> Result<ValidationReport> {
        let rx = self.valid_loader.epoch(&self.runtime, 0);
        let mut accumulator = ValidationAccumulator::new(epoch as u64);

        tch::no_grad(|| -> Result<()> {
            for result in rx.iter() {
                let CellBatch { images, labels, .. } = result?;
                let images = images.to_device(self.device);
                let labels = labels.to_device(self.device);

                let logits = self.model.forward_t(&images, false);
                let loss = self.criterion.forward(&logits, &labels);
                accumulator.add_batch(&logits, &labels, f64::from(&loss));
            }
            Ok(())
        })?;

        if accumulator.num_batches() == 0 {
            warn!("the validation set is empty");
        }
        accumulator.finish()
    }

    fn log(&self, msg: LoggingMessage) -> Result<()> {
        self.logging_tx
            .blocking_send(msg)
            .map_err(|_| format_err!("the logging worker stopped"))
    }
}
