use crate::{common::*, error::UnsupportedKind};

/// A learning rate as a function of the epoch number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    Constant { lr: R64 },
    /// `(first_epoch, lr)` pairs in increasing epoch order, starting at epoch 0.
    StepWise { steps: Vec<(usize, R64)> },
}

/// Named learning rate presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SchedulerKind {
    /// Two warm-up epochs, then decays over 20 epochs.
    Adam20WarmUp,
    Adam45,
    AdamConstant,
}

impl SchedulerKind {
    pub const ALL: [Self; 3] = [Self::Adam20WarmUp, Self::Adam45, Self::AdamConstant];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Adam20WarmUp => "Adam20WarmUp",
            Self::Adam45 => "Adam45",
            Self::AdamConstant => "AdamConstant",
        }
    }

    pub fn schedule(&self) -> LrSchedule {
        let steps = |steps: &[(usize, f64)]| LrSchedule::StepWise {
            steps: steps.iter().map(|&(epoch, lr)| (epoch, r64(lr))).collect(),
        };

        match self {
            Self::Adam20WarmUp => steps(&[
                (0, 1e-5),
                (3, 3e-4),
                (10, 1e-4),
                (15, 3e-5),
                (20, 1e-5),
            ]),
            Self::Adam45 => steps(&[(0, 3e-4), (25, 1.5e-4), (35, 7.5e-5), (45, 3e-5)]),
            Self::AdamConstant => LrSchedule::Constant { lr: r64(3e-5) },
        }
    }
}

impl Default for SchedulerKind {
    fn default() -> Self {
        Self::Adam20WarmUp
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchedulerKind {
    type Err = UnsupportedKind;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|kind| kind.name()).collect();
                UnsupportedKind::new("scheduler", name, &names)
            })
    }
}

impl TryFrom<String> for SchedulerKind {
    type Error = UnsupportedKind;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<SchedulerKind> for String {
    fn from(kind: SchedulerKind) -> Self {
        kind.name().to_string()
    }
}

/// Computes the learning rate of an epoch.
///
/// The schedule is evaluated at `epoch + epoch_offset`, clamped at zero,
/// and scaled by the multiplier.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    schedule: LrSchedule,
    multiplier: f64,
    epoch_offset: i64,
}

impl LrScheduler {
    pub fn new(schedule: LrSchedule, multiplier: f64, epoch_offset: i64) -> Result<Self> {
        ensure!(multiplier > 0.0, "the lr multiplier must be positive");

        match &schedule {
            LrSchedule::Constant { lr } => {
                ensure!(lr.raw() >= 0.0, "the lr must be non-negative");
            }
            LrSchedule::StepWise { steps } => {
                ensure!(
                    !steps.is_empty() && steps[0].0 == 0,
                    "the steps must start from zero"
                );
                steps.iter().try_fold(None, |prev_epoch, &(curr_epoch, lr)| {
                    if let Some(prev_epoch) = prev_epoch {
                        ensure!(curr_epoch > prev_epoch, "the steps must be monotonic");
                    }
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                    Ok(Some(curr_epoch))
                })?;
            }
        }

        Ok(Self {
            schedule,
            multiplier,
            epoch_offset,
        })
    }

    pub fn from_kind(kind: SchedulerKind, multiplier: f64, epoch_offset: i64) -> Result<Self> {
        Self::new(kind.schedule(), multiplier, epoch_offset)
    }

    pub fn lr(&self, epoch: usize) -> f64 {
        let epoch = (epoch as i64 + self.epoch_offset).max(0) as usize;

        let base_lr = match &self.schedule {
            LrSchedule::Constant { lr } => lr.raw(),
            LrSchedule::StepWise { steps } => {
                let index =
                    match steps.binary_search_by_key(&epoch, |(first_epoch, _lr)| *first_epoch) {
                        Ok(index) => index,
                        Err(index) => index.saturating_sub(1),
                    };
                steps[index].1.raw()
            }
        };

        base_lr * self.multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_wise_lookup() -> Result<()> {
        let scheduler = LrScheduler::from_kind(SchedulerKind::Adam45, 1.0, 0)?;
        assert_eq!(scheduler.lr(0), 3e-4);
        assert_eq!(scheduler.lr(24), 3e-4);
        assert_eq!(scheduler.lr(25), 1.5e-4);
        assert_eq!(scheduler.lr(40), 7.5e-5);
        assert_eq!(scheduler.lr(100), 3e-5);
        Ok(())
    }

    #[test]
    fn multiplier_and_offset() -> Result<()> {
        let scheduler = LrScheduler::from_kind(SchedulerKind::Adam45, 2.0, 20)?;
        assert_eq!(scheduler.lr(5), 3e-4);
        assert_eq!(scheduler.lr(0), 6e-4);

        let scheduler = LrScheduler::from_kind(SchedulerKind::Adam45, 1.0, -30)?;
        assert_eq!(scheduler.lr(10), 3e-4);
        Ok(())
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        let schedule = LrSchedule::StepWise {
            steps: vec![(1, r64(1e-3))],
        };
        assert!(LrScheduler::new(schedule, 1.0, 0).is_err());

        let schedule = LrSchedule::StepWise {
            steps: vec![(0, r64(1e-3)), (5, r64(1e-4)), (5, r64(1e-5))],
        };
        assert!(LrScheduler::new(schedule, 1.0, 0).is_err());
        assert!(LrScheduler::from_kind(SchedulerKind::Adam45, 0.0, 0).is_err());
    }

    #[test]
    fn parse_scheduler_names() {
        assert_eq!(
            "adam20warmup".parse::<SchedulerKind>(),
            Ok(SchedulerKind::Adam20WarmUp)
        );
        assert!("Sgd".parse::<SchedulerKind>().is_err());
    }
}
