//! Checkpoint files of model weights, training progress and optimizer state.
//!
//! A checkpoint `NNN.ckpt` holds `state_dict.<param>` tensors with the scalar
//! tensors `epoch`, `best_epoch` and `best_map`. The optimizer state lives in
//! the companion `NNN_optim.ckpt`. The best checkpoint is copied to
//! `final.ckpt` and `final_optim.ckpt`.

use crate::{common::*, optim::Adam, utils};

pub const CHECKPOINT_EXTENSION: &str = "ckpt";
pub const FINAL_CHECKPOINT_STEM: &str = "final";
const OPTIMIZER_SUFFIX: &str = "_optim";
const STATE_DICT_PREFIX: &str = "state_dict.";
const EPOCH_KEY: &str = "epoch";
const BEST_EPOCH_KEY: &str = "best_epoch";
const BEST_METRIC_KEY: &str = "best_map";

/// Training progress stored along with the weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub best_epoch: usize,
    /// The best validation focal loss so far. Lower is better.
    pub best_metric: f64,
}

pub fn checkpoint_path(dir: &Path, epoch: usize) -> PathBuf {
    dir.join(format!("{:03}.{}", epoch, CHECKPOINT_EXTENSION))
}

pub fn final_checkpoint_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.{}", FINAL_CHECKPOINT_STEM, CHECKPOINT_EXTENSION))
}

/// Returns the path of the optimizer file accompanying a checkpoint.
pub fn optimizer_path(checkpoint_path: &Path) -> Result<PathBuf> {
    let stem = checkpoint_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| format_err!("invalid checkpoint path '{}'", checkpoint_path.display()))?;
    Ok(checkpoint_path.with_file_name(format!(
        "{}{}.{}",
        stem, OPTIMIZER_SUFFIX, CHECKPOINT_EXTENSION
    )))
}

/// Saves the checkpoint of an epoch and returns its path.
///
/// When `is_best` is set, the files are also copied to the final checkpoint.
pub fn save_checkpoint(
    vs: &nn::VarStore,
    optimizer: Option<&Adam>,
    dir: &Path,
    meta: &CheckpointMeta,
    is_best: bool,
) -> Result<PathBuf> {
    let CheckpointMeta {
        epoch,
        best_epoch,
        best_metric,
    } = *meta;

    let path = checkpoint_path(dir, epoch);
    let mut named: Vec<(String, Tensor)> = vs
        .variables()
        .into_iter()
        .map(|(name, var)| (format!("{}{}", STATE_DICT_PREFIX, name), var.to_device(Device::Cpu)))
        .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .collect();
    named.push((EPOCH_KEY.to_string(), Tensor::from(epoch as i64)));
    named.push((BEST_EPOCH_KEY.to_string(), Tensor::from(best_epoch as i64)));
    named.push((BEST_METRIC_KEY.to_string(), Tensor::from(best_metric)));

    utils::write_atomic(&path, |tmp_path| {
        Tensor::save_multi(&named, tmp_path)?;
        Ok(())
    })
    .with_context(|| format!("failed to save checkpoint '{}'", path.display()))?;

    let optim_path = optimizer_path(&path)?;
    if let Some(optimizer) = optimizer {
        utils::write_atomic(&optim_path, |tmp_path| optimizer.save(tmp_path))?;
    }

    if is_best {
        let final_path = final_checkpoint_path(dir);
        utils::copy_atomic(&path, &final_path)?;
        if optimizer.is_some() {
            utils::copy_atomic(&optim_path, &optimizer_path(&final_path)?)?;
        }
        debug!("copied '{}' to '{}'", path.display(), final_path.display());
    }

    Ok(path)
}

fn load_named(path: &Path) -> Result<HashMap<String, Tensor>> {
    let named = Tensor::load_multi(path)
        .with_context(|| format!("failed to load checkpoint '{}'", path.display()))?;
    Ok(named.into_iter().collect())
}

fn take_meta(named: &mut HashMap<String, Tensor>, path: &Path) -> Result<CheckpointMeta> {
    let mut take = |key: &str| {
        named
            .remove(key)
            .ok_or_else(|| format_err!("missing '{}' in checkpoint '{}'", key, path.display()))
    };
    let epoch = i64::from(&take(EPOCH_KEY)?);
    let best_epoch = i64::from(&take(BEST_EPOCH_KEY)?);
    let best_metric = f64::from(&take(BEST_METRIC_KEY)?);

    ensure!(
        epoch >= 0 && best_epoch >= 0,
        "negative epoch in checkpoint '{}'",
        path.display()
    );

    Ok(CheckpointMeta {
        epoch: epoch as usize,
        best_epoch: best_epoch as usize,
        best_metric,
    })
}

fn copy_state_dict(
    vs: &mut nn::VarStore,
    named: HashMap<String, Tensor>,
    path: &Path,
) -> Result<()> {
    let mut state_dict: HashMap<String, Tensor> = named
        .into_iter()
        .filter_map(|(key, tensor)| {
            let name = key.strip_prefix(STATE_DICT_PREFIX)?.to_string();
            Some((name, tensor))
        })
        .collect();

    let mut variables = vs.variables();
    let missing: Vec<_> = variables
        .keys()
        .filter(|name| !state_dict.contains_key(*name))
        .sorted()
        .collect();
    let unexpected: Vec<_> = state_dict
        .keys()
        .filter(|name| !variables.contains_key(*name))
        .sorted()
        .collect();
    ensure!(
        missing.is_empty() && unexpected.is_empty(),
        "checkpoint '{}' does not match the model, missing: [{}], unexpected: [{}]",
        path.display(),
        missing.iter().join(", "),
        unexpected.iter().join(", ")
    );

    tch::no_grad(|| -> Result<()> {
        for (name, var) in variables.iter_mut() {
            let src = state_dict
                .remove(name)
                .ok_or_else(|| format_err!("missing '{}'", name))?;
            ensure!(
                src.size() == var.size(),
                "shape mismatch for '{}': expect {:?}, but get {:?}",
                name,
                var.size(),
                src.size()
            );
            var.copy_(&src);
        }
        Ok(())
    })
}

/// Loads the model weights and returns the training progress.
///
/// The state dict must match the variables of the store exactly.
pub fn load_checkpoint(vs: &mut nn::VarStore, path: &Path) -> Result<CheckpointMeta> {
    let mut named = load_named(path)?;
    let meta = take_meta(&mut named, path)?;
    copy_state_dict(vs, named, path)?;
    Ok(meta)
}

/// Loads the model weights only.
pub fn load_state_dict(vs: &mut nn::VarStore, path: &Path) -> Result<()> {
    let named = load_named(path)?;
    copy_state_dict(vs, named, path)
}

/// Reads the training progress of a checkpoint without a model.
pub fn read_checkpoint_meta(path: &Path) -> Result<CheckpointMeta> {
    let mut named = load_named(path)?;
    take_meta(&mut named, path)
}

/// Parameter statistics of a checkpoint file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSummary {
    pub meta: CheckpointMeta,
    pub num_tensors: usize,
    pub num_elements: i64,
    pub has_optimizer: bool,
}

pub fn checkpoint_summary(path: &Path) -> Result<CheckpointSummary> {
    let mut named = load_named(path)?;
    let meta = take_meta(&mut named, path)?;
    let state_dict: Vec<_> = named
        .iter()
        .filter(|(key, _)| key.starts_with(STATE_DICT_PREFIX))
        .collect();

    Ok(CheckpointSummary {
        meta,
        num_tensors: state_dict.len(),
        num_elements: state_dict
            .iter()
            .map(|(_, tensor)| tensor.numel() as i64)
            .sum(),
        has_optimizer: optimizer_path(path)?.is_file(),
    })
}

/// Restores training from a checkpoint file if it exists.
///
/// Returns `None` when the file is absent, in which case training starts
/// from scratch. The optimizer state is restored when its companion file
/// exists.
pub fn try_resume(
    vs: &mut nn::VarStore,
    optimizer: &mut Adam,
    path: &Path,
) -> Result<Option<CheckpointMeta>> {
    if !path.is_file() {
        warn!("no checkpoint found at '{}'", path.display());
        return Ok(None);
    }

    info!("loading checkpoint '{}'", path.display());
    let meta = load_checkpoint(vs, path)?;

    let optim_path = optimizer_path(path)?;
    if optim_path.is_file() {
        info!("loading optimizer state '{}'", optim_path.display());
        optimizer.load(&optim_path)?;
    }

    info!(
        "loaded checkpoint '{}' (epoch {})",
        path.display(),
        meta.epoch
    );
    Ok(Some(meta))
}
