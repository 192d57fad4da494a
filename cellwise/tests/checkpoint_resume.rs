use anyhow::Result;
use cellwise::{
    checkpoint::{
        final_checkpoint_path, optimizer_path, save_checkpoint, try_resume, CheckpointMeta,
    },
    model::CellClassifierInit,
    optim::AdamInit,
};
use tch::{nn, Device, Kind, Tensor};

fn build(vs: &nn::VarStore) -> Result<cellwise::model::CellClassifier> {
    CellClassifierInit {
        architecture: "cellnet_s".parse()?,
        in_channels: 2,
        num_classes: 3,
    }
    .build(&vs.root())
}

#[test]
fn resume_continues_after_saved_epoch() -> Result<()> {
    let dir = tempfile::tempdir()?;

    // train a few steps
    let vs = nn::VarStore::new(Device::Cpu);
    let model = build(&vs)?;
    let mut optimizer = AdamInit::default().build(&vs, 1e-3)?;
    let input = Tensor::rand(&[4, 2, 16, 16], (Kind::Float, Device::Cpu));
    for _ in 0..3 {
        optimizer.zero_grad();
        model.forward_t(&input, true).mean(Kind::Float).backward();
        optimizer.step();
    }

    let meta = CheckpointMeta {
        epoch: 3,
        best_epoch: 2,
        best_metric: 0.125,
    };
    let path = save_checkpoint(&vs, Some(&optimizer), dir.path(), &meta, true)?;
    assert!(optimizer_path(&path)?.is_file());
    assert!(final_checkpoint_path(dir.path()).is_file());
    assert!(optimizer_path(&final_checkpoint_path(dir.path()))?.is_file());

    // restore into fresh instances
    let mut restored_vs = nn::VarStore::new(Device::Cpu);
    let restored_model = build(&restored_vs)?;
    let mut restored_optimizer = AdamInit::default().build(&restored_vs, 1e-3)?;
    let restored = try_resume(&mut restored_vs, &mut restored_optimizer, &path)?
        .expect("checkpoint exists");

    assert_eq!(restored, meta);
    assert_eq!(restored.epoch + 1, 4);
    assert_eq!(restored_optimizer.num_steps(), 3);

    let expect = model.forward_t(&input, false);
    let actual = restored_model.forward_t(&input, false);
    assert!(f64::from((expect - actual).abs().max()) < 1e-6);
    Ok(())
}

#[test]
fn missing_checkpoint_starts_from_scratch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut vs = nn::VarStore::new(Device::Cpu);
    let _model = build(&vs)?;
    let mut optimizer = AdamInit::default().build(&vs, 1e-3)?;

    let resumed = try_resume(&mut vs, &mut optimizer, &dir.path().join("010.ckpt"))?;
    assert!(resumed.is_none());
    assert_eq!(optimizer.num_steps(), 0);
    Ok(())
}

#[test]
fn missing_optimizer_file_is_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let vs = nn::VarStore::new(Device::Cpu);
    let _model = build(&vs)?;
    let meta = CheckpointMeta {
        epoch: 1,
        best_epoch: 1,
        best_metric: 0.5,
    };
    let path = save_checkpoint(&vs, None, dir.path(), &meta, false)?;

    let mut other_vs = nn::VarStore::new(Device::Cpu);
    let _other = build(&other_vs)?;
    let mut optimizer = AdamInit::default().build(&other_vs, 1e-3)?;
    let resumed = try_resume(&mut other_vs, &mut optimizer, &path)?;
    assert_eq!(resumed, Some(meta));
    assert_eq!(optimizer.num_steps(), 0);
    Ok(())
}
