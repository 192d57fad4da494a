use anyhow::Result;
use cellwise::{
    augment::{augmented_views, TTA_TRANSFORMS},
    dataset::{CellCropSource, ImageRecord},
    inference::{CellTable, ImageOutcome, InferencePipeline, OutputDirs},
    label::LabelVector,
    model::{CellClassifier, CellClassifierInit, CellEncoder},
};
use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tch::{nn, Device, Kind, Tensor};

const IMAGE_SIZE: i64 = 16;
const NUM_CLASSES: usize = 3;

/// Serves fixed crops per image id and records the request order.
#[derive(Debug)]
struct FixedCrops {
    crops: HashMap<String, Vec<Tensor>>,
    requests: Mutex<Vec<String>>,
}

impl FixedCrops {
    fn new(num_cells: &[(&str, usize)]) -> Self {
        tch::manual_seed(17);
        let crops = num_cells
            .iter()
            .map(|&(image_id, count)| {
                let crops = (0..count)
                    .map(|_| {
                        Tensor::rand(
                            &[4, IMAGE_SIZE, IMAGE_SIZE],
                            (Kind::Float, Device::Cpu),
                        )
                    })
                    .collect();
                (image_id.to_string(), crops)
            })
            .collect();
        Self {
            crops,
            requests: Mutex::new(vec![]),
        }
    }
}

impl CellCropSource for FixedCrops {
    fn cell_crops(&self, image: &ImageRecord) -> Result<Vec<Tensor>> {
        self.requests.lock().unwrap().push(image.id.clone());
        let crops = self
            .crops
            .get(&image.id)
            .map(|crops| crops.iter().map(|crop| crop.shallow_clone()).collect())
            .unwrap_or_default();
        Ok(crops)
    }
}

fn record(dir: &Path, id: &str) -> Arc<ImageRecord> {
    Arc::new(ImageRecord {
        id: id.to_string(),
        base_path: dir.join(id),
        label: LabelVector::empty(NUM_CLASSES),
        channels: 4,
    })
}

fn classifier(vs: &nn::VarStore) -> Result<CellClassifier> {
    tch::manual_seed(5);
    CellClassifierInit {
        architecture: "cellnet_s".parse()?,
        in_channels: 4,
        num_classes: NUM_CLASSES,
    }
    .build(&vs.root())
}

fn max_abs_diff(lhs: &[f32], rhs: &[f32]) -> f32 {
    assert_eq!(lhs.len(), rhs.len());
    lhs.iter()
        .zip(rhs)
        .map(|(lhs, rhs)| (lhs - rhs).abs())
        .fold(0.0, f32::max)
}

#[test]
fn rows_are_means_over_views() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = classifier(&vs)?;
    let source = FixedCrops::new(&[("two_cells", 2)]);
    let dirs = OutputDirs::for_fold(dir.path(), 0);

    let pipeline = InferencePipeline::new(&model, &source, dirs.clone(), Device::Cpu);
    let image = record(dir.path(), "two_cells");
    pipeline.run(&[image.clone()])?;

    let predictions = CellTable::read(&dirs.prediction_path(&image)?)?;
    let embeddings = CellTable::read(&dirs.embedding_path(&image)?)?;
    assert_eq!(predictions.len(), 2);
    assert_eq!(embeddings.len(), 2);
    assert_eq!(predictions.width(), Some(NUM_CLASSES));
    assert_eq!(embeddings.width(), Some(model.embedding_dim()));

    for (cell_number, crop) in source.crops["two_cells"].iter().enumerate() {
        let views = augmented_views(crop, &TTA_TRANSFORMS)?;
        assert_eq!(views.size()[0], 4);

        let (probs, embs) = model.predict_and_embed(&views);
        let expect_probs = Vec::<f32>::from(&probs.mean_dim(&[0], false, Kind::Float));
        let expect_embs = Vec::<f32>::from(&embs.mean_dim(&[0], false, Kind::Float));

        let (number, values) = &predictions.rows()[cell_number];
        assert_eq!(*number, cell_number);
        assert!(max_abs_diff(values, &expect_probs) < 1e-5);
        assert!(values.iter().all(|prob| (0.0..=1.0).contains(prob)));

        let (_, values) = &embeddings.rows()[cell_number];
        assert!(max_abs_diff(values, &expect_embs) < 1e-4);
    }
    Ok(())
}

#[test]
fn second_run_writes_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = classifier(&vs)?;
    let source = FixedCrops::new(&[("a", 2), ("b", 1), ("empty", 0)]);
    let dirs = OutputDirs::for_fold(dir.path(), 1);
    let pipeline = InferencePipeline::new(&model, &source, dirs.clone(), Device::Cpu);

    let images: Vec<_> = ["a", "b", "empty"]
        .iter()
        .map(|id| record(dir.path(), id))
        .collect();

    let first = pipeline.run(&images)?;
    assert_eq!(first.num_written, 2);
    assert_eq!(first.num_cells, 3);
    assert_eq!(first.num_without_cells, 1);

    // processed from the last image to the first one
    assert_eq!(*source.requests.lock().unwrap(), vec!["empty", "b", "a"]);

    let snapshot = |image: &ImageRecord| -> Result<(Vec<u8>, Vec<u8>)> {
        Ok((
            fs::read(dirs.prediction_path(image)?)?,
            fs::read(dirs.embedding_path(image)?)?,
        ))
    };
    let before: Vec<_> = images[..2]
        .iter()
        .map(|image| snapshot(&**image))
        .collect::<Result<_>>()?;

    let second = pipeline.run(&images)?;
    assert_eq!(second.num_written, 0);
    assert_eq!(second.num_already_computed, 2);
    assert_eq!(second.num_without_cells, 1);

    let after: Vec<_> = images[..2]
        .iter()
        .map(|image| snapshot(&**image))
        .collect::<Result<_>>()?;
    assert_eq!(before, after);

    // zero-cell images leave no files
    assert!(!dirs.prediction_path(&images[2])?.exists());
    assert!(!dirs.embedding_path(&images[2])?.exists());
    assert_eq!(
        pipeline.process_image(&images[0])?,
        ImageOutcome::AlreadyComputed
    );
    Ok(())
}
