use anyhow::Result;
use cellwise::{
    checkpoint::{checkpoint_summary, CheckpointSummary},
    config::DataConfig,
    folds::{FoldAssignment, FoldPartitionerInit, DEFAULT_KFOLD_SEED},
};
use clap::Parser;
use log::info;
use prettytable::{cell, row, Table};
use rand::{rngs::StdRng, SeedableRng};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
enum Opts {
    /// Split the segmented cells of every image into folds
    SplitFolds {
        /// json5 data configuration file
        #[clap(long, default_value = "data.json5")]
        data_config: PathBuf,
        #[clap(long, default_value = "3")]
        num_folds: usize,
        /// seed of the per-image cell split
        #[clap(long, default_value_t = DEFAULT_KFOLD_SEED)]
        kfold_seed: u64,
        /// seed of the fold choices of single-cell and small images
        #[clap(long, default_value = "0")]
        seed: u64,
        /// relative odds of each fold receiving a single-cell image
        #[clap(long, multiple_values = true)]
        single_cell_weights: Option<Vec<u32>>,
        /// output fold file, the configured fold file by default
        #[clap(long)]
        output_file: Option<PathBuf>,
    },
    /// Show the sizes of the folds in a fold file
    FoldInfo {
        /// fold file
        folds_file: PathBuf,
    },
    /// Show the training progress stored in checkpoint files
    CheckpointInfo {
        /// checkpoint files
        #[clap(required = true)]
        checkpoint_files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::SplitFolds {
            data_config,
            num_folds,
            kfold_seed,
            seed,
            single_cell_weights,
            output_file,
        } => {
            let data = DataConfig::open(&data_config)?;
            let output_file = output_file.unwrap_or_else(|| data.folds_file.clone());
            let init = FoldPartitionerInit {
                num_folds,
                kfold_seed,
                single_cell_weights,
            };
            let folds = split_folds(&data, init, seed, &output_file)?;
            print_fold_table(&folds);
        }
        Opts::FoldInfo { folds_file } => {
            let folds = FoldAssignment::load(&folds_file)?;
            print_fold_table(&folds);
        }
        Opts::CheckpointInfo { checkpoint_files } => {
            checkpoint_info(&checkpoint_files)?;
        }
    }

    Ok(())
}

fn split_folds(
    data: &DataConfig,
    init: FoldPartitionerInit,
    seed: u64,
    output_file: &Path,
) -> Result<FoldAssignment> {
    let partitioner = init.build()?;
    let masks = data.cell_box_index().mask_indices()?;
    info!("splitting the cells of {} images", masks.len());

    let folds = partitioner.partition(&masks, &mut StdRng::seed_from_u64(seed));
    folds.save(output_file)?;
    info!("saved fold file '{}'", output_file.display());

    Ok(folds)
}

fn print_fold_table(folds: &FoldAssignment) {
    fold_table(folds).printstd();
}

/// Tabulates the fold sizes.
///
/// The last column counts the images contributing exactly one cell to a
/// fold. Multi-cell images split one cell per fold are counted too.
fn fold_table(folds: &FoldAssignment) -> Table {
    let mut table = Table::new();
    table.add_row(row!["fold", "images", "cells", "images with one cell in fold"]);

    folds
        .folds()
        .iter()
        .zip(folds.fold_sizes())
        .enumerate()
        .for_each(|(index, (fold, num_cells))| {
            let num_single = fold.values().filter(|cells| cells.len() == 1).count();
            table.add_row(row![index, fold.len(), num_cells, num_single]);
        });

    table
}

fn checkpoint_info(paths: &[PathBuf]) -> Result<()> {
    let mut table = Table::new();
    table.add_row(row![
        "file",
        "epoch",
        "best epoch",
        "best focal loss",
        "tensors",
        "parameters",
        "optimizer"
    ]);

    for path in paths {
        let CheckpointSummary {
            meta,
            num_tensors,
            num_elements,
            has_optimizer,
        } = checkpoint_summary(path)?;

        table.add_row(row![
            path.display(),
            meta.epoch,
            meta.best_epoch,
            format!("{:.4}", meta.best_metric),
            num_tensors,
            num_elements,
            if has_optimizer { "yes" } else { "no" }
        ]);
    }

    table.printstd();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellwise::dataset::{save_cell_boxes, CellBox};
    use std::fs;

    fn cells(count: usize) -> Vec<CellBox> {
        (1..=count)
            .map(|cell_index| CellBox {
                cell_index,
                top: 0,
                left: 0,
                bottom: 4,
                right: 4,
            })
            .collect()
    }

    #[test]
    fn split_folds_from_cell_boxes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let boxes_dir = dir.path().join("boxes");
        fs::create_dir_all(&boxes_dir)?;
        save_cell_boxes(&boxes_dir.join("six.csv"), &cells(6))?;
        save_cell_boxes(&boxes_dir.join("one.csv"), &cells(1))?;
        save_cell_boxes(&boxes_dir.join("two.csv"), &cells(2))?;

        let data = DataConfig {
            manifests: vec![],
            cell_boxes_dirs: vec![boxes_dir],
            folds_file: dir.path().join("folds.json"),
            cell_labels_file: None,
            class_names_file: None,
        };
        let folds = split_folds(&data, FoldPartitionerInit::new(3), 0, &data.folds_file)?;

        assert_eq!(folds.num_folds(), 3);
        assert_eq!(folds.fold_sizes().iter().sum::<usize>(), 9);
        for fold in folds.folds() {
            assert_eq!(fold.get("six").map(|cells| cells.len()), Some(2));
        }
        assert_eq!(FoldAssignment::load(&data.folds_file)?, folds);
        Ok(())
    }

    #[test]
    fn fold_table_counts_cells_per_fold() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("folds.json");
        fs::write(&path, r#"[{"a":[1],"b":[1,2]},{"a":[2],"c":[4]}]"#)?;
        let folds = FoldAssignment::load(&path)?;

        let table = fold_table(&folds);
        let cell = |row: usize, col: usize| {
            table
                .get_row(row)
                .and_then(|row| row.get_cell(col))
                .map(|cell| cell.get_content())
        };

        assert_eq!(table.len(), 3);
        assert_eq!(cell(0, 3).as_deref(), Some("images with one cell in fold"));
        // image "a" is split one cell per fold and counts in both
        assert_eq!(cell(1, 2).as_deref(), Some("3"));
        assert_eq!(cell(1, 3).as_deref(), Some("1"));
        assert_eq!(cell(2, 3).as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn parse_split_folds_options() {
        let opts = Opts::parse_from([
            "cell-tool",
            "split-folds",
            "--num-folds",
            "2",
            "--single-cell-weights",
            "1",
            "3",
        ]);
        match opts {
            Opts::SplitFolds {
                num_folds,
                kfold_seed,
                single_cell_weights,
                ..
            } => {
                assert_eq!(num_folds, 2);
                assert_eq!(kfold_seed, DEFAULT_KFOLD_SEED);
                assert_eq!(single_cell_weights, Some(vec![1, 3]));
            }
            _ => panic!("unexpected subcommand"),
        }
    }
}
