use clap::Parser;
use hoidet::{
    DatasetCatalog, EventStorage, HoPairs, HoiConfig, HoiInstances, HoiOutputLayers, ImageSize,
    PairDetections,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "HOI head losses and inference (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct HeadConfigJson {
    score_threshold_test: f32,
    topk_per_image_test: i64,
    action_class_weight_bounds: (f32, f32),
    num_action_classes: usize,
    batch_size_per_image: usize,
    images_per_batch: usize,
    train_datasets: Vec<String>,
    parallel: bool,
}

impl Default for HeadConfigJson {
    fn default() -> Self {
        let cfg = HoiConfig::default();
        Self {
            score_threshold_test: cfg.score_threshold_test,
            topk_per_image_test: cfg.topk_per_image_test,
            action_class_weight_bounds: cfg.action_class_weight_bounds,
            num_action_classes: cfg.num_action_classes,
            batch_size_per_image: cfg.batch_size_per_image,
            images_per_batch: cfg.images_per_batch,
            train_datasets: cfg.train_datasets,
            parallel: cfg.parallel,
        }
    }
}

impl From<HeadConfigJson> for HoiConfig {
    fn from(value: HeadConfigJson) -> Self {
        Self {
            score_threshold_test: value.score_threshold_test,
            topk_per_image_test: value.topk_per_image_test,
            action_class_weight_bounds: value.action_class_weight_bounds,
            num_action_classes: value.num_action_classes,
            batch_size_per_image: value.batch_size_per_image,
            images_per_batch: value.images_per_batch,
            train_datasets: value.train_datasets,
            parallel: value.parallel,
            ..HoiConfig::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImageJson {
    width: f32,
    height: f32,
    gt_actions: Option<Vec<Vec<f32>>>,
    person_boxes: Vec<[f32; 4]>,
    person_box_scores: Vec<f32>,
    object_boxes: Vec<[f32; 4]>,
    object_box_scores: Vec<f32>,
    object_box_classes: Vec<usize>,
}

impl ImageJson {
    fn into_pairs(self, num_actions: usize) -> hoidet::HoiResult<HoPairs> {
        let size = ImageSize::new(self.width, self.height);
        match self.gt_actions {
            Some(rows) => HoPairs::training(size, rows.concat(), num_actions),
            None => HoPairs::inference(
                size,
                PairDetections {
                    person_boxes: self.person_boxes,
                    object_boxes: self.object_boxes,
                    person_box_scores: self.person_box_scores,
                    object_box_scores: self.object_box_scores,
                    object_box_classes: self.object_box_classes,
                },
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BatchJson {
    logits: Vec<f32>,
    images: Vec<ImageJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    output_path: Option<String>,
    head: HeadConfigJson,
    datasets: BTreeMap<String, Option<Vec<f32>>>,
    batch: BatchJson,
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    person_box: [f32; 4],
    object_box: [f32; 4],
    object_class: usize,
    action_class: usize,
    score: f32,
}

fn records(instances: HoiInstances) -> Vec<DetectionRecord> {
    instances
        .into_detections()
        .into_iter()
        .map(|d| DetectionRecord {
            person_box: d.person_box,
            object_box: d.object_box,
            object_class: d.object_class,
            action_class: d.action_class,
            score: d.score,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct Output {
    pos_weights: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detections: Option<Vec<Vec<DetectionRecord>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    losses: Option<BTreeMap<String, f32>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metrics: BTreeMap<String, f32>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("hoidet=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;

    let mut catalog = DatasetCatalog::new();
    for (name, priors) in config.datasets {
        if let Some(priors) = priors {
            catalog.register_priors(name, priors);
        }
    }

    let head_cfg: HoiConfig = config.head.into();
    let head = HoiOutputLayers::from_config(&head_cfg, &catalog)?;
    let num_actions = head_cfg.num_action_classes;

    let pairs = config
        .batch
        .images
        .into_iter()
        .map(|image| image.into_pairs(num_actions))
        .collect::<Result<Vec<_>, _>>()?;
    let training = pairs.first().is_some_and(HoPairs::is_training);

    let mut output = Output {
        pos_weights: head.pos_weights().as_slice().to_vec(),
        detections: None,
        losses: None,
        metrics: BTreeMap::new(),
    };

    if training {
        let mut storage = EventStorage::new();
        let losses = head.losses(config.batch.logits, &pairs, Some(&mut storage))?;
        output.losses = Some(losses.into_iter().map(|(k, v)| (k.to_owned(), v)).collect());
        output.metrics = storage
            .names()
            .filter_map(|name| storage.latest(name).map(|v| (name.to_owned(), v)))
            .collect();
    } else {
        let instances = head.inference(config.batch.logits, &pairs)?;
        output.detections = Some(instances.into_iter().map(records).collect());
    }

    let json = serde_json::to_string_pretty(&output)?;
    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
