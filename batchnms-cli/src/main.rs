use batchnms::{
    Backend, BoxTensor, DType, Element, NmsConfig, NmsOutput, NonMaxSuppression,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Batched NMS CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BackendConfig {
    Scalar,
    Rayon,
}

impl From<BackendConfig> for Backend {
    fn from(value: BackendConfig) -> Self {
        match value {
            BackendConfig::Scalar => Backend::Scalar,
            BackendConfig::Rayon => Backend::Rayon,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct NmsConfigJson {
    score_threshold: f32,
    id_index: i32,
    score_index: usize,
    coord_start: usize,
    iou_threshold: f32,
    force_suppress: bool,
    top_k: i32,
    max_output_size: i32,
    return_indices: bool,
    invalid_to_bottom: bool,
    backend: BackendConfig,
}

impl Default for NmsConfigJson {
    fn default() -> Self {
        let cfg = NmsConfig::default();
        Self {
            score_threshold: cfg.score_threshold,
            id_index: cfg.id_index,
            score_index: cfg.score_index,
            coord_start: cfg.coord_start,
            iou_threshold: cfg.iou_threshold,
            force_suppress: cfg.force_suppress,
            top_k: cfg.top_k,
            max_output_size: cfg.max_output_size,
            return_indices: cfg.return_indices,
            invalid_to_bottom: cfg.invalid_to_bottom,
            backend: BackendConfig::Scalar,
        }
    }
}

impl From<NmsConfigJson> for NmsConfig {
    fn from(value: NmsConfigJson) -> Self {
        NmsConfig {
            score_threshold: value.score_threshold,
            id_index: value.id_index,
            score_index: value.score_index,
            coord_start: value.coord_start,
            iou_threshold: value.iou_threshold,
            force_suppress: value.force_suppress,
            top_k: value.top_k,
            max_output_size: value.max_output_size,
            return_indices: value.return_indices,
            invalid_to_bottom: value.invalid_to_bottom,
            backend: value.backend.into(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Config {
    input_path: String,
    output_path: Option<String>,
    nms: NmsConfigJson,
}

/// Detector output stored as a flat row-major buffer.
#[derive(Debug, Deserialize)]
struct InputTensor {
    #[serde(default = "default_dtype")]
    dtype: String,
    batch_size: usize,
    num_anchors: usize,
    elem_length: usize,
    data: Vec<f64>,
}

fn default_dtype() -> String {
    DType::Float32.name().to_string()
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output<T> {
    /// Survivor anchor indices per batch, trimmed to the survivor count.
    Indices { counts: Vec<i32>, indices: Vec<Vec<i32>> },
    /// Rank-ordered rows per batch.
    Boxes { boxes: Vec<Vec<Vec<T>>> },
}

fn to_output<T: Element + Serialize>(out: NmsOutput<T>) -> Output<T> {
    match out {
        NmsOutput::Indices { indices, counts } => {
            let rows = counts
                .iter()
                .enumerate()
                .map(|(b, &count)| {
                    let row = indices.row(b).unwrap_or_default();
                    row[..(count.max(0) as usize).min(row.len())].to_vec()
                })
                .collect();
            Output::Indices {
                counts,
                indices: rows,
            }
        }
        NmsOutput::Boxes(boxes) => Output::Boxes {
            boxes: box_rows(&boxes),
        },
    }
}

fn box_rows<T: Element>(boxes: &BoxTensor<T>) -> Vec<Vec<Vec<T>>> {
    let shape = boxes.shape();
    (0..shape.batch_size())
        .map(|b| {
            boxes
                .batch(b)
                .unwrap_or_default()
                .chunks_exact(shape.elem_length())
                .map(<[T]>::to_vec)
                .collect()
        })
        .collect()
}

fn run_typed<T: Element + Serialize>(
    nms: &NonMaxSuppression,
    input: &InputTensor,
    data: Vec<T>,
) -> Result<String, Box<dyn std::error::Error>> {
    let tensor = BoxTensor::new(data, input.batch_size, input.num_anchors, input.elem_length)?;
    let out = nms.run(tensor.view())?;
    Ok(serde_json::to_string_pretty(&to_output(out))?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("batchnms=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.input_path.is_empty() {
        return Err("input_path must be set in the config".into());
    }

    let _span = tracing::info_span!("batchnms_cli", input = %config.input_path).entered();
    let input_text = fs::read_to_string(&config.input_path)?;
    let input: InputTensor = serde_json::from_str(&input_text)?;
    let dtype: DType = input.dtype.parse()?;
    dtype.ensure_box_type()?;
    tracing::info!(
        dtype = %dtype,
        batch_size = input.batch_size,
        num_anchors = input.num_anchors,
        "loaded input tensor"
    );

    let nms = NonMaxSuppression::new().with_config(config.nms.into());
    let json = match dtype {
        DType::Float64 => run_typed(&nms, &input, input.data.clone())?,
        _ => {
            let data = input.data.iter().map(|&v| v as f32).collect();
            run_typed::<f32>(&nms, &input, data)?
        }
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
