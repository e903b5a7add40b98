use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;
use tensorflow::{Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Status, Tensor};

use super::{ScoreError, Scorer};
use crate::normalize::{NormalizedTensor, CHANNELS, HEIGHT, WIDTH};
use crate::Timer;

/// Where to find the exported classifier and which graph operations to use.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// Export directory of a SavedModel tagged `serve`.
    pub export_dir: PathBuf,

    /// Operation receiving the `[1, 150, 150, 3]` input tensor.
    pub input_op: String,

    /// Operation producing the `[1, 1]` sigmoid output.
    pub output_op: String,
}

impl ModelConfig {
    pub const DEFAULT_INPUT_OP: &'static str = "serving_default_conv2d_input";
    pub const DEFAULT_OUTPUT_OP: &'static str = "StatefulPartitionedCall";

    pub fn new(export_dir: &Path) -> Self {
        ModelConfig {
            export_dir: export_dir.to_path_buf(),
            input_op: Self::DEFAULT_INPUT_OP.to_owned(),
            output_op: Self::DEFAULT_OUTPUT_OP.to_owned(),
        }
    }
}

struct Loaded {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,
}

/// Scores tensors with a TensorFlow SavedModel.
///
/// Session runs are serialized through a mutex so a single loaded model can
/// be shared by every request.
pub struct SavedModelScorer {
    loaded: Mutex<Loaded>,
    input_op: String,
    output_op: String,
}

impl From<Status> for ScoreError {
    fn from(status: Status) -> Self {
        ScoreError::Backend(status.to_string())
    }
}

impl SavedModelScorer {
    pub fn load(config: &ModelConfig) -> tensorflow::Result<Self> {
        let t = Timer::start("Loading session");

        let mut graph = Graph::new();
        let session = SavedModelBundle::load(
            &SessionOptions::new(),
            &["serve"],
            &mut graph,
            &config.export_dir,
        )?
        .session;

        // Fail at startup rather than on the first request.
        graph.operation_by_name_required(&config.input_op)?;
        graph.operation_by_name_required(&config.output_op)?;

        t.stop();
        info!("Loaded model from {}", config.export_dir.display());

        Ok(SavedModelScorer {
            loaded: Mutex::new(Loaded { graph, session }),
            input_op: config.input_op.clone(),
            output_op: config.output_op.clone(),
        })
    }
}

impl Scorer for SavedModelScorer {
    fn score(&self, tensor: &NormalizedTensor) -> Result<f32, ScoreError> {
        let input = Tensor::new(&[1, HEIGHT as u64, WIDTH as u64, CHANNELS as u64])
            .with_values(tensor.as_slice())?;

        let loaded = self
            .loaded
            .lock()
            .map_err(|_| ScoreError::Backend("model lock poisoned".to_owned()))?;

        let mut args = SessionRunArgs::new();

        args.add_feed(
            &loaded.graph.operation_by_name_required(&self.input_op)?,
            0,
            &input,
        );

        let result = args.request_fetch(
            &loaded.graph.operation_by_name_required(&self.output_op)?,
            0,
        );

        loaded.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(result)?;

        output.first().copied().ok_or(ScoreError::EmptyOutput)
    }
}
