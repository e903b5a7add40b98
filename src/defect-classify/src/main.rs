use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use structopt::StructOpt;

use defect_serve::{
    Detector, JsonlStore, MemoryStore, ModelConfig, RecordStore, SavedModelScorer, Timer,
};

extern crate serde_json;

use log::info;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "defect-classify",
    about = "CLI app to classify images as defective with TensorFlow"
)]
enum CmdArgs {
    /// Classify one image and print the resulting record
    Classify {
        #[structopt(help = "Export directory of TensorFlow SavedModel")]
        export_dir: PathBuf,

        #[structopt(help = "Path or URL of the image")]
        image: String,

        #[structopt(long, help = "Declared media type, e.g. image/png")]
        media_type: Option<String>,

        #[structopt(
            long,
            env = "DEFECT_INPUT_OP",
            default_value = "serving_default_conv2d_input"
        )]
        input_op: String,

        #[structopt(
            long,
            env = "DEFECT_OUTPUT_OP",
            default_value = "StatefulPartitionedCall"
        )]
        output_op: String,

        #[structopt(
            long,
            env = "DEFECT_STORE_PATH",
            help = "Persist the record in this store"
        )]
        store: Option<PathBuf>,
    },

    /// Print the most recent records of a store
    History {
        #[structopt(
            long,
            env = "DEFECT_STORE_PATH",
            default_value = "./data/predictions.jsonl"
        )]
        store: PathBuf,
    },
}

fn fetch(image: &str) -> Result<(Vec<u8>, Option<String>), Box<dyn Error>> {
    if image.starts_with("http://") || image.starts_with("https://") {
        let t = Timer::start(format!("Fetching image from {}", image));

        let resp = reqwest::blocking::get(image)?.error_for_status()?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = resp.bytes()?.to_vec();

        t.stop();

        Ok((bytes, content_type))
    } else {
        let path = Path::new(image);
        Ok((fs::read(path)?, media_type_for_path(path).map(str::to_owned)))
    }
}

fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match CmdArgs::from_args() {
        CmdArgs::Classify {
            export_dir,
            image,
            media_type,
            input_op,
            output_op,
            store,
        } => {
            let model = ModelConfig {
                export_dir,
                input_op,
                output_op,
            };
            let scorer = Arc::new(SavedModelScorer::load(&model)?);

            let store: Arc<dyn RecordStore> = match store {
                Some(path) => Arc::new(JsonlStore::open(&path)?),
                None => Arc::new(MemoryStore::new()),
            };

            let (bytes, detected) = fetch(&image)?;
            let declared = media_type.or(detected).unwrap_or_default();

            let record = Detector::new(scorer, store).predict(&bytes, &declared)?;
            let json = serde_json::to_string(&record)?;

            info!("{}", json);
            println!("{}", json);
        }
        CmdArgs::History { store } => {
            let store = JsonlStore::open(&store)?;
            let records = defect_serve::detector::recent_records(&store)?;

            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
    }

    Ok(())
}
