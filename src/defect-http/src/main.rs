use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use log::{debug, info};
use std::convert::Infallible;
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use defect_serve::{Detector, JsonlStore, ModelConfig, SavedModelScorer};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "defect-http",
    about = "HTTP service classifying uploaded images as defective or not"
)]
struct CmdArgs {
    #[structopt(
        long,
        env = "DEFECT_MODEL_DIR",
        help = "Export directory of TensorFlow SavedModel"
    )]
    export_dir: PathBuf,

    #[structopt(
        long,
        env = "DEFECT_INPUT_OP",
        default_value = "serving_default_conv2d_input",
        help = "Graph operation fed with the image tensor"
    )]
    input_op: String,

    #[structopt(
        long,
        env = "DEFECT_OUTPUT_OP",
        default_value = "StatefulPartitionedCall",
        help = "Graph operation producing the defect probability"
    )]
    output_op: String,

    #[structopt(
        long,
        env = "DEFECT_STORE_PATH",
        default_value = "./data/predictions.jsonl",
        help = "Record store file"
    )]
    store: PathBuf,

    #[structopt(
        long,
        env = "DEFECT_JPEG_QUALITY",
        default_value = "75",
        help = "Quality of stored JPEGs"
    )]
    jpeg_quality: u8,

    #[structopt(
        long,
        env = "DEFECT_MAX_UPLOAD",
        default_value = "10485760",
        help = "Largest accepted request body, in bytes"
    )]
    max_upload: usize,

    #[structopt(long, env = "DEFECT_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    #[structopt(long, env = "DEFECT_PORT", default_value = "8001")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let model = ModelConfig {
        export_dir: args.export_dir,
        input_op: args.input_op,
        output_op: args.output_op,
    };
    let scorer = Arc::new(SavedModelScorer::load(&model)?);
    let store = Arc::new(JsonlStore::open(&args.store)?);
    info!("Recording predictions in {}", store.path().display());

    let detector = Arc::new(Detector::new(scorer, store).with_jpeg_quality(args.jpeg_quality));

    let max_upload = args.max_upload;

    let make_service = make_service_fn(move |conn: &AddrStream| {
        debug!("Connection from {}", conn.remote_addr());

        let detector = Arc::clone(&detector);
        let service =
            service_fn(move |req| defect_http::handle(req, detector.clone(), max_upload));

        async move { Ok::<_, Infallible>(service) }
    });

    let addr = SocketAddr::new(args.host, args.port);
    info!("Listening on http://{}", addr);

    Server::bind(&addr).serve(make_service).await?;

    Ok(())
}
