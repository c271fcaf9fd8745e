//! Run a saved workflow with a fresh seed and save the result images.
//!
//! Works with either the editor save (`workflow.json`) or the API export
//! (`workflow_api.json`).
//!
//! ```sh
//! RUST_LOG=comfyui_workflow=debug cargo run --example generate -- workflow.json
//! ```

use comfyui_workflow::{ClientConfig, WaitStrategy, WorkflowClient};
use rand::Rng;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "workflow.json".to_string());
    let strategy = match std::env::var("COMFYUI_POLL") {
        Ok(_) => WaitStrategy::Poll,
        Err(_) => WaitStrategy::Push,
    };

    let config = ClientConfig::builder("127.0.0.1:8188")
        .with_strategy(strategy)
        .build();
    let mut client = WorkflowClient::new(config);
    client.load_path(&path)?;
    client.connect().await?;

    let seed: u64 = rand::rng().random_range(0..1_000_000_000_000);
    println!("Seed: {}", seed);
    client.set_seed("KSampler", seed);
    client.set_text("CLIP Text Encode Positive", "a lighthouse on a cliff at dusk, oil painting");
    client.set_text("CLIP Text Encode Negative", "blurry, watermark");

    let outputs = client.run(&["Result Image"]).await?;
    if outputs.is_empty() {
        eprintln!("No outputs for \"Result Image\"");
    }
    for (title, artifacts) in &outputs {
        for (i, output) in artifacts.images.iter().enumerate() {
            let prefix = format!("{}_{}", title.replace(' ', "_"), i);
            match &output.image {
                Some(image) => {
                    let file = format!("{}.png", prefix);
                    image.save(&file)?;
                    println!("Saved {}", file);
                }
                None => {
                    let file = format!("{}_{}", prefix, output.reference.filename);
                    std::fs::write(&file, &output.bytes)?;
                    println!("Saved raw {}", file);
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
