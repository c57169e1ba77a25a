//! Transcription example
//!
//! Sends one or more images to an OpenAI-compatible vision endpoint and
//! prints the structured transcription.
//!
//! ```text
//! VLM_ENDPOINT_URL=http://localhost:8000/v1 VLM_MODEL=Qwen2.5-VL-7B-Instruct \
//!     cargo run --example transcribe -- page.png [more.png ...]
//! ```
//!
//! Set `RUST_LOG=debug` to see the payload preview and per-attempt logs.

use vlm_structured::{
    get_api_key, get_endpoint, get_model, schema, InferenceOptions, InferenceRequest, RetryState,
    ServiceDefaults, VisionClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: transcribe <image> [image ...]");
        std::process::exit(2);
    }

    // Endpoint, model and retry defaults all come from the environment
    let mut builder = InferenceOptions::builder()
        .endpoint(get_endpoint(None))
        .defaults(ServiceDefaults::from_env()?);
    if let Some(model) = get_model(None, true) {
        builder = builder.model(model);
    }
    if let Some(key) = get_api_key() {
        builder = builder.api_key(key);
    }
    let options = builder.build()?;

    let images = paths
        .iter()
        .map(image::open)
        .collect::<Result<Vec<_>, _>>()?;

    let transcription = schema()
        .title("BlockTranscription")
        .field("markdown", "string")
        .optional_field("language", "string")
        .build();

    println!(
        "Sending {} image(s) to {}...\n",
        images.len(),
        options.endpoint
    );

    let client = VisionClient::new(options);
    let report = client
        .infer_with_outcome(InferenceRequest::new(
            "Transcribe all text in the image(s) as markdown. Preserve headings, lists and tables.",
            &images,
            &transcription,
        ))
        .await?;

    match report.state {
        RetryState::Success => {
            let value = report.into_value();
            if let Some(language) = value["language"].as_str() {
                println!("Language: {}\n", language);
            }
            println!("{}", value["markdown"].as_str().unwrap_or_default());
        }
        _ => {
            println!(
                "No valid transcription after {} attempt(s): {}",
                report.attempts,
                report.outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}
