use std::io::{self, IsTerminal, Read};

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "llm-overlay-translator",
    version,
    about = "Detect, translate and overlay text on images using LLM tool calls"
)]
struct Cli {
    /// Image to translate (reads stdin when omitted)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Mime type for --data or stdin (auto, png, jpeg, webp, gif, bmp, tiff)
    #[arg(short = 'M', long = "data-mime")]
    data_mime: Option<String>,

    /// Target language (default from settings [translate])
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Gemini model name (e.g. gemini-2.5-flash)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Use detections from a JSON file instead of calling the model
    #[arg(long = "detections")]
    detections: Option<String>,

    /// Rendered display width in pixels (default: natural width)
    #[arg(long = "display-width")]
    display_width: Option<u32>,

    /// Rendered display height in pixels (default: natural height)
    #[arg(long = "display-height")]
    display_height: Option<u32>,

    /// Write the image with overlays painted on it instead of printing JSON
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Append model name to output
    #[arg(long = "with-using-model")]
    with_using_model: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Start the HTTP server (optionally on the given address)
    #[arg(long = "server", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    llm_overlay_translator::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server {
        let addr = Some(addr).filter(|value| !value.trim().is_empty());
        return llm_overlay_translator::serve(cli.read_settings.as_deref(), cli.key, addr).await;
    }

    let stdin_bytes = if cli.data.is_some() || io::stdin().is_terminal() {
        None
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Some(buffer)
    };

    let output = llm_overlay_translator::run(
        llm_overlay_translator::Config {
            data: cli.data,
            data_mime: cli.data_mime,
            lang: cli.lang,
            model: cli.model,
            key: cli.key,
            detections_path: cli.detections,
            display_width: cli.display_width,
            display_height: cli.display_height,
            output: cli.output,
            settings_path: cli.read_settings,
            with_using_model: cli.with_using_model,
        },
        stdin_bytes,
    )
    .await?;
    println!("{}", output);
    Ok(())
}
