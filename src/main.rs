use anyhow::{Context, Result};
use clap::Parser;
use gemstream::ai::mime::extension_for_mime;
use gemstream::ai::GeminiStreamClient;
use gemstream::models::{
    Config, ContentBody, ContentItem, GenerationConfig, ImageAttachment, Modality,
};
use gemstream::transcript::{Run, Transcript};
use gemstream::{ContentSink, Conversation, SessionState};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "gemstream")]
#[command(about = "Stream text and images from a Gemini model")]
struct CliArgs {
    /// Prompt to send. Without one, prompts are read line by line from stdin
    /// (`/new` starts a new conversation, `/quit` exits).
    prompt: Option<String>,

    /// Image to attach to the first prompt.
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Directory generated images are written to.
    #[arg(long, value_name = "DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Model ID, overriding GEMINI_MODEL.
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f64>,

    #[arg(long)]
    top_k: Option<u32>,

    #[arg(long)]
    top_p: Option<f64>,

    #[arg(long)]
    max_output_tokens: Option<u32>,

    /// Ask for text only instead of text and images.
    #[arg(long)]
    text_only: bool,
}

impl CliArgs {
    fn generation_config(&self) -> GenerationConfig {
        let mut config = GenerationConfig::default();
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(top_k) = self.top_k {
            config = config.with_top_k(top_k);
        }
        if let Some(top_p) = self.top_p {
            config = config.with_top_p(top_p);
        }
        if let Some(max_output_tokens) = self.max_output_tokens {
            config = config.with_max_output_tokens(max_output_tokens);
        }
        if self.text_only {
            config = config.with_response_modalities(&[Modality::Text]);
        }
        config
    }
}

/// Prints text deltas as they arrive and writes images to disk.
struct TerminalSink {
    transcript: Transcript,
    output_dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl TerminalSink {
    fn new(output_dir: PathBuf) -> Self {
        Self {
            transcript: Transcript::new(),
            output_dir,
            saved: Vec::new(),
        }
    }

    fn save_image(&mut self, data: &[u8], mime_type: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension_for_mime(mime_type)));
        std::fs::write(&path, data)?;
        self.saved.push(path.clone());
        Ok(path)
    }
}

impl ContentSink for TerminalSink {
    fn on_content_item(&mut self, item: ContentItem) {
        let after_image = matches!(self.transcript.runs().last(), Some(Run::Image { .. }));
        let merged = self.transcript.apply(&item);

        match &item.body {
            ContentBody::PlainText(text) | ContentBody::StructuredText(text) => {
                if !merged && after_image {
                    println!();
                }
                print!("{}", text);
                std::io::stdout().flush().ok();
            }
            ContentBody::Image { data, mime_type } => match self.save_image(data, mime_type) {
                Ok(path) => println!("\n[image: {}]", path.display()),
                Err(e) => error!("Failed to save {} image: {}", mime_type, e),
            },
        }
    }

    fn on_error(&mut self, message: &str) {
        println!();
        error!("{}", message);
    }

    fn on_complete(&mut self) {
        println!();
    }
}

async fn run_turn(
    conversation: &mut Conversation,
    prompt: &str,
    image: Option<ImageAttachment>,
    output_dir: &Path,
) -> gemstream::Result<SessionState> {
    let mut sink = TerminalSink::new(output_dir.to_path_buf());
    let result = match image {
        Some(image) => {
            conversation
                .generate_content_with_image(prompt, image, &mut sink)
                .await
        }
        None => conversation.generate_content(prompt, &mut sink).await,
    };
    info!(
        "Turn finished with {} run(s), {} image(s) saved",
        sink.transcript.runs().len(),
        sink.saved.len()
    );
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemstream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    info!("Starting gemstream (model: {})", config.model);

    let client = GeminiStreamClient::from_config(&config)?;
    let mut conversation =
        Conversation::new(Box::new(client)).with_generation_config(args.generation_config());

    let stop = conversation.stop_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stopping the current response");
            stop.stop();
        }
    });

    let mut image = match &args.image {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            Some(ImageAttachment::from_bytes(bytes))
        }
        None => None,
    };

    if let Some(prompt) = &args.prompt {
        if run_turn(&mut conversation, prompt, image, &args.output_dir)
            .await
            .is_err()
        {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/new" => {
                conversation.clear_history();
                info!("Started a new conversation");
            }
            prompt => {
                // Failures are reported by the sink; the next prompt can retry.
                let _ = run_turn(&mut conversation, prompt, image.take(), &args.output_dir).await;
            }
        }
    }

    Ok(())
}
