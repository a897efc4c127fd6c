use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use maskstudio::api::ApiClient;
use maskstudio::canvas::{ImageReference, SurfacePoint};
use maskstudio::config::{Config, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use maskstudio::editor::{fast_assist, generate_image, write_data_url, EditOutcome, EditorSession};
use maskstudio::state::{Speaker, TranscriptAggregator, TranscriptUpdate};
use maskstudio::types::{AspectRatio, GenerationSettings, ImageSize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "maskstudio",
    about = "Masked image editing, image generation and a creative chat assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the creative assistant; replies stream as they arrive
    Chat,

    /// Highlight regions of an image and ask the edit model to change them
    Edit {
        /// Image to edit
        #[arg(long)]
        image: PathBuf,

        /// What to do with the highlighted areas
        #[arg(long)]
        instruction: String,

        /// Stroke in surface pixels, `x,y:x,y[:x,y...]`; repeatable
        #[arg(long = "stroke", value_parser = parse_stroke)]
        strokes: Vec<StrokeArg>,

        /// Brush width in surface pixels
        #[arg(long)]
        brush: Option<u32>,

        /// Where to write the edited PNG
        #[arg(long)]
        out: PathBuf,

        /// Also write the highlighted surface that was sent
        #[arg(long)]
        mask_out: Option<PathBuf>,
    },

    /// Generate an image from a text prompt
    Generate {
        #[arg(long)]
        prompt: String,

        /// One of 1:1, 3:4, 4:3, 9:16, 16:9
        #[arg(long, default_value = "1:1", value_parser = parse_aspect_ratio)]
        aspect_ratio: AspectRatio,

        /// One of 1K, 2K, 4K
        #[arg(long, default_value = "1K", value_parser = parse_image_size)]
        size: ImageSize,

        #[arg(long)]
        out: PathBuf,
    },

    /// Ask the low-latency model a one-shot question
    Ask {
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    config.validate()?;
    let client = Arc::new(ApiClient::new(&config)?);

    match cli.command {
        Command::Chat => run_chat(client).await,
        Command::Edit {
            image,
            instruction,
            strokes,
            brush,
            out,
            mask_out,
        } => {
            let request = EditRequest {
                image,
                instruction,
                strokes,
                brush,
                out,
                mask_out,
            };
            run_edit(client, &config, request).await
        }
        Command::Generate {
            prompt,
            aspect_ratio,
            size,
            out,
        } => {
            let settings = GenerationSettings {
                aspect_ratio,
                image_size: size,
            };
            match generate_image(&client, &prompt, settings).await? {
                Some(data_url) => {
                    write_data_url(&data_url, &out).await?;
                    println!("wrote {}", out.display());
                    Ok(())
                }
                None => bail!("the model returned no image"),
            }
        }
        Command::Ask { prompt } => {
            if let Some(answer) = fast_assist(&client, &prompt).await {
                println!("{answer}");
            }
            Ok(())
        }
    }
}

struct EditRequest {
    image: PathBuf,
    instruction: String,
    strokes: Vec<StrokeArg>,
    brush: Option<u32>,
    out: PathBuf,
    mask_out: Option<PathBuf>,
}

async fn run_edit(client: Arc<ApiClient>, config: &Config, request: EditRequest) -> Result<()> {
    let mut editor = EditorSession::new(client, config);
    if let Some(width) = request.brush {
        if !(MIN_BRUSH_SIZE..=MAX_BRUSH_SIZE).contains(&width) {
            bail!("--brush must be within {MIN_BRUSH_SIZE}..={MAX_BRUSH_SIZE}");
        }
        editor.brush().set_width(width);
    }

    let image = ImageReference::from_path(&request.image).await?;
    let size = editor
        .upload(image)
        .await
        .with_context(|| format!("cannot load {}", request.image.display()))?;
    eprintln!("surface {}x{}", size.width, size.height);

    for stroke in &request.strokes {
        let canvas = editor.canvas_mut();
        let mut points = stroke.0.iter().copied();
        if let Some(first) = points.next() {
            canvas.begin_stroke(first);
            canvas.extend_stroke(first);
            for point in points {
                canvas.extend_stroke(point);
            }
            canvas.end_stroke();
        }
    }

    if let Some(mask_out) = &request.mask_out {
        if let Some(surface) = editor.canvas().export_png_data_url()? {
            write_data_url(&surface, mask_out).await?;
        }
    }

    editor.set_prompt(request.instruction);
    match editor.apply_edit().await? {
        EditOutcome::Edited(_) => {
            editor.save_edited(&request.out).await?;
            println!("wrote {}", request.out.display());
            Ok(())
        }
        EditOutcome::NoImageReturned => bail!("the model returned no image"),
        EditOutcome::NotReady => bail!("an image and a non-empty instruction are required"),
    }
}

async fn run_chat(client: Arc<ApiClient>) -> Result<()> {
    let mut aggregator = TranscriptAggregator::with_shared_client(client).with_greeting();
    if let Some(greeting) = aggregator.turns().first() {
        println!("{}", greeting.text);
    }

    let updates = aggregator.subscribe();
    let printer = tokio::spawn(print_updates(updates));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if matches!(line.trim(), "/quit" | "/exit") {
            break;
        }
        let Some(pending) = aggregator.submit(&line) else {
            continue;
        };
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let pump = aggregator.spawn_session(pending, events_tx);
        aggregator.drive_session(&mut events_rx).await;
        let _ = pump.await;
    }

    aggregator.teardown();
    let _ = printer.await;
    Ok(())
}

/// Prints only the newly appended part of the streaming reply.
async fn print_updates(mut updates: mpsc::UnboundedReceiver<TranscriptUpdate>) {
    let mut printed = String::new();
    while let Some(update) = updates.recv().await {
        match update {
            TranscriptUpdate::Republished(turns) => {
                let Some(last) = turns.last().filter(|turn| turn.speaker == Speaker::Assistant)
                else {
                    continue;
                };
                match last.text.strip_prefix(printed.as_str()) {
                    Some(delta) => print!("{delta}"),
                    None => print!("\n{}", last.text),
                }
                printed.clone_from(&last.text);
                let _ = std::io::stdout().flush();
            }
            TranscriptUpdate::Settled { .. } | TranscriptUpdate::Failed { .. } => {
                println!();
                printed.clear();
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StrokeArg(Vec<SurfacePoint>);

fn parse_stroke(value: &str) -> Result<StrokeArg, String> {
    value
        .split(':')
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| format!("expected x,y but got '{pair}'"))?;
            let x: f32 = x.trim().parse().map_err(|_| format!("bad x in '{pair}'"))?;
            let y: f32 = y.trim().parse().map_err(|_| format!("bad y in '{pair}'"))?;
            Ok(SurfacePoint::new(x, y))
        })
        .collect::<Result<Vec<_>, String>>()
        .map(StrokeArg)
}

fn parse_aspect_ratio(value: &str) -> Result<AspectRatio, String> {
    AspectRatio::parse(value).ok_or_else(|| {
        let options: Vec<_> = AspectRatio::ALL.iter().map(|ratio| ratio.as_str()).collect();
        format!("expected one of {}", options.join(", "))
    })
}

fn parse_image_size(value: &str) -> Result<ImageSize, String> {
    ImageSize::parse(value).ok_or_else(|| "expected one of 1K, 2K, 4K".to_string())
}
