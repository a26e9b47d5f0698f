use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sketchpad", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a pipeline document to PNG.
    Render(RenderArgs),
    /// Parse and validate a pipeline document without rendering it.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input pipeline JSON. Image `src` keys resolve relative to its directory.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long, required_unless_present = "data_uri")]
    out: Option<PathBuf>,

    /// Print a `data:image/png;base64,` URI to stdout instead of (or in addition to) a file.
    #[arg(long)]
    data_uri: bool,

    /// Override the document width.
    #[arg(long)]
    width: Option<u32>,

    /// Override the document height.
    #[arg(long)]
    height: Option<u32>,

    /// Initial raster color, e.g. `#12141c` or `white`.
    #[arg(long)]
    clear: Option<String>,

    /// Skip scanning installed system fonts.
    #[arg(long)]
    no_system_fonts: bool,

    /// Extra font directory (repeatable).
    #[arg(long = "font-dir")]
    font_dirs: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input pipeline JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_document(path: &Path) -> anyhow::Result<sketchpad::Document> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("read pipeline document '{}'", path.display()))?;
    let doc = sketchpad::Document::from_json(&source)
        .with_context(|| format!("parse pipeline document '{}'", path.display()))?;
    Ok(doc)
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let doc = read_document(&args.in_path)?;
    doc.validate()?;
    eprintln!(
        "ok: {}x{}, {} operations",
        doc.width,
        doc.height,
        doc.pipeline.ops.len()
    );
    Ok(())
}

fn settings_for(args: &RenderArgs) -> anyhow::Result<sketchpad::RenderSettings> {
    let mut settings = sketchpad::RenderSettings::from_env()?;
    if let Some(clear) = &args.clear {
        settings.clear_rgba = Some(sketchpad::Rgba8::parse_css(clear)?);
    }
    if args.no_system_fonts {
        settings.load_system_fonts = false;
    }
    settings.font_dirs.extend(args.font_dirs.iter().cloned());
    Ok(settings)
}

async fn render_and_export(
    pipeline: &mut sketchpad::Pipeline,
    width: u32,
    height: u32,
    data_uri: bool,
) -> anyhow::Result<(Option<Vec<u8>>, Option<String>)> {
    pipeline.render(width, height).await?;
    pipeline.compose()?;
    let png = pipeline.export_png()?;
    let uri = if data_uri {
        pipeline.export_data_uri()?
    } else {
        None
    };
    Ok((png, uri))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut doc = read_document(&args.in_path)?;
    if let Some(w) = args.width {
        doc.width = w;
    }
    if let Some(h) = args.height {
        doc.height = h;
    }
    let (width, height) = (doc.width, doc.height);

    let settings = settings_for(&args)?;
    let blob_root = args.in_path.parent().unwrap_or_else(|| Path::new("."));
    let store: Arc<dyn sketchpad::BlobStore> = Arc::new(sketchpad::FsBlobStore::new(blob_root));
    let mut built = doc.into_pipeline(settings, Some(store))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build async runtime")?;

    let result = runtime.block_on(async {
        let rendered =
            render_and_export(&mut built.pipeline, width, height, args.data_uri).await;
        built.clear_all().await;
        rendered
    });
    let (png, uri) = result?;
    let png = png.context("render produced no environment")?;

    if let Some(out) = &args.out {
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        std::fs::write(out, &png).with_context(|| format!("write png '{}'", out.display()))?;
        eprintln!("wrote {}", out.display());
    }
    if let Some(uri) = uri {
        println!("{uri}");
    }
    Ok(())
}
