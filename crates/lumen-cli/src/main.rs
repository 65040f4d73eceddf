use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lumen_contracts::config::Config;
use lumen_contracts::options::RequestOptions;
use lumen_contracts::prompt;
use lumen_contracts::regions::{translate, RegionRect};
use lumen_engine::client::TransportClient;
use lumen_engine::mask;
use lumen_engine::normalize::{load_image, normalize_to_canvas};
use lumen_engine::output::write_artifact;
use lumen_engine::payload::{
    enhance_payload, generate_payload, inpaint_payload, postprocess_payload, vibe_payload,
    EnhanceSettings, PostprocessTool, PreciseReference, VibeReference, MAX_VIBE_REFERENCES,
};
use lumen_engine::vision::VisionClient;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lumen", version, about = "Request orchestrator for a remote image-generation service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Text-to-image, optionally guided by a precise reference or vibes.
    Generate(GenerateArgs),
    /// Image-to-image enhancement of an existing image.
    Enhance(EnhanceArgs),
    /// Mask-guided inpainting.
    Inpaint(InpaintArgs),
    /// Synthesize a region mask from rectangles.
    Mask(MaskArgs),
    /// Ask the vision collaborator for regions matching an instruction.
    Detect(DetectArgs),
    /// Post-process: upscale an image.
    Upscale(UpscaleArgs),
    /// Post-process: run a named tool over an image.
    Tool(ToolArgs),
}

#[derive(Debug, clap::Args)]
struct GenerationFlags {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "")]
    negative: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long)]
    steps: Option<u32>,
    #[arg(long, value_parser = finite_f64)]
    scale: Option<f64>,
    #[arg(long, value_parser = finite_f64)]
    cfg_rescale: Option<f64>,
    #[arg(long)]
    sampler: Option<String>,
    #[arg(long)]
    noise_schedule: Option<String>,
    /// Force the base high-resolution sampler on or off.
    #[arg(long)]
    smea: Option<bool>,
    /// Force the dynamic high-resolution sampler on or off.
    #[arg(long)]
    smea_dyn: Option<bool>,
    /// Disable automatic high-resolution sampler selection.
    #[arg(long)]
    no_auto_smea: bool,
    #[arg(long, default_value = "output")]
    out: PathBuf,
}

impl GenerationFlags {
    fn to_options(&self) -> RequestOptions {
        let defaults = RequestOptions::default();
        RequestOptions {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative.clone(),
            model: self.model.clone().unwrap_or(defaults.model),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            seed: self.seed,
            steps: self.steps.unwrap_or(defaults.steps),
            scale: self.scale.unwrap_or(defaults.scale),
            cfg_rescale: self.cfg_rescale.unwrap_or(defaults.cfg_rescale),
            sampler: self.sampler.clone().unwrap_or(defaults.sampler),
            noise_schedule: self.noise_schedule.clone().unwrap_or(defaults.noise_schedule),
            smea: self.smea,
            smea_dyn: self.smea_dyn,
            auto_smea: !self.no_auto_smea,
            out_dir: self.out.clone(),
        }
    }
}

#[derive(Debug, clap::Args)]
struct GenerateArgs {
    #[command(flatten)]
    flags: GenerationFlags,
    /// Precise reference image; mutually exclusive with --vibe.
    #[arg(long)]
    reference_image: Option<PathBuf>,
    #[arg(long)]
    reference_description: Option<String>,
    #[arg(long, default_value_t = 1.0, value_parser = finite_f64)]
    reference_info: f64,
    #[arg(long, default_value_t = 0.6, value_parser = finite_f64)]
    reference_strength: f64,
    /// Fidelity toward the reference, 1 = strongest.
    #[arg(long, default_value_t = 1.0, value_parser = finite_f64)]
    reference_fidelity: f64,
    /// Vibe image; repeatable, up to 16.
    #[arg(long)]
    vibe: Vec<PathBuf>,
    /// Per-vibe strength, matched positionally; missing entries default.
    #[arg(long, value_parser = finite_f64)]
    vibe_strength: Vec<f64>,
    /// Per-vibe information-extracted, matched positionally.
    #[arg(long, value_parser = finite_f64)]
    vibe_info: Vec<f64>,
}

#[derive(Debug, clap::Args)]
struct EnhanceArgs {
    #[command(flatten)]
    flags: GenerationFlags,
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value_t = 1.0, value_parser = finite_f64)]
    magnitude: f64,
    #[arg(long, value_parser = finite_f64)]
    strength: Option<f64>,
    #[arg(long, value_parser = finite_f64)]
    noise: Option<f64>,
    #[arg(long, default_value_t = 1)]
    upscale: u32,
}

#[derive(Debug, clap::Args)]
struct InpaintArgs {
    #[command(flatten)]
    flags: GenerationFlags,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    mask: PathBuf,
    #[arg(long, default_value_t = 0.7, value_parser = finite_f64)]
    strength: f64,
}

#[derive(Debug, clap::Args)]
struct MaskArgs {
    #[arg(long, default_value_t = 832)]
    width: u32,
    #[arg(long, default_value_t = 1216)]
    height: u32,
    /// Rectangle as X,Y,WxH; repeatable. No rectangles means all white.
    #[arg(long)]
    rect: Vec<String>,
    #[arg(long)]
    invert: bool,
    #[arg(long, default_value = "output")]
    out: PathBuf,
}

#[derive(Debug, clap::Args)]
struct DetectArgs {
    #[arg(long)]
    image: PathBuf,
    /// Natural-language description of what to find.
    #[arg(long)]
    find: String,
    /// Also synthesize a mask covering the detected regions.
    #[arg(long)]
    mask_out: bool,
    #[arg(long)]
    invert: bool,
    #[arg(long, default_value = "output")]
    out: PathBuf,
}

#[derive(Debug, clap::Args)]
struct UpscaleArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value_t = 4)]
    scale: u32,
    #[arg(long, default_value = "output")]
    out: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ToolKind {
    Declutter,
    Lineart,
    Colorize,
}

#[derive(Debug, clap::Args)]
struct ToolArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, value_enum)]
    kind: ToolKind,
    /// Colorize only: guidance prompt.
    #[arg(long)]
    prompt: Option<String>,
    /// Colorize only: intensity level.
    #[arg(long, default_value_t = 0)]
    defry: u32,
    /// Declutter only: noise-reduction level.
    #[arg(long, default_value_t = 0)]
    level: u32,
    #[arg(long, default_value = "output")]
    out: PathBuf,
}

fn main() {
    init_tracing();
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("lumen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Enhance(args) => run_enhance(args),
        Command::Inpaint(args) => run_inpaint(args),
        Command::Mask(args) => run_mask(args),
        Command::Detect(args) => run_detect(args),
        Command::Upscale(args) => run_upscale(args),
        Command::Tool(args) => run_tool(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    if args.reference_image.is_some() && !args.vibe.is_empty() {
        bail!("--reference-image and --vibe are mutually exclusive");
    }
    if args.vibe.len() > MAX_VIBE_REFERENCES {
        bail!("at most {MAX_VIBE_REFERENCES} vibe images are supported");
    }
    let options = args.flags.to_options();
    review_prompt(&options.prompt);
    let config = Config::from_env()?;
    let client = TransportClient::new(&config);

    let (payload, role) = if !args.vibe.is_empty() {
        let mut vibes = Vec::with_capacity(args.vibe.len());
        for (index, path) in args.vibe.iter().enumerate() {
            vibes.push(VibeReference {
                image: normalize_to_canvas(path)?,
                strength: args.vibe_strength.get(index).copied(),
                information_extracted: args.vibe_info.get(index).copied(),
            });
        }
        (vibe_payload(&options, &vibes)?, "vibe")
    } else if let Some(path) = args.reference_image.as_ref() {
        let reference = PreciseReference {
            image: normalize_to_canvas(path)?,
            description: args.reference_description.clone(),
            information_extracted: args.reference_info,
            strength: args.reference_strength,
            fidelity: args.reference_fidelity,
        };
        (generate_payload(&options, &[reference])?, "generate")
    } else {
        (generate_payload(&options, &[])?, "generate")
    };

    let image = client.generate_image(&payload)?;
    let path = write_artifact(&options.out_dir, role, &image)?;
    println!("{}", path.display());
    Ok(())
}

fn run_enhance(args: EnhanceArgs) -> Result<()> {
    let options = args.flags.to_options();
    review_prompt(&options.prompt);
    let config = Config::from_env()?;
    let client = TransportClient::new(&config);

    let source = load_image(&args.image)?;
    let settings = EnhanceSettings {
        magnitude: args.magnitude,
        strength: args.strength,
        noise: args.noise,
        upscale: args.upscale.max(1),
    };
    let payload = enhance_payload(&options, &source, &settings)?;
    let image = client.generate_image(&payload)?;
    let path = write_artifact(&options.out_dir, "enhance", &image)?;
    println!("{}", path.display());
    Ok(())
}

fn run_inpaint(args: InpaintArgs) -> Result<()> {
    let options = args.flags.to_options();
    review_prompt(&options.prompt);
    let config = Config::from_env()?;
    let client = TransportClient::new(&config);

    let source = load_image(&args.image)?;
    let mask_image = load_image(&args.mask)?;
    let payload = inpaint_payload(&options, &source, &mask_image.bytes, args.strength)?;
    let image = client.generate_image(&payload)?;
    let path = write_artifact(&options.out_dir, "inpaint", &image)?;
    println!("{}", path.display());
    Ok(())
}

fn run_mask(args: MaskArgs) -> Result<()> {
    let rects = parse_rects(&args.rect)?;
    let synthesized = mask::synthesize(args.width, args.height, &rects, args.invert);
    let bytes = mask::encode(&synthesized)?;
    let path = write_artifact(&args.out, "mask", &bytes)?;
    println!("{}", path.display());
    Ok(())
}

fn run_detect(args: DetectArgs) -> Result<()> {
    let config = Config::from_env()?;
    let vision = VisionClient::new(&config)?;
    let source = load_image(&args.image)?;

    let detections = vision.detect(&source, &args.find)?;
    let rects = translate(&detections, source.width, source.height);
    println!("{}", serde_json::to_string_pretty(&rects)?);
    if rects.is_empty() {
        warn!("no usable detections for '{}'", args.find);
    }

    if args.mask_out {
        let synthesized = mask::synthesize(source.width, source.height, &rects, args.invert);
        let bytes = mask::encode(&synthesized)?;
        let path = write_artifact(&args.out, "mask", &bytes)?;
        println!("{}", path.display());
    }
    Ok(())
}

fn run_upscale(args: UpscaleArgs) -> Result<()> {
    let config = Config::from_env()?;
    let client = TransportClient::new(&config);
    let source = load_image(&args.image)?;
    let payload = postprocess_payload(&source, &PostprocessTool::Upscale { scale: args.scale })?;
    let image = client.augment_image(&payload)?;
    let path = write_artifact(&args.out, "upscale", &image)?;
    println!("{}", path.display());
    Ok(())
}

fn run_tool(args: ToolArgs) -> Result<()> {
    let tool = match args.kind {
        ToolKind::Declutter => PostprocessTool::Declutter { level: args.level },
        ToolKind::Lineart => PostprocessTool::LineArt,
        ToolKind::Colorize => PostprocessTool::Colorize {
            prompt: args
                .prompt
                .clone()
                .context("--prompt is required for colorize")?,
            defry: args.defry,
        },
    };
    let config = Config::from_env()?;
    let client = TransportClient::new(&config);
    let source = load_image(&args.image)?;
    let payload = postprocess_payload(&source, &tool)?;
    let image = client.augment_image(&payload)?;
    let path = write_artifact(&args.out, tool.req_type(), &image)?;
    println!("{}", path.display());
    Ok(())
}

fn parse_rects(raw: &[String]) -> Result<Vec<RegionRect>> {
    raw.iter()
        .map(|spec| RegionRect::parse(spec).map_err(anyhow::Error::from))
        .collect()
}

fn review_prompt(prompt: &str) {
    for finding in prompt::review(prompt) {
        warn!("prompt quality: {finding}");
    }
}

fn finite_f64(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{raw}' is not finite"));
    }
    Ok(value)
}
