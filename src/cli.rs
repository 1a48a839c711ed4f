use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use opscanvas::serve::{ServeArgs, run_serve};
use opscanvas::{
    Canvas, CanvasCommand, CanvasConfig, EditorState, Frame, GeminiSuggester, LayoutSuggester,
    PointerEvent, Size, Topology, TopologyAnalyzer, render_png, render_svg,
};

const DEFAULT_NEW_TOPOLOGY_NAME: &str = "topology.json";

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

/// Viewport and config flags shared by commands that build a frame.
#[derive(Debug, Clone, clap::Args)]
struct CanvasArgs {
    /// Viewport width in pixels (defaults to the config value).
    #[arg(long = "width")]
    width: Option<f32>,

    /// Viewport height in pixels (defaults to the config value).
    #[arg(long = "height")]
    height: Option<f32>,

    /// Canvas config file (JSON). Falls back to the user config directory.
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

impl CanvasArgs {
    fn load_config(&self) -> Result<CanvasConfig> {
        let mut config = CanvasConfig::load(self.config.as_deref())?;
        if let Some(width) = self.width {
            config.viewport_width = width;
        }
        if let Some(height) = self.height {
            config.viewport_height = height;
        }
        if config.viewport_width <= 0.0 || config.viewport_height <= 0.0 {
            bail!("viewport size must be greater than zero");
        }
        Ok(config)
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "opscanvas",
    about = "Render and inspect service-topology canvases."
)]
pub struct RenderArgs {
    /// Path to the input topology JSON. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Convenience flag to force PNG output without specifying --output-format.
    #[arg(long = "png", action = ArgAction::SetTrue, conflicts_with = "output_format")]
    png: bool,

    /// Scale factor when rasterizing PNG output.
    #[arg(long = "scale", default_value_t = 2.0)]
    scale: f32,

    /// Background color for the rendered canvas.
    #[arg(short = 'b', long = "background-color", default_value = "white")]
    background_color: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    #[command(flatten)]
    canvas: CanvasArgs,
}

#[derive(Debug, Parser)]
#[command(
    name = "opscanvas inspect",
    about = "Print anchors, edge offsets, content bounds and scrollbar metrics as JSON."
)]
pub struct InspectArgs {
    /// Path to the input topology JSON. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Where to write the JSON report (defaults to stdout).
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    #[command(flatten)]
    canvas: CanvasArgs,
}

#[derive(Debug, Parser)]
#[command(
    name = "opscanvas replay",
    about = "Replay a scripted pointer-event sequence against a topology."
)]
pub struct ReplayArgs {
    /// Path to the input topology JSON. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Event script: {"state": {...}, "events": [...]}.
    #[arg(long = "events")]
    events: PathBuf,

    /// Where to write the resulting topology (defaults to stdout).
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    #[command(flatten)]
    canvas: CanvasArgs,
}

#[derive(Debug, Parser)]
#[command(name = "opscanvas new", about = "Write the starter topology to a new file.")]
pub struct NewArgs {
    /// Destination path; a numeric suffix is added if it already exists.
    #[arg(default_value = DEFAULT_NEW_TOPOLOGY_NAME)]
    path: PathBuf,
}

#[derive(Debug, Parser)]
#[command(
    name = "opscanvas suggest",
    about = "Ask Gemini for a topology matching a text description."
)]
pub struct SuggestArgs {
    /// Free-text description of the system to lay out.
    description: String,

    /// Where to write the suggested topology.
    #[arg(short = 'o', long = "output", default_value = DEFAULT_NEW_TOPOLOGY_NAME)]
    output: String,

    /// Gemini API key (defaults to GEMINI_API_KEY).
    #[arg(long = "api-key")]
    api_key: Option<String>,

    /// Gemini model name.
    #[arg(long = "model")]
    model: Option<String>,
}

#[derive(Debug, Parser)]
#[command(
    name = "opscanvas analyze",
    about = "Ask Gemini for a health score and findings for a topology."
)]
pub struct AnalyzeArgs {
    /// Path to the input topology JSON. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Where to write the JSON report (defaults to stdout).
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Gemini API key (defaults to GEMINI_API_KEY).
    #[arg(long = "api-key")]
    api_key: Option<String>,

    /// Gemini model name.
    #[arg(long = "model")]
    model: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "svg" => Some(OutputFormat::Svg),
            Some(ext) if ext == "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    state: EditorState,
    events: Vec<PointerEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Inspection {
    frame: Frame,
    dangling_connections: Vec<String>,
}

fn ensure_unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "topology".to_string());
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(String::from);

    let mut counter = 1;
    loop {
        let mut candidate = path.clone();
        let name = match &extension {
            Some(ext) => format!("{stem}{counter}.{ext}"),
            None => format!("{stem}{counter}"),
        };
        candidate.set_file_name(&name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn subcommand_args(args: &[String]) -> impl Iterator<Item = String> + '_ {
    args.first()
        .cloned()
        .into_iter()
        .chain(args.iter().skip(2).cloned())
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => run_serve(ServeArgs::parse_from(subcommand_args(&args))).await,
        Some("render") => run_render(RenderArgs::parse_from(subcommand_args(&args))),
        Some("inspect") => run_inspect(InspectArgs::parse_from(subcommand_args(&args))),
        Some("replay") => run_replay(ReplayArgs::parse_from(subcommand_args(&args))),
        Some("new") => run_new(NewArgs::parse_from(subcommand_args(&args))),
        Some("suggest") => run_suggest(SuggestArgs::parse_from(subcommand_args(&args))).await,
        Some("analyze") => run_analyze(AnalyzeArgs::parse_from(subcommand_args(&args))).await,
        _ => run_render(RenderArgs::parse_from(args)),
    }
}

fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let format_preference = if cli.png {
        Some(OutputFormat::Png)
    } else {
        cli.output_format
    };

    let output_dest = parse_output(cli.output.as_deref(), &input_source, format_preference)?;
    let format = determine_format(format_preference, &output_dest)?;

    if format == OutputFormat::Png && cli.scale <= 0.0 {
        bail!("--scale must be greater than zero for PNG output");
    }

    let topology = load_topology(&input_source)?;
    let config = cli.canvas.load_config()?;
    let thickness = config.scrollbar_thickness;
    let frame = Canvas::new(config).frame(&topology);
    let state = EditorState::new();

    let output_bytes = match format {
        OutputFormat::Svg => render_svg(&topology, &frame, &state, &cli.background_color, thickness)?
            .into_bytes(),
        OutputFormat::Png => render_png(
            &topology,
            &frame,
            &state,
            &cli.background_color,
            thickness,
            cli.scale,
        )?,
    };

    write_output(output_dest, &output_bytes, cli.quiet, "Rendered canvas")
}

fn run_inspect(cli: InspectArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let topology = load_topology(&input_source)?;
    let canvas = Canvas::new(cli.canvas.load_config()?);

    let dangling_connections = topology
        .connections
        .iter()
        .filter(|connection| {
            !topology.contains_element(&connection.source_id)
                || !topology.contains_element(&connection.target_id)
        })
        .map(|connection| connection.id.clone())
        .collect();

    let report = Inspection {
        frame: canvas.frame(&topology),
        dangling_connections,
    };
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');

    let dest = match cli.output.as_deref() {
        None | Some("-") => OutputDestination::Stdout,
        Some(path) => OutputDestination::File(PathBuf::from(path)),
    };
    write_output(dest, json.as_bytes(), false, "Wrote inspection")
}

fn run_replay(cli: ReplayArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let mut topology = load_topology(&input_source)?;

    let script_raw = fs::read_to_string(&cli.events)
        .with_context(|| format!("failed to read '{}'", cli.events.display()))?;
    let script: ReplayScript = serde_json::from_str(&script_raw)
        .with_context(|| format!("invalid event script '{}'", cli.events.display()))?;

    let config = cli.canvas.load_config()?;
    let viewport = Size::new(config.viewport_width, config.viewport_height);
    let mut canvas = Canvas::new(config);
    canvas.resize(viewport, &topology);
    let mut state = script.state;

    let total = script.events.len();
    let mut moves = 0usize;
    let mut pans = 0usize;
    for event in script.events {
        match canvas.handle(event, &mut state, &mut topology) {
            Some(CanvasCommand::Pan(_)) => pans += 1,
            Some(_) => moves += 1,
            None => {}
        }
    }
    debug!(total, moves, pans, offset = ?canvas.viewport().offset, "replay finished");

    let mut json = topology.to_json()?;
    json.push('\n');
    let dest = match cli.output.as_deref() {
        None | Some("-") => OutputDestination::Stdout,
        Some(path) => OutputDestination::File(PathBuf::from(path)),
    };
    if !cli.quiet && matches!(dest, OutputDestination::File(_)) {
        println!("Replayed {total} events ({moves} edits, {pans} pans)");
    }
    write_output(dest, json.as_bytes(), cli.quiet, "Wrote topology")
}

fn run_new(cli: NewArgs) -> Result<()> {
    let path = ensure_unique_path(cli.path);
    Topology::sample()
        .save(&path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

fn resolve_api_key(flag: Option<String>) -> Result<String> {
    flag.or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| anyhow!("No API key provided. Set GEMINI_API_KEY or use --api-key"))
}

async fn run_suggest(cli: SuggestArgs) -> Result<()> {
    let api_key = resolve_api_key(cli.api_key)?;

    let suggester = GeminiSuggester::new(api_key, cli.model);
    let suggestion = suggester
        .suggest(&cli.description)
        .await
        .context("layout suggestion failed")?;
    let topology = Topology::from_suggestion(&suggestion)?;

    let mut json = topology.to_json()?;
    json.push('\n');
    let dest = match cli.output.as_str() {
        "-" => OutputDestination::Stdout,
        path => OutputDestination::File(ensure_unique_path(PathBuf::from(path))),
    };
    write_output(dest, json.as_bytes(), false, "Suggested topology")
}

async fn run_analyze(cli: AnalyzeArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let topology = load_topology(&input_source)?;
    let api_key = resolve_api_key(cli.api_key)?;

    let analysis = GeminiSuggester::new(api_key, cli.model)
        .analyze(&topology)
        .await
        .context("topology analysis failed")?;

    let mut json = serde_json::to_string_pretty(&analysis)?;
    json.push('\n');
    let dest = match cli.output.as_deref() {
        None | Some("-") => OutputDestination::Stdout,
        Some(path) => OutputDestination::File(PathBuf::from(path)),
    };
    if matches!(dest, OutputDestination::File(_)) {
        println!("Health score: {}%", analysis.score);
    }
    write_output(dest, json.as_bytes(), false, "Wrote analysis")
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    format_hint: Option<OutputFormat>,
) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => {
            let ext = format_hint.unwrap_or(OutputFormat::Svg).extension();
            match input {
                InputSource::File(path) => {
                    let mut default_path = path.to_path_buf();
                    default_path.set_extension(ext);
                    Ok(OutputDestination::File(default_path))
                }
                InputSource::Stdin => Ok(OutputDestination::File(PathBuf::from(format!("out.{ext}")))),
            }
        }
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    if let Some(fmt) = preference {
        return Ok(fmt);
    }

    match output {
        OutputDestination::Stdout => Ok(OutputFormat::Svg),
        OutputDestination::File(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unable to determine output format from '{}'; please specify --output-format",
                path.display()
            )
        }),
    }
}

fn load_topology(source: &InputSource) -> Result<Topology> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                bail!("no topology supplied on stdin");
            }
            Topology::from_json(&buffer).context("failed to parse topology from stdin")
        }
        InputSource::File(path) => {
            Topology::load(path).with_context(|| format!("failed to load '{}'", path.display()))
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool, what: &str) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("{what} -> {}", path.display());
            }
        }
    }
    Ok(())
}
