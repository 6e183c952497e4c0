use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use promptstudio_contracts::chat::{help_rows, parse_command, CompileView, StudioCommand};
use promptstudio_contracts::events::EventWriter;
use promptstudio_contracts::photography::PhotographyMode;
use promptstudio_contracts::prompt::{FieldKey, Provenance};
use promptstudio_contracts::scenes::{
    is_editable, visible_fields, Preset, PresetKind, SceneDefinition, SceneRegistry, UserMode,
};
use promptstudio_engine::compiler::{diff_compiled, DiffTag};
use promptstudio_engine::gateway::decode_data_url;
use promptstudio_engine::{
    gateway_from_config, Gateway, GenerationMode, PhotoStudio, StudioConfig, StudioEngine,
    StudioResult,
};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "promptstudio", version, about = "Scene-aware prompt builder and compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List scenes.
    Scenes(ScenesArgs),
    /// List presets.
    Presets(PresetsArgs),
    /// Show the fields a mode can see.
    Fields(FieldsArgs),
    /// Print the compiled prompt.
    Compile(PromptArgs),
    /// Compile, optimize, and show what changed.
    Optimize(OptimizeArgs),
    /// Render an image from the compiled prompt.
    Render(RenderArgs),
    /// Shoot one frame of a photography session.
    Shoot(ShootArgs),
    /// Interactive studio.
    Studio(StudioArgs),
}

#[derive(Debug, Args)]
struct ScenesArgs {
    /// Hide scenes that are not open yet.
    #[arg(long)]
    available: bool,
}

#[derive(Debug, Args)]
struct PresetsArgs {
    #[arg(long)]
    scene: Option<String>,
}

#[derive(Debug, Args)]
struct FieldsArgs {
    #[arg(long)]
    scene: String,
    #[arg(long, default_value = "beginner")]
    mode: UserMode,
}

#[derive(Debug, Args)]
struct PromptArgs {
    #[arg(long)]
    scene: Option<String>,
    #[arg(long)]
    preset: Option<String>,
    #[arg(long)]
    mode: Option<UserMode>,
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    set: Vec<(FieldKey, String)>,
    #[arg(long = "weight", value_name = "KEY=PCT", value_parser = parse_weight)]
    weight: Vec<(FieldKey, u32)>,
}

#[derive(Debug, Args)]
struct GatewayArgs {
    /// Call the live model instead of the simulated backend.
    #[arg(long)]
    live: bool,
    /// Append session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct OptimizeArgs {
    #[command(flatten)]
    prompt: PromptArgs,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[command(flatten)]
    prompt: PromptArgs,
    #[command(flatten)]
    gateway: GatewayArgs,
    /// Optimize before rendering.
    #[arg(long)]
    optimize: bool,
    /// Write an inline image to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ShootArgs {
    #[arg(long)]
    session: String,
    #[arg(long)]
    shot: Option<String>,
    #[arg(long, requires = "reference")]
    portrait: bool,
    #[arg(long)]
    reference: Option<PathBuf>,
    #[command(flatten)]
    gateway: GatewayArgs,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StudioArgs {
    #[arg(long)]
    scene: Option<String>,
    #[arg(long)]
    mode: Option<UserMode>,
    #[command(flatten)]
    gateway: GatewayArgs,
}

fn parse_assignment(raw: &str) -> Result<(FieldKey, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    Ok((key.parse::<FieldKey>()?, value.to_string()))
}

fn parse_weight(raw: &str) -> Result<(FieldKey, u32), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=PCT, got '{raw}'"))?;
    let percent = value
        .trim()
        .trim_end_matches('%')
        .parse::<u32>()
        .map_err(|_| format!("weight '{value}' is not a whole percentage"))?;
    Ok((key.parse::<FieldKey>()?, percent))
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("promptstudio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let registry = Arc::new(SceneRegistry::builtin().context("loading bundled scene data")?);
    match cli.command {
        Command::Scenes(args) => {
            run_scenes(&registry, &args);
            Ok(0)
        }
        Command::Presets(args) => run_presets(&registry, args),
        Command::Fields(args) => run_fields(&registry, args),
        Command::Compile(args) => run_compile(registry, args),
        Command::Optimize(args) => run_optimize(registry, args),
        Command::Render(args) => run_render(registry, args),
        Command::Shoot(args) => run_shoot(&registry, args),
        Command::Studio(args) => run_studio(registry, args),
    }
}

fn load_config(args: &GatewayArgs) -> Result<StudioConfig> {
    let mut config = StudioConfig::from_env()?;
    if args.live {
        config = config.with_generation(GenerationMode::Live);
    }
    if let Some(path) = args.events.as_ref() {
        config.events_path = Some(path.clone());
    }
    tracing::debug!(generation = %config.generation, model = %config.image_model, "configuration loaded");
    Ok(config)
}

fn build_engine(
    registry: Arc<SceneRegistry>,
    args: &PromptArgs,
    journal: Option<EventWriter>,
) -> Result<StudioEngine> {
    let mut engine = StudioEngine::new(registry)?;
    if let Some(journal) = journal {
        engine = engine.with_journal(journal);
    }
    if let Some(scene) = args.scene.as_deref() {
        engine.change_scene(scene)?;
    }
    if let Some(preset) = args.preset.as_deref() {
        engine.apply_preset(preset)?;
        if let Some(scene) = args.scene.as_deref() {
            if engine.scene().id != scene {
                bail!("preset '{preset}' belongs to scene '{}', not '{scene}'", engine.scene().id);
            }
        }
    }
    if let Some(mode) = args.mode {
        engine.set_mode(mode);
    }
    for (key, value) in &args.set {
        engine.set_field(*key, value.clone())?;
    }
    for (key, percent) in &args.weight {
        engine.set_weight(*key, *percent)?;
    }
    Ok(engine)
}

fn run_scenes(registry: &SceneRegistry, args: &ScenesArgs) {
    for scene in listed_scenes(registry, args.available) {
        let availability = if scene.is_available { "" } else { " (unavailable)" };
        println!(
            "{:<11} {} / {}  fields={}{availability}",
            scene.id,
            scene.name,
            scene.name_en,
            scene.fields.len()
        );
    }
}

fn listed_scenes(registry: &SceneRegistry, available_only: bool) -> Vec<&SceneDefinition> {
    if available_only {
        registry.available().collect()
    } else {
        registry.list().collect()
    }
}

fn run_presets(registry: &SceneRegistry, args: PresetsArgs) -> Result<i32> {
    if let Some(scene) = args.scene.as_deref() {
        if registry.get(scene).is_none() {
            bail!("unknown scene '{scene}'");
        }
    }
    let presets = registry
        .presets()
        .filter(|preset| args.scene.as_deref().map_or(true, |scene| preset.scene_id == scene));
    for preset in presets {
        println!("{}", preset_line(preset));
    }
    Ok(0)
}

fn preset_line(preset: &Preset) -> String {
    let likes = preset
        .likes
        .as_deref()
        .map(|likes| format!("  likes={likes}"))
        .unwrap_or_default();
    format!(
        "{:<18} {:<9} {:<10} {} by {}{likes}",
        preset.id,
        preset_kind_label(preset.kind),
        preset.scene_id,
        preset.title,
        preset.author
    )
}

fn preset_kind_label(kind: PresetKind) -> &'static str {
    match kind {
        PresetKind::Official => "official",
        PresetKind::Community => "community",
        PresetKind::Highlight => "highlight",
    }
}

fn run_fields(registry: &SceneRegistry, args: FieldsArgs) -> Result<i32> {
    let scene = registry
        .get(&args.scene)
        .with_context(|| format!("unknown scene '{}'", args.scene))?;
    println!("{} ({}) as {}", scene.name, scene.id, args.mode);
    for (key, schema) in visible_fields(scene, args.mode) {
        let access = if is_editable(schema, args.mode) { "edit" } else { "lock" };
        let required = if schema.is_required { " *" } else { "" };
        println!("  [{access}] {:<15} {}{required}", key.as_str(), schema.label);
        for option in &schema.options {
            let weight = option
                .default_weight
                .map(|weight| format!(" ({weight}%)"))
                .unwrap_or_default();
            println!("           - {}: {}{weight}", option.label, option.value);
        }
    }
    Ok(0)
}

fn print_missing(engine: &StudioEngine) -> bool {
    let missing = engine.missing_fields();
    if missing.is_empty() {
        return false;
    }
    let names = missing
        .iter()
        .map(|key| key.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    println!("missing required: {names}");
    true
}

fn run_compile(registry: Arc<SceneRegistry>, args: PromptArgs) -> Result<i32> {
    let engine = build_engine(registry, &args, None)?;
    println!("{}", engine.compile(CompileView::Base));
    Ok(if print_missing(&engine) { 2 } else { 0 })
}

fn journal_for(config: &StudioConfig) -> Option<EventWriter> {
    config
        .events_path
        .as_ref()
        .map(|path| EventWriter::for_new_session(path.clone()))
}

fn run_optimize(registry: Arc<SceneRegistry>, args: OptimizeArgs) -> Result<i32> {
    let config = load_config(&args.gateway)?;
    let gateway = gateway_from_config(&config)?;
    let mut engine = build_engine(registry, &args.prompt, journal_for(&config))?;
    if print_missing(&engine) {
        return Ok(2);
    }
    engine.optimize(&*gateway)?;
    print_optimize_report(&engine);
    Ok(0)
}

fn print_optimize_report(engine: &StudioEngine) {
    let base = engine.compile(CompileView::Base);
    let optimized = engine.compile(CompileView::Optimized);
    println!("base:      {base}");
    println!("optimized: {optimized}");
    if base == optimized {
        println!("(optimizer left the prompt unchanged)");
        return;
    }
    for line in diff_compiled(&base, &optimized) {
        let marker = match line.tag {
            DiffTag::Kept => ' ',
            DiffTag::Removed => '-',
            DiffTag::Added => '+',
        };
        println!("{marker} {}", line.entry);
    }
}

fn run_render(registry: Arc<SceneRegistry>, args: RenderArgs) -> Result<i32> {
    let config = load_config(&args.gateway)?;
    let gateway = gateway_from_config(&config)?;
    let mut engine = build_engine(registry, &args.prompt, journal_for(&config))?;
    if args.optimize {
        if print_missing(&engine) {
            return Ok(2);
        }
        engine.optimize(&*gateway)?;
    }
    let outcome = engine.render(&*gateway)?;
    if outcome.fell_back {
        println!("render failed; placeholder shown");
    }
    if let Some(id) = outcome.history_id.as_deref() {
        println!("history: {id}");
    }
    println!("{}", summarize_url(&outcome.url));
    if let Some(out) = args.out.as_deref() {
        write_image(&outcome.url, out)?;
    }
    Ok(if outcome.fell_back { 3 } else { 0 })
}

fn run_shoot(registry: &SceneRegistry, args: ShootArgs) -> Result<i32> {
    let config = load_config(&args.gateway)?;
    let gateway = gateway_from_config(&config)?;
    let mut studio = PhotoStudio::from_registry(registry)?;
    studio.select_session(&args.session)?;
    if let Some(shot) = args.shot.as_deref() {
        studio.select_shot(shot)?;
    }
    if let Some(reference) = args.reference.as_deref() {
        fs::metadata(reference)
            .with_context(|| format!("reading reference image {}", reference.display()))?;
        studio.upload_reference(reference.display().to_string())?;
    }
    if args.portrait {
        studio.set_mode(PhotographyMode::Portrait);
    }
    println!("{}", studio.compiled_prompt());
    let result = studio.shoot(&*gateway)?;
    if result.fell_back {
        println!("shoot failed; placeholder stored");
    }
    println!("{}: {}", result.key, summarize_url(&result.url));
    if let Some(out) = args.out.as_deref() {
        write_image(&result.url, out)?;
    }
    Ok(if result.fell_back { 3 } else { 0 })
}

fn summarize_url(url: &str) -> String {
    if url.starts_with("data:") {
        let mime = url
            .trim_start_matches("data:")
            .split(';')
            .next()
            .unwrap_or("application/octet-stream");
        return format!("<inline {mime}, {} chars>", url.len());
    }
    url.to_string()
}

fn write_image(url: &str, out: &Path) -> Result<()> {
    if !url.starts_with("data:") {
        bail!("image is hosted at {url}; only inline images can be written");
    }
    let (mime, bytes) = decode_data_url(url)?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {} ({mime}, {} bytes)", out.display(), bytes.len());
    Ok(())
}

fn run_studio(registry: Arc<SceneRegistry>, args: StudioArgs) -> Result<i32> {
    let config = load_config(&args.gateway)?;
    let gateway = gateway_from_config(&config)?;
    let mut engine = StudioEngine::new(registry)?;
    if let Some(journal) = journal_for(&config) {
        engine = engine.with_journal(journal);
    }
    if let Some(scene) = args.scene.as_deref() {
        engine.change_scene(scene)?;
    }
    if let Some(mode) = args.mode {
        engine.set_mode(mode);
    }

    println!(
        "PromptStudio ({} backend). Scene {}, {} mode. Type /help for commands.",
        config.generation,
        engine.scene().id,
        engine.mode()
    );

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        if command == StudioCommand::Quit {
            break;
        }
        if let Err(err) = handle_command(&mut engine, &*gateway, command) {
            println!("error: {err}");
        }
    }
    Ok(0)
}

fn handle_command(
    engine: &mut StudioEngine,
    gateway: &dyn Gateway,
    command: StudioCommand,
) -> StudioResult<()> {
    match command {
        StudioCommand::Noop | StudioCommand::Quit => {}
        StudioCommand::Scene(id) => {
            if engine.change_scene(&id)? {
                println!("Scene: {} ({})", engine.scene().name, engine.scene().id);
            } else {
                println!("Already on {id}");
            }
        }
        StudioCommand::Mode(mode) => {
            engine.set_mode(mode);
            println!("Mode: {mode}");
        }
        StudioCommand::Set { key, value } => {
            engine.set_field(key, value)?;
            println!("{key} set");
        }
        StudioCommand::Weight { key, percent } => {
            let stored = engine.set_weight(key, percent)?;
            println!("{key} weight {stored}%");
        }
        StudioCommand::Preset(id) => {
            engine.apply_preset(&id)?;
            println!(
                "Preset {id} applied on {} ({} mode)",
                engine.scene().id,
                engine.mode()
            );
        }
        StudioCommand::Revert(key) => {
            if engine.revert_field(key)? {
                println!("{key} reverted to preset");
            } else {
                println!("no preset value for {key}");
            }
        }
        StudioCommand::Reset => {
            engine.reset();
            println!("Entries cleared");
        }
        StudioCommand::Fields => print_field_views(engine),
        StudioCommand::Compile(view) => {
            println!("{}", engine.compile(view));
            print_missing(engine);
        }
        StudioCommand::Optimize => {
            engine.optimize(gateway)?;
            print_optimize_report(engine);
        }
        StudioCommand::Render => {
            let outcome = engine.render(gateway)?;
            if outcome.fell_back {
                println!("render failed; placeholder shown");
            }
            println!("{}", summarize_url(&outcome.url));
        }
        StudioCommand::History => {
            if engine.history().is_empty() {
                println!("No renders yet");
            }
            for item in engine.history().items() {
                println!(
                    "{}  {} fields  {}",
                    item.id,
                    item.data.len(),
                    summarize_url(&item.url)
                );
            }
        }
        StudioCommand::ClearHistory => {
            engine.clear_history();
            println!("History cleared");
        }
        StudioCommand::Restore(id) => {
            engine.restore_from_history(&id)?;
            println!("Restored {id}");
        }
        StudioCommand::Log => {
            for entry in engine.debug_log().entries() {
                let content = match &entry.content {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                println!("[{}] {:<8} {content}", entry.ts, entry.kind.as_str());
            }
        }
        StudioCommand::Help => {
            for (usage, summary) in help_rows() {
                println!("  {usage:<24} {summary}");
            }
        }
        StudioCommand::Invalid { command, reason } => println!("/{command}: {reason}"),
        StudioCommand::Unknown { command, .. } => {
            println!("Unknown command /{command}. Type /help for commands.")
        }
    }
    Ok(())
}

fn print_field_views(engine: &StudioEngine) {
    let expert = engine.mode() == UserMode::Expert;
    for view in engine.field_views() {
        let access = if view.editable { "edit" } else { "lock" };
        let required = if view.required { "*" } else { " " };
        let value = view
            .user_value
            .as_deref()
            .or(view.effective_value.as_deref())
            .unwrap_or("");
        let ghost = if view.ghost { " (default)" } else { "" };
        let provenance = match view.provenance {
            Provenance::Plain => String::new(),
            other => format!(" [{}]", other.label()),
        };
        let weight = if expert {
            format!(" {}%", view.weight)
        } else {
            String::new()
        };
        println!(
            "  [{access}]{required}{:<15} {}: {value}{ghost}{provenance}{weight}",
            view.key.as_str(),
            view.label
        );
    }
}
