mod session;

use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use restyle_contracts::batch::{Batch, ItemStatus};
use restyle_contracts::catalog::Catalog;
use restyle_contracts::commands::{parse_command, StudioCommand, STUDIO_HELP_COMMANDS};
use restyle_contracts::notices::Notice;
use restyle_contracts::usage::{UsageLimiter, UsageStore};
use restyle_engine::{
    crop, download, to_data_uri, AspectRatio, StartError, StudioUpdate, EXPORT_RATIOS,
};

use crate::session::{open_studio, open_usage, CliStudio, SessionOptions};

#[derive(Debug, Parser)]
#[command(name = "restyle", version, about = "AI interior redesign from a room photo")]
struct Cli {
    /// Directory holding persisted usage (defaults to `$HOME/.restyle`).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate three variants for one photo and save the successful ones.
    Generate(GenerateArgs),
    /// Interactive session driven by slash commands.
    Studio(StudioArgs),
    /// Center-crop an image file to an aspect ratio.
    Crop(CropArgs),
    /// Show remaining free generations.
    Usage,
    /// List room types and design styles.
    Catalog,
}

#[derive(Debug, Parser)]
struct ModelArgs {
    #[arg(long)]
    primary_model: Option<String>,
    #[arg(long)]
    fallback_model: Option<String>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    room: String,
    #[arg(long)]
    style: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "4:3")]
    ratio: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct StudioArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct CropArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    ratio: String,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("restyle error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let state_dir = cli.state_dir.as_deref();
    match cli.command {
        Command::Generate(args) => run_generate(args, state_dir),
        Command::Studio(args) => {
            run_studio(args, state_dir)?;
            Ok(0)
        }
        Command::Crop(args) => run_crop(args),
        Command::Usage => run_usage(state_dir),
        Command::Catalog => {
            print_catalog(&Catalog::default());
            Ok(0)
        }
    }
}

fn session_options<'a>(
    out: &'a Path,
    events: Option<&'a Path>,
    state_dir: Option<&'a Path>,
    models: &'a ModelArgs,
) -> SessionOptions<'a> {
    SessionOptions {
        out,
        events,
        state_dir,
        primary_model: models.primary_model.as_deref(),
        fallback_model: models.fallback_model.as_deref(),
    }
}

fn run_generate(args: GenerateArgs, state_dir: Option<&Path>) -> Result<i32> {
    let ratio = supported_ratio(&args.ratio)?;
    let mut studio = open_studio(&session_options(
        &args.out,
        args.events.as_deref(),
        state_dir,
        &args.models,
    ))?;

    let loaded = studio.load_image(&args.image).map(|_| ());
    flush_notices(&mut studio);
    loaded?;
    let selected = studio
        .select_room(&args.room)
        .and_then(|_| studio.select_style(&args.style));
    flush_notices(&mut studio);
    selected?;

    let report = studio.generate_with(print_update);
    flush_notices(&mut studio);
    let report = report?;

    let mut saved = 0;
    for index in successful_indices(studio.batch()) {
        match studio.export_item(index, ratio, &args.out) {
            Ok(path) => {
                saved += 1;
                println!("Saved {}", path.display());
            }
            Err(err) => eprintln!("Variant {} not saved: {err:#}", index + 1),
        }
        studio.take_notices();
    }
    println!(
        "{} of {} variants saved. Generations remaining: {}",
        saved,
        report.succeeded + report.failed,
        report.remaining
    );
    Ok(if saved > 0 { 0 } else { 1 })
}

fn run_studio(args: StudioArgs, state_dir: Option<&Path>) -> Result<()> {
    let mut studio = open_studio(&session_options(
        &args.out,
        args.events.as_deref(),
        state_dir,
        &args.models,
    ))?;

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Restyle studio started. Type /help for commands.");

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

        let input = line.trim_end_matches(['\n', '\r']);
        match parse_command(input) {
            StudioCommand::Noop => continue,
            StudioCommand::Help => {
                println!("Commands: {}", STUDIO_HELP_COMMANDS.join(" "));
            }
            StudioCommand::LoadImage { path } => {
                if path.is_empty() {
                    println!("/load requires a path");
                } else if let Ok(image) = studio.load_image(Path::new(&path)) {
                    println!("Loaded {path} ({}x{})", image.width, image.height);
                }
            }
            StudioCommand::SelectRoom { key } => {
                if key.is_empty() {
                    print_rooms(studio.catalog());
                } else if let Ok(room) = studio.select_room(&key) {
                    println!("Room set to {}", room.name);
                }
            }
            StudioCommand::SelectStyle { key } => {
                if key.is_empty() {
                    print_styles(studio.catalog());
                } else if let Ok(style) = studio.select_style(&key) {
                    println!("Style set to {}", style.name);
                }
            }
            StudioCommand::Generate => {
                if let Ok(report) = studio.generate_with(print_update) {
                    if report.cancelled {
                        println!("Generation cancelled.");
                    }
                    if let Some(batch) = studio.batch() {
                        print_batch(batch);
                    }
                }
            }
            StudioCommand::Regenerate { variant } => match variant_index(variant) {
                Some(index) => {
                    let result = studio.regenerate_with(index, print_update);
                    println!("{}", regeneration_line(index, &result));
                }
                None => println!("/regen requires a variant number (1-3)"),
            },
            StudioCommand::Save { variant, ratio } => {
                let Some(index) = variant_index(variant) else {
                    println!("/save requires a variant number (1-3)");
                    continue;
                };
                let ratio = ratio.unwrap_or_else(|| EXPORT_RATIOS[0].to_string());
                match supported_ratio(&ratio) {
                    Ok(ratio) => {
                        if let Err(err) = studio.export_item(index, ratio, &args.out) {
                            eprintln!("Save failed: {err:#}");
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            StudioCommand::Status => print_status(&studio),
            StudioCommand::Usage => print_usage(studio.usage()),
            StudioCommand::Catalog => print_catalog(studio.catalog()),
            StudioCommand::Reset => {
                studio.reset();
                println!("Studio reset.");
            }
            StudioCommand::Quit => break,
            StudioCommand::Unknown { command, .. } => {
                if command.is_empty() {
                    println!("Commands start with '/'. Type /help for commands.");
                } else {
                    println!("Unknown command: /{command}. Type /help for commands.");
                }
            }
        }
        flush_notices(&mut studio);
    }

    Ok(())
}

fn run_crop(args: CropArgs) -> Result<i32> {
    if AspectRatio::parse(&args.ratio).is_none() {
        bail!("invalid ratio '{}' (expected W:H, e.g. 4:3)", args.ratio);
    }
    let source = to_data_uri(&args.image)?;
    let cropped = crop(&source, &args.ratio);
    let dir = args
        .out
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let Some(filename) = args.out.file_name().and_then(|name| name.to_str()) else {
        bail!("--out must name a file: {}", args.out.display());
    };
    let path = download(&cropped, dir, filename)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("Cropped to {} -> {}", args.ratio, path.display());
    Ok(0)
}

fn run_usage(state_dir: Option<&Path>) -> Result<i32> {
    print_usage(&open_usage(state_dir)?);
    Ok(0)
}

fn regeneration_line(index: usize, result: &Result<ItemStatus, StartError>) -> String {
    let variant = index + 1;
    match result {
        Ok(ItemStatus::Success) => format!("Variant {variant} regenerated."),
        Ok(ItemStatus::Failed) => format!("Variant {variant} failed again; try /regen {variant}."),
        Ok(ItemStatus::Pending) => format!("Variant {variant} is still pending."),
        Err(err) => format!("Variant {variant} not regenerated: {err}"),
    }
}

fn supported_ratio(raw: &str) -> Result<&'static str> {
    let trimmed = raw.trim();
    match EXPORT_RATIOS.iter().copied().find(|ratio| *ratio == trimmed) {
        Some(ratio) => Ok(ratio),
        None => bail!(
            "unsupported ratio '{trimmed}' (choose one of {})",
            EXPORT_RATIOS.join(", ")
        ),
    }
}

/// Converts a 1-based variant number into a slot index.
fn variant_index(variant: Option<usize>) -> Option<usize> {
    variant.filter(|value| *value >= 1).map(|value| value - 1)
}

fn successful_indices(batch: Option<&Batch>) -> Vec<usize> {
    batch
        .map(|batch| {
            batch
                .items()
                .iter()
                .enumerate()
                .filter(|(_, item)| item.status == ItemStatus::Success)
                .map(|(index, _)| index)
                .collect()
        })
        .unwrap_or_default()
}

fn print_update(update: &StudioUpdate) {
    match update {
        StudioUpdate::BatchStarted { labels, .. } => {
            println!("Generating {} variants...", labels.len());
            for (index, label) in labels.iter().enumerate() {
                println!("  {}. {label} [pending]", index + 1);
            }
        }
        StudioUpdate::ItemReopened { index } => {
            println!("Regenerating variant {}...", index + 1);
        }
        StudioUpdate::ItemSettled {
            index,
            status,
            progress,
        } => {
            println!(
                "  variant {} {} ({:.0}%)",
                index + 1,
                status.as_str(),
                progress
            );
        }
    }
}

fn print_batch(batch: &Batch) {
    for (index, item) in batch.items().iter().enumerate() {
        println!("  {}. {} [{}]", index + 1, item.id, item.status.as_str());
    }
}

fn print_status(studio: &CliStudio) {
    match studio.uploaded() {
        Some(image) => println!(
            "Photo: {}x{} (aspect {:.2})",
            image.width,
            image.height,
            studio.card_aspect_ratio()
        ),
        None => println!("Photo: none"),
    }
    println!(
        "Room: {}",
        studio.room().map(|room| room.name).unwrap_or("none")
    );
    println!(
        "Style: {}",
        studio.style().map(|style| style.name).unwrap_or("none")
    );
    match studio.batch() {
        Some(batch) => {
            println!("Batch {} ({:.0}% settled):", batch.generation(), studio.progress());
            print_batch(batch);
        }
        None => println!("Batch: none"),
    }
    println!(
        "Ready to generate: {}",
        if studio.can_generate() { "yes" } else { "no" }
    );
}

fn print_usage<S: UsageStore>(usage: &UsageLimiter<S>) {
    println!(
        "Generations remaining: {} of {}",
        usage.remaining(),
        usage.max()
    );
}

fn print_rooms(catalog: &Catalog) {
    println!("Rooms:");
    for room in catalog.rooms() {
        println!("  {:<12} {:<12} {}", room.key, room.name, room.description);
    }
}

fn print_styles(catalog: &Catalog) {
    println!("Styles:");
    for style in catalog.styles() {
        println!("  {:<12} {:<12} {}", style.key, style.name, style.description);
    }
}

fn print_catalog(catalog: &Catalog) {
    print_rooms(catalog);
    print_styles(catalog);
}

fn flush_notices(studio: &mut CliStudio) {
    for notice in studio.take_notices() {
        print_notice(&notice);
    }
}

fn print_notice(notice: &Notice) {
    if notice.is_destructive() {
        eprintln!("! {}: {}", notice.title, notice.description);
    } else {
        println!("* {}: {}", notice.title, notice.description);
    }
}
