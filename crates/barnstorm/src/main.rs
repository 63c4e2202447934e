use anyhow::{bail, Context, Result};
use barnstorm::api::{Backend, HttpBackend, Instrument, MidiFile, TaskId, TaskStatus};
use barnstorm::import::ArtifactImporter;
use barnstorm::mix::interior_alphas;
use barnstorm::project::{MidiProject, Project};
use barnstorm::requests::{clip_from_project, parse_chord_list};
use barnstorm::store::{NotificationLevel, StoreEvent, Task, TaskStore};
use barnstorm::{telemetry, ChordsRequest, MixSetRequest, Orchestrator, RefMidiRequest, TaskRequest};
use clap::{Args, Parser, Subcommand};
use notespan::try_select_bars;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stormconf::{ConfigSources, StormConfig};
use tokio::sync::broadcast;

/// Client for the MIDI generation backend
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file used in place of ./barnstorm.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding config and environment
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session and print its id
    Session,
    /// Generate from a chord progression
    Chords(ChordsArgs),
    /// Generate from chords plus a reference clip
    Ref(RefArgs),
    /// Interpolate between two reference clips
    Mix(MixArgs),
    /// Fetch a task once and print it
    Status { task_id: String },
    /// Save an artifact to a file
    Download {
        artifact_id: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Overwrite a bar range of a project track with an artifact
    Apply(ApplyArgs),
    /// Add an artifact to a project as a new track
    Import(ImportArgs),
    /// Print the effective configuration and where it came from
    Config {
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args, Debug)]
struct ProgressionArgs {
    /// Chords, one per bar: "Am F C G" or "Am,F,C,G"
    #[arg(long)]
    chords: String,

    /// Beats per chord, comma separated
    #[arg(long, value_delimiter = ',')]
    chord_beats: Option<Vec<u32>>,

    /// Bar count of the destination (defaults to the chord count)
    #[arg(long)]
    bars: Option<u32>,

    #[arg(long)]
    bpm: Option<f64>,

    /// Keep polling until the task finishes
    #[arg(long)]
    wait: bool,
}

#[derive(Args, Debug)]
struct ChordsArgs {
    #[command(flatten)]
    progression: ProgressionArgs,

    /// piano, guitar or bass
    #[arg(long)]
    inst: Option<Instrument>,

    /// Number of variations to generate
    #[arg(long)]
    n_midi: Option<u32>,
}

#[derive(Args, Debug)]
struct RefArgs {
    #[command(flatten)]
    progression: ProgressionArgs,

    /// Reference MIDI file
    #[arg(long, conflicts_with = "project")]
    midi: Option<PathBuf>,

    /// Take the reference from a bar range of this project instead
    #[arg(long, requires_all = ["from_tick", "to_tick"])]
    project: Option<PathBuf>,

    /// Project track to take the reference from
    #[arg(long, default_value = "0")]
    track: usize,

    #[arg(long)]
    from_tick: Option<u64>,

    #[arg(long)]
    to_tick: Option<u64>,

    #[arg(long)]
    inst: Option<Instrument>,
}

#[derive(Args, Debug)]
struct MixArgs {
    #[command(flatten)]
    progression: ProgressionArgs,

    /// Clip A as a MIDI file
    #[arg(long, required_unless_present = "project_a", conflicts_with = "project_a")]
    midi_a: Option<PathBuf>,

    /// Take A from a bar range of this project instead
    #[arg(long, requires_all = ["from_tick_a", "to_tick_a"])]
    project_a: Option<PathBuf>,

    #[arg(long, default_value = "0")]
    track_a: usize,

    #[arg(long)]
    from_tick_a: Option<u64>,

    #[arg(long)]
    to_tick_a: Option<u64>,

    /// Clip B as a MIDI file
    #[arg(long, required_unless_present = "project_b", conflicts_with = "project_b")]
    midi_b: Option<PathBuf>,

    /// Take B from a bar range of this project instead
    #[arg(long, requires_all = ["from_tick_b", "to_tick_b"])]
    project_b: Option<PathBuf>,

    #[arg(long, default_value = "0")]
    track_b: usize,

    #[arg(long)]
    from_tick_b: Option<u64>,

    #[arg(long)]
    to_tick_b: Option<u64>,

    /// Interpolation points, comma separated
    #[arg(long, value_delimiter = ',')]
    alphas: Option<Vec<f64>>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Project MIDI file
    #[arg(long)]
    project: PathBuf,

    #[arg(long)]
    artifact: String,

    /// Destination track index
    #[arg(long)]
    track: usize,

    /// Any tick in the first selected bar
    #[arg(long)]
    from_tick: u64,

    /// Any tick in the last selected bar
    #[arg(long)]
    to_tick: u64,

    /// Bar count the artifact was generated for (estimated when omitted)
    #[arg(long)]
    bars: Option<u32>,

    /// Where to save the result (defaults to overwriting --project)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[arg(long)]
    project: PathBuf,

    #[arg(long)]
    artifact: String,

    /// Name for the new track
    #[arg(long)]
    name: Option<String>,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = StormConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.clone();
    }

    let telemetry =
        telemetry::init(&config.telemetry).context("Failed to initialize telemetry")?;

    let backend: Arc<dyn Backend> =
        Arc::new(HttpBackend::new(&config.backend).context("Failed to build HTTP client")?);
    let store = TaskStore::new();
    let printer = tokio::spawn(print_notifications(store.subscribe()));
    let orchestrator = Orchestrator::new(backend.clone(), store.clone(), &config);

    tracing::info!(
        backend = %config.backend.base_url,
        otlp = telemetry.exporting(),
        "🎹 barnstorm starting"
    );

    let result = run(cli.command, &config, &sources, &orchestrator, backend, store).await;

    drop(orchestrator);
    printer.abort();
    if let Err(e) = &result {
        tracing::debug!(error = %e, "Command failed");
    }
    telemetry.shutdown();
    result
}

async fn run(
    command: Command,
    config: &StormConfig,
    sources: &ConfigSources,
    orchestrator: &Orchestrator,
    backend: Arc<dyn Backend>,
    store: TaskStore,
) -> Result<()> {
    match command {
        Command::Session => {
            let id = orchestrator.ensure_session().await?;
            println!("{id}");
        }
        Command::Chords(args) => {
            let wait = args.progression.wait;
            let request = ChordsRequest {
                chords: parse_chord_list(&args.progression.chords),
                chord_beats: args.progression.chord_beats,
                bars: args.progression.bars,
                bpm: args.progression.bpm,
                n_midi: args.n_midi,
                instrument: args.inst,
            };
            submit(orchestrator, TaskRequest::Chords(request), wait).await?;
        }
        Command::Ref(args) => {
            let wait = args.progression.wait;
            let source = ClipSource {
                midi: args.midi.as_deref(),
                project: args.project.as_deref(),
                track: args.track,
                from_tick: args.from_tick,
                to_tick: args.to_tick,
                filename: "ref_selection.mid",
            };
            let (ref_midi, selection_bars) = source.load().await?;
            let request = RefMidiRequest {
                chords: parse_chord_list(&args.progression.chords),
                chord_beats: args.progression.chord_beats,
                bars: args.progression.bars.or(selection_bars),
                bpm: args.progression.bpm,
                ref_midi,
                instrument: args.inst,
            };
            submit(orchestrator, TaskRequest::RefMidi(request), wait).await?;
        }
        Command::Mix(args) => {
            let wait = args.progression.wait;
            let a = ClipSource {
                midi: args.midi_a.as_deref(),
                project: args.project_a.as_deref(),
                track: args.track_a,
                from_tick: args.from_tick_a,
                to_tick: args.to_tick_a,
                filename: "mix_a_selection.mid",
            };
            let b = ClipSource {
                midi: args.midi_b.as_deref(),
                project: args.project_b.as_deref(),
                track: args.track_b,
                from_tick: args.from_tick_b,
                to_tick: args.to_tick_b,
                filename: "mix_b_selection.mid",
            };
            let (midi_a, bars_a) = a.load().await.context("Failed to load clip A")?;
            let (midi_b, bars_b) = b.load().await.context("Failed to load clip B")?;
            let request = MixSetRequest {
                chords: parse_chord_list(&args.progression.chords),
                chord_beats: args.progression.chord_beats,
                bars: args.progression.bars.or(bars_a),
                bpm: args.progression.bpm,
                alphas: args.alphas,
                midi_a,
                midi_b,
                bars_a,
                bars_b,
            };
            submit(orchestrator, TaskRequest::MixSet(request), wait).await?;
        }
        Command::Status { task_id } => {
            let task = orchestrator
                .refresh_task(&TaskId::from(task_id))
                .await
                .context("Failed to fetch task status")?;
            print_task(&task);
        }
        Command::Download {
            artifact_id,
            output,
        } => {
            let bytes = backend
                .download_artifact(&artifact_id)
                .await
                .with_context(|| format!("Failed to download artifact {artifact_id}"))?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("💾 {} bytes -> {}", bytes.len(), output.display());
        }
        Command::Apply(args) => {
            let mut project = load_project(&args.project).await?;
            let selection = try_select_bars(project.meter(), args.from_tick, args.to_tick)?;
            println!(
                "🎯 bars {}..={} (ticks {}..{})",
                selection.start_bar, selection.end_bar, selection.from_tick, selection.to_tick
            );
            store.set_last_selection(Some(selection));

            let importer = ArtifactImporter::new(backend, store);
            let report = importer
                .apply_artifact_with_bars(&mut project, &args.artifact, args.track, args.bars)
                .await?;
            println!(
                "✏️  removed {} notes, wrote {} ({:?})",
                report.notes_removed, report.notes_written, report.reconciliation
            );
            save_project(&project, args.output.as_deref().unwrap_or(&args.project)).await?;
        }
        Command::Import(args) => {
            let mut project = load_project(&args.project).await?;
            let importer = ArtifactImporter::new(backend, store);
            let report = importer
                .import_artifact_as_new_track(&mut project, &args.artifact, args.name.as_deref())
                .await?;
            println!(
                "➕ track {} with {} notes",
                report.track_index, report.notes_written
            );
            save_project(&project, args.output.as_deref().unwrap_or(&args.project)).await?;
        }
        Command::Config { show } => print_config(config, sources, show),
    }
    Ok(())
}

async fn submit(orchestrator: &Orchestrator, request: TaskRequest, wait: bool) -> Result<()> {
    let task_id = orchestrator.submit_task(request).await?;
    println!("{task_id}");

    if !wait {
        orchestrator.stop_polling(&task_id);
        return Ok(());
    }

    let task = tokio::select! {
        task = orchestrator.wait_for_terminal(&task_id) => task?,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.stop_polling(&task_id);
            bail!("interrupted while waiting for {task_id}");
        }
    };
    print_task(&task);
    if task.status != TaskStatus::Succeeded {
        bail!("task {} ended as {}", task.task_id, task.status);
    }
    Ok(())
}

/// A clip given either as a MIDI file or as a bar range of a project track.
struct ClipSource<'a> {
    midi: Option<&'a Path>,
    project: Option<&'a Path>,
    track: usize,
    from_tick: Option<u64>,
    to_tick: Option<u64>,
    /// Upload name for clips cut from a project.
    filename: &'static str,
}

impl ClipSource<'_> {
    /// The clip, plus the selection's bar count when it came from a project.
    async fn load(&self) -> Result<(MidiFile, Option<u32>)> {
        if let Some(path) = self.midi {
            return Ok((read_midi_file(path).await?, None));
        }

        let Some(project_path) = self.project else {
            bail!("pass a MIDI file or a project with --from-tick/--to-tick");
        };
        let (Some(from), Some(to)) = (self.from_tick, self.to_tick) else {
            bail!("a project clip needs --from-tick and --to-tick");
        };
        let mut project = load_project(project_path).await?;
        let (file, selection) = clip_from_project(&mut project, self.track, from, to, self.filename)?;
        println!(
            "🎯 {} from bars {}..={} of {}",
            self.filename,
            selection.start_bar,
            selection.end_bar,
            project_path.display()
        );
        Ok((file, Some(selection.bars)))
    }
}

async fn read_midi_file(path: &Path) -> Result<MidiFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input.mid".to_string());
    Ok(MidiFile::new(filename, bytes))
}

async fn load_project(path: &Path) -> Result<MidiProject> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read project {}", path.display()))?;
    MidiProject::from_smf_bytes(&bytes)
        .with_context(|| format!("Failed to parse project {}", path.display()))
}

async fn save_project(project: &MidiProject, path: &Path) -> Result<()> {
    let bytes = project.to_smf_bytes().context("Failed to encode project")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write project {}", path.display()))?;
    println!("💾 saved {}", path.display());
    Ok(())
}

fn print_task(task: &Task) {
    println!("task      {}", task.task_id);
    println!("kind      {}", task.kind);
    println!("status    {}", task.status);
    if let Some(inst) = task.instrument {
        println!("inst      {inst}");
    }
    if let Some(error) = &task.error {
        println!("error     {error}");
    }
    for artifact in &task.artifacts {
        println!("artifact  {}  {}", artifact.artifact_id, artifact.filename);
    }

    let interior = interior_alphas(&task.artifacts);
    if !interior.is_empty() {
        let listed: Vec<String> = interior
            .iter()
            .map(|(alpha, a)| format!("{alpha:.2}={}", a.artifact_id))
            .collect();
        println!("mix       {}", listed.join(" "));
    }
}

fn print_config(config: &StormConfig, sources: &ConfigSources, show: bool) {
    if sources.files.is_empty() {
        println!("# no config files found, using defaults");
    }
    for file in &sources.files {
        println!("# loaded {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# env {var}");
    }
    if show {
        println!();
        print!("{}", config.to_toml());
    }
}

async fn print_notifications(mut rx: broadcast::Receiver<StoreEvent>) {
    loop {
        match rx.recv().await {
            Ok(StoreEvent::Notification(n)) => {
                let icon = match n.level {
                    NotificationLevel::Info => "ℹ️ ",
                    NotificationLevel::Success => "✅",
                    NotificationLevel::Error => "❌",
                };
                eprintln!("{icon} {}", n.message);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
