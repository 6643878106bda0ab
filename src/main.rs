pub mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use impact_trainer::{
    app_dirs::AppDirs,
    clip::{ClipDescriptor, ReasonCode, TrialOutcome},
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore, SamplingMode},
    history::{mean, std_dev, ClipSummary, HistoryDb},
    manifest::{snap_to_frame, unreachable_impacts, FileManifestStore, ManifestStore},
    playback::SimulatedPlayback,
    runtime::{CrosstermEventSource, FixedTicker, Runner, Ticker, TrainerEvent, TrainerEventSource},
    selection::SelectionStrategy,
    session::Session,
    trainer::{InputSource, Trainer, TrainerError, TrainerSettings},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    io::{self, stdin, Write},
    path::PathBuf,
    sync::Mutex,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "IMPACT_TRAINER_LOG";

/// terminal reaction trainer for drive impact clips
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Plays clips one after another; react (mouse click or the react key) inside the short window after each drive impact, and hold still on clips without one."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// clip manifest (JSON list of clips)
    #[clap(short = 'm', long, global = true)]
    manifest: Option<PathBuf>,

    /// length of the reaction window in frames
    #[clap(short = 'w', long, global = true)]
    window_frames: Option<u32>,

    /// frame rate the window and the impact editor are measured in
    #[clap(long, global = true)]
    frame_rate: Option<f64>,

    /// position sampling: every frame, or the coarse polling fallback
    #[clap(long, value_enum, global = true)]
    sampling: Option<SamplingMode>,

    /// interval of the polling fallback
    #[clap(long, global = true)]
    poll_interval_ms: Option<f64>,

    /// how the next clip is chosen
    #[clap(short = 's', long, value_enum, global = true)]
    selection: Option<SelectionStrategy>,

    /// seed for reproducible clip order
    #[clap(long, global = true)]
    seed: Option<u64>,

    /// key that counts as a reaction (mouse clicks always do)
    #[clap(short = 'k', long, global = true)]
    react_key: Option<char>,

    /// how long each result stays on screen
    #[clap(long, global = true)]
    result_hold_ms: Option<f64>,

    /// don't record outcomes to the history database
    #[clap(long, global = true)]
    no_history: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// run the trainer (default)
    Train,
    /// check the manifest and report clips whose impact can never be reached
    Validate,
    /// set or clear the impact instant of one clip
    SetImpact {
        id: String,
        /// impact instant in seconds
        #[clap(required_unless_present = "clear")]
        secs: Option<f64>,
        /// mark the clip as having no impact
        #[clap(long, conflicts_with = "secs")]
        clear: bool,
        /// round to the nearest frame boundary
        #[clap(long)]
        snap: bool,
    },
    /// summarise recorded outcomes
    History {
        /// delete all recorded outcomes
        #[clap(long)]
        clear: bool,
    },
    /// write recorded outcomes as CSV
    Export { path: PathBuf },
}

impl Cli {
    /// Command-line flags override the stored configuration.
    fn apply_to(&self, cfg: &mut Config) {
        if let Some(path) = &self.manifest {
            cfg.manifest_path = path.clone();
        }
        if let Some(frames) = self.window_frames {
            cfg.window_frames = frames;
        }
        if let Some(hz) = self.frame_rate {
            cfg.frame_rate_hz = hz;
        }
        if let Some(mode) = self.sampling {
            cfg.sampling = mode;
        }
        if let Some(ms) = self.poll_interval_ms {
            cfg.poll_interval_ms = ms;
        }
        if let Some(strategy) = self.selection {
            cfg.selection = strategy;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if let Some(key) = self.react_key {
            cfg.react_key = key;
        }
        if let Some(ms) = self.result_hold_ms {
            cfg.result_hold_ms = ms;
        }
        if self.no_history {
            cfg.record_history = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Training,
    History,
}

/// Snapshot of the history database for the history screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryView {
    pub enabled: bool,
    pub clips: Vec<ClipSummary>,
    pub reasons: Vec<(ReasonCode, i64)>,
    pub mean_reaction_ms: Option<f64>,
    pub std_dev_reaction_ms: Option<f64>,
}

impl HistoryView {
    fn load(db: Option<&HistoryDb>) -> Self {
        let Some(db) = db else {
            return Self::default();
        };
        let times = db.reaction_times().unwrap_or_default();
        Self {
            enabled: true,
            clips: db.clip_summary().unwrap_or_default(),
            reasons: db.reason_breakdown().unwrap_or_default(),
            mean_reaction_ms: mean(&times),
            std_dev_reaction_ms: std_dev(&times),
        }
    }
}

#[derive(Debug)]
pub struct App {
    pub trainer: Trainer<SimulatedPlayback>,
    pub config: Config,
    pub state: AppState,
    pub history: Option<HistoryDb>,
    pub history_view: HistoryView,
    /// Time of the last event handled; rendering reads the trainer at this instant.
    pub now_ms: f64,
}

impl App {
    pub fn new(
        config: Config,
        clips: Vec<ClipDescriptor>,
        history: Option<HistoryDb>,
    ) -> Result<Self, TrainerError> {
        let playback = SimulatedPlayback::new(config.sampling(), config.default_clip_secs);
        let session = Session::new(config.selection, config.seed);
        let trainer = Trainer::new(clips, playback, session, TrainerSettings::from(&config))?;
        Ok(Self {
            trainer,
            config,
            state: AppState::Training,
            history,
            history_view: HistoryView::default(),
            now_ms: 0.0,
        })
    }

    pub fn start(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
        self.trainer.start(now_ms);
    }

    pub fn on_tick(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
        if self.state != AppState::Training {
            return;
        }
        if let Some(outcome) = self.trainer.tick(now_ms) {
            self.record(&outcome);
        }
    }

    pub fn on_react(&mut self, now_ms: f64, source: InputSource) {
        self.now_ms = now_ms;
        if self.state != AppState::Training {
            return;
        }
        if let Some(outcome) = self.trainer.react(now_ms, source) {
            self.record(&outcome);
        }
    }

    pub fn show_history(&mut self) {
        self.history_view = HistoryView::load(self.history.as_ref());
        self.state = AppState::History;
    }

    /// Back to training on a fresh clip; the clip that was showing is abandoned.
    pub fn leave_history(&mut self, now_ms: f64) {
        self.state = AppState::Training;
        self.now_ms = now_ms;
        self.trainer.skip(now_ms);
    }

    pub fn is_react_key(&self, key: &KeyEvent) -> bool {
        key.code == KeyCode::Char(self.config.react_key)
            && !key.modifiers.contains(KeyModifiers::CONTROL)
    }

    pub fn react_key_label(&self) -> String {
        match self.config.react_key {
            ' ' => "space".to_string(),
            c => c.to_string(),
        }
    }

    fn record(&self, outcome: &TrialOutcome) {
        if let Some(db) = &self.history {
            if let Err(e) = db.record_outcome(outcome) {
                warn!(error = %e, clip = %outcome.clip_id, "failed to record outcome");
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply_to(&mut config);
    if let Err(e) = config.validate() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::ValueValidation, e).exit();
    }

    match cli.command.clone().unwrap_or(Command::Train) {
        Command::Train => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            init_file_logging();
            if let Err(e) = store.save(&config) {
                warn!(error = %e, "failed to save config");
            }
            run_trainer(config)
        }
        command => {
            init_stderr_logging();
            if let Err(e) = run_command(command, &config, &mut io::stdout()) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// The TUI owns the terminal, so the trainer logs to a file.
fn init_file_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(io::stderr)
        .try_init();
}

fn run_trainer(config: Config) -> Result<(), Box<dyn Error>> {
    let clips = FileManifestStore::with_path(&config.manifest_path).load()?;
    let history = if config.record_history {
        match HistoryDb::new() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "history database unavailable; outcomes won't be recorded");
                None
            }
        }
    } else {
        None
    };
    let ticker = FixedTicker::from_millis_f64(config.frame_ms());
    let mut app = App::new(config, clips, history)?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(CrosstermEventSource::new(), ticker);
    let result = start_tui(&mut terminal, &mut app, &runner, &SystemClock::new());

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    let stats = app.trainer.stats();
    info!(pass = stats.pass, fail = stats.fail, "session ended");
    result
}

#[derive(Debug, PartialEq)]
enum ExitType {
    Restart,
    Skip,
    Quit,
}

/// Route one event into the app. Returns how the loop should proceed, if at all.
fn handle_event(app: &mut App, event: TrainerEvent, now_ms: f64) -> Option<ExitType> {
    match event {
        TrainerEvent::Tick | TrainerEvent::Resize => {}
        TrainerEvent::Pointer => app.on_react(now_ms, InputSource::Pointer),
        TrainerEvent::Key(key) => {
            if key.code == KeyCode::Esc
                || (key.modifiers.contains(KeyModifiers::CONTROL)
                    && key.code == KeyCode::Char('c'))
            {
                return Some(ExitType::Quit);
            }
            match app.state {
                AppState::Training => {
                    if app.is_react_key(&key) {
                        app.on_react(now_ms, InputSource::Key);
                    } else {
                        match key.code {
                            KeyCode::Left => return Some(ExitType::Restart),
                            KeyCode::Right => return Some(ExitType::Skip),
                            KeyCode::Tab => app.show_history(),
                            _ => {}
                        }
                    }
                }
                AppState::History => match key.code {
                    KeyCode::Tab | KeyCode::Backspace | KeyCode::Char('b') => {
                        app.leave_history(now_ms)
                    }
                    _ => {}
                },
            }
        }
    }
    // Keep sampling and deadlines current whatever arrived.
    app.on_tick(now_ms);
    None
}

fn start_tui<B: Backend, E: TrainerEventSource, T: Ticker, C: Clock>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
    clock: &C,
) -> Result<(), Box<dyn Error>> {
    app.start(clock.now_ms());

    loop {
        terminal.draw(|f| ui(app, f))?;

        let event = runner.step();
        let now_ms = clock.now_ms();
        match handle_event(app, event, now_ms) {
            Some(ExitType::Quit) => break,
            Some(ExitType::Restart) => app.trainer.restart_session(now_ms),
            Some(ExitType::Skip) => app.trainer.skip(now_ms),
            None => {}
        }
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    match app.state {
        AppState::Training => f.render_widget(app, f.area()),
        AppState::History => ui::render_history(&app.history_view, f),
    }
}

fn run_command<W: Write>(command: Command, config: &Config, out: &mut W) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Train => return Err("the trainer needs an interactive terminal".into()),
        Command::Validate => {
            let clips = FileManifestStore::with_path(&config.manifest_path).load()?;
            let with_impact = clips.iter().filter(|c| c.has_impact()).count();
            writeln!(
                out,
                "{}: {} clips ({} with impact, {} without)",
                config.manifest_path.display(),
                clips.len(),
                with_impact,
                clips.len() - with_impact
            )?;
            for clip in unreachable_impacts(&clips, config.default_clip_secs) {
                writeln!(
                    out,
                    "warning: clip '{}' impact {:?}s is never reached; it always resolves as missed",
                    clip.id,
                    clip.impact_instant.unwrap_or_default()
                )?;
            }
        }
        Command::SetImpact {
            id,
            secs,
            clear,
            snap,
        } => {
            let impact = if clear {
                None
            } else {
                secs.map(|s| {
                    if snap {
                        snap_to_frame(s, config.frame_rate_hz)
                    } else {
                        s
                    }
                })
            };
            let store = FileManifestStore::with_path(&config.manifest_path);
            let updated = store.set_impact(&id, impact)?;
            match updated.impact_instant {
                Some(t) => writeln!(out, "{}: impact at {:.3}s", updated.id, t)?,
                None => writeln!(out, "{}: no impact", updated.id)?,
            }
        }
        Command::History { clear } => {
            let db = HistoryDb::new()?;
            if clear {
                db.clear_all()?;
                writeln!(out, "history cleared")?;
            } else {
                write_history(&HistoryView::load(Some(&db)), out)?;
            }
        }
        Command::Export { path } => {
            let db = HistoryDb::new()?;
            let file = File::create(&path)?;
            let rows = db.export_csv(file)?;
            writeln!(out, "exported {} outcomes to {}", rows, path.display())?;
        }
    }
    Ok(())
}

fn write_history<W: Write>(view: &HistoryView, out: &mut W) -> io::Result<()> {
    if view.clips.is_empty() {
        return writeln!(out, "no outcomes recorded yet");
    }
    writeln!(
        out,
        "{:<20} {:>8} {:>8} {:>8} {:>10}",
        "clip", "attempts", "passes", "pass %", "mean rt"
    )?;
    for clip in &view.clips {
        let rt = clip
            .mean_reaction_ms
            .map(|ms| format!("{:.0} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<20} {:>8} {:>8} {:>7.1}% {:>10}",
            clip.clip_id, clip.attempts, clip.passes, clip.pass_rate, rt
        )?;
    }
    writeln!(out)?;
    for (reason, count) in &view.reasons {
        writeln!(out, "{:<20} {:>8}", reason.to_string(), count)?;
    }
    if let (Some(m), Some(sd)) = (view.mean_reaction_ms, view.std_dev_reaction_ms) {
        writeln!(out, "\nreaction time {:.0} ms ± {:.0} ms", m, sd)?;
    }
    Ok(())
}
