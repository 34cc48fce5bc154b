mod app;
mod ui;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use app::App;
use beatpad::audio::{AudioOutput, FALLBACK_SAMPLE_RATE};
use beatpad::kit::Kit;
use beatpad::provider::SampleProvider;
use beatpad::render::{bounce, write_wav, RenderOptions};
use beatpad::Session;
use clap::{Args, Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, Level};

// ── Command line ──────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "beatpad")]
#[command(about = "Terminal MPC-style step sequencer", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    play: PlayArgs,

    /// More log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive sequencer (the default)
    Play(PlayArgs),

    /// Bounce the kit's pattern to a WAV file without opening a device
    Render {
        /// Output WAV file path
        output: PathBuf,

        #[command(flatten)]
        session: SessionArgs,

        /// Passes through the pattern
        #[arg(short, long, default_value = "1")]
        loops: u32,

        /// Sample rate in Hz
        #[arg(short = 'r', long, default_value = "44100")]
        sample_rate: u32,
    },
}

#[derive(Args, Clone, Debug, Default)]
struct PlayArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Write logs here (the terminal is busy drawing the grid)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Kit selection plus overrides for the kit's session defaults.
#[derive(Args, Clone, Debug, Default)]
struct SessionArgs {
    /// Kit file (JSON); the built-in kit is used when omitted
    #[arg(short, long)]
    kit: Option<PathBuf>,

    /// Tempo in BPM
    #[arg(short, long)]
    bpm: Option<f32>,

    /// Pattern length in steps
    #[arg(short, long)]
    steps: Option<usize>,

    /// Swing amount 0.0-1.0
    #[arg(long)]
    swing: Option<f32>,

    /// Master gain 0.0-1.0
    #[arg(short, long)]
    gain: Option<f32>,
}

impl SessionArgs {
    fn load_kit(&self) -> Result<Kit> {
        let mut kit = match &self.kit {
            Some(path) => Kit::load(path)?,
            None => Kit::builtin(),
        };
        let s = &mut kit.session;
        if let Some(bpm) = self.bpm { s.tempo_bpm = bpm; }
        if let Some(steps) = self.steps { s.length_in_steps = steps; }
        if let Some(swing) = self.swing { s.swing_amount = swing; }
        if let Some(gain) = self.gain { s.master_gain = gain; }
        Ok(kit)
    }
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Render { output, session, loops, sample_rate }) => {
            tracing_subscriber::fmt()
                .with_max_level(log_level(cli.verbose))
                .with_writer(io::stderr)
                .init();
            render(&output, &session, RenderOptions { loops, sample_rate })
        }
        Some(Commands::Play(args)) => play(&args, cli.verbose),
        None => play(&cli.play, cli.verbose),
    }
}

// ── Offline render ────────────────────────────────────────────────────────────

fn render(output: &Path, args: &SessionArgs, opts: RenderOptions) -> Result<()> {
    let kit = args.load_kit()?;
    let sequencer = kit.build_sequencer()?;
    let bounced = bounce(&kit, sequencer, &opts)?;
    write_wav(output, &bounced.buffer)?;
    println!(
        "Rendered {} steps ({} hits, {:.2}s) to {}",
        bounced.ticks,
        bounced.hits,
        bounced.buffer.duration().as_secs_f32(),
        output.display()
    );
    Ok(())
}

// ── Interactive session ───────────────────────────────────────────────────────

fn play(args: &PlayArgs, verbose: u8) -> Result<()> {
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_max_level(log_level(verbose))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    let kit = args.session.load_kit()?;
    let sequencer = kit.build_sequencer()?;

    // The stream must stay on this thread; only the voice sender moves.
    let (output, provider) = match AudioOutput::open() {
        Ok((output, voices)) => (Some(output), SampleProvider::new(Box::new(voices))),
        Err(e) => (None, SampleProvider::unavailable(format!("{e:#}"), FALLBACK_SAMPLE_RATE)),
    };
    let mut provider = provider.with_fetcher(Box::new(kit.fetcher()));
    provider.load_kit(&kit.pads());
    let audio = provider.status().clone();

    let session = Session::spawn(sequencer, provider)?;
    let mut app = App::new(session, kit.name.clone(), kit.pads(), audio, kit.session.master_gain);
    info!("session started with kit '{}'", kit.name);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let result = run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    drop(app);
    drop(output);
    result
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.refresh();
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                match key.code {
                    KeyCode::Esc | KeyCode::Char('q') => app.should_quit = true,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.should_quit = true,

                    // Transport and tempo
                    KeyCode::Enter     => app.toggle_play(),
                    KeyCode::PageUp    => app.bpm_up(),
                    KeyCode::PageDown  => app.bpm_down(),
                    KeyCode::Char('>') => app.swing_up(),
                    KeyCode::Char('<') => app.swing_down(),
                    KeyCode::Char(']') => app.cycle_length(),
                    KeyCode::Char('+') => app.gain_up(),
                    KeyCode::Char('_') => app.gain_down(),

                    // Grid
                    KeyCode::Up    => app.pad_up(),
                    KeyCode::Down  => app.pad_down(),
                    KeyCode::Left  => app.step_left(),
                    KeyCode::Right => app.step_right(),
                    KeyCode::Char(' ')  => app.toggle_step(),
                    KeyCode::Char('=')  => app.velocity_up(),
                    KeyCode::Char('-')  => app.velocity_down(),
                    KeyCode::Char('\\') => app.toggle_mute(),
                    KeyCode::Char('e')  => app.euclidean(),
                    KeyCode::Backspace | KeyCode::Delete => app.clear_pad(),

                    // Audition
                    KeyCode::Char('a') => app.audition_selected(),
                    KeyCode::Char(c) if c.is_ascii_digit() => app.audition_key(c),

                    _ => {}
                }
            }
        }
        if app.should_quit { break; }
    }
    Ok(())
}
