use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info};
use plotters::prelude::*;
use reach_lib::{
    load_experiment,
    plot::{figure_from_reach, figure_from_velocity, Figure, Series},
    profile::VelocityMode,
    Command, Session, Setting, SettingsFolder,
};
use serde::Serialize;
use serde_json::Value;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "reach",
    version,
    about = "Curate reaching-movement trials: segment, review and export"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the experiment setting comes from. Without either, built-in defaults apply
/// (enough for curated files and raw files with their own header row in cm).
#[derive(Args)]
struct SettingArgs {
    /// Setting JSON file
    #[arg(long, conflicts_with_all = ["settings_dir", "setting_name"])]
    setting: Option<PathBuf>,
    /// Folder holding named setting files
    #[arg(long, requires = "setting_name")]
    settings_dir: Option<PathBuf>,
    /// Setting name inside --settings-dir
    #[arg(long, requires = "settings_dir")]
    setting_name: Option<String>,
}

impl SettingArgs {
    fn load(&self) -> Result<Setting> {
        match (&self.setting, &self.settings_dir, &self.setting_name) {
            (Some(path), _, _) => Setting::from_path(path)
                .with_context(|| format!("loading setting {}", path.display())),
            (None, Some(dir), Some(name)) => SettingsFolder::new(dir)
                .load(name)
                .with_context(|| format!("loading setting '{}' from {}", name, dir.display())),
            _ => Ok(Setting::default()),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotKind {
    Velocity,
    Reach,
}

#[derive(Subcommand)]
enum Commands {
    /// Print row, trial and curation counts as JSON
    Summary {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        setting: SettingArgs,
    },
    /// Load, segment and write the curated table without review
    Export {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        setting: SettingArgs,
        /// Defaults to <stem>_selected.csv next to the input
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run JSON-lines curation commands against the experiment
    Curate {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        setting: SettingArgs,
        /// Command file; stdin when omitted
        #[arg(long)]
        commands: Option<PathBuf>,
        /// Export once the commands are exhausted
        #[arg(long)]
        save: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the settings stored in a folder
    Settings {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Render a trial's velocity or reach profile to a PNG via plotters
    Plot {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        setting: SettingArgs,
        #[arg(long)]
        trial: u32,
        #[arg(long, value_enum, default_value = "velocity")]
        kind: PlotKind,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Summary { input, setting } => cmd_summary(&input, &setting.load()?)?,
        Commands::Export {
            input,
            setting,
            out,
        } => cmd_export(&input, setting.load()?, out)?,
        Commands::Curate {
            input,
            setting,
            commands,
            save,
            out,
        } => cmd_curate(&input, setting.load()?, commands.as_deref(), save, out)?,
        Commands::Settings { dir } => cmd_settings(&dir)?,
        Commands::Plot {
            input,
            setting,
            trial,
            kind,
            out,
        } => cmd_plot(&input, setting.load()?, trial, kind, &out)?,
    }
    Ok(())
}

fn cmd_summary(input: &Path, setting: &Setting) -> Result<()> {
    let experiment = load_experiment(input, setting)
        .with_context(|| format!("loading {}", input.display()))?;
    println!("{}", serde_json::to_string(&experiment.summary())?);
    Ok(())
}

#[derive(Serialize)]
struct ExportReport {
    output: PathBuf,
    rows: usize,
}

fn cmd_export(input: &Path, setting: Setting, out: Option<PathBuf>) -> Result<()> {
    let mut session = open_session(input, setting)?;
    let output = out
        .or_else(|| session.default_output_path())
        .ok_or_else(|| anyhow!("no output path for {}", input.display()))?;
    session
        .export(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    let report = ExportReport {
        rows: session.experiment().len(),
        output,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_curate(
    input: &Path,
    setting: Setting,
    commands: Option<&Path>,
    save: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut session = open_session(input, setting)?;
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    match commands {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            run_commands(&mut session, BufReader::new(file), &mut writer)?;
        }
        None => {
            let stdin = io::stdin();
            run_commands(&mut session, stdin.lock(), &mut writer)?;
        }
    }
    if save {
        let response = respond(session.execute(Command::Export { path: out }));
        write_response(&mut writer, &response)?;
    }
    Ok(())
}

fn run_commands(session: &mut Session, mut reader: impl BufRead, writer: &mut dyn Write) -> Result<()> {
    info!("reading curation commands");
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            info!("end of commands");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let response = match Command::parse(&line) {
            Ok(command) => respond(session.execute(command)),
            Err(err) => {
                error!("failed to parse command: {}", err);
                Response::error(err.to_string())
            }
        };
        write_response(writer, &response)?;
    }
    Ok(())
}

fn respond<T: Serialize>(result: reach_lib::Result<T>) -> Response {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => Response::ok(value),
            Err(err) => Response::error(err.to_string()),
        },
        Err(err) => {
            error!("command failed: {}", err);
            Response::error(err.to_string())
        }
    }
}

fn write_response(writer: &mut dyn Write, response: &Response) -> Result<()> {
    let serialized = serde_json::to_string(response)?;
    writer.write_all(serialized.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    fn error(err: String) -> Self {
        Self {
            result: None,
            error: Some(err),
        }
    }
}

fn cmd_settings(dir: &Path) -> Result<()> {
    let names = SettingsFolder::new(dir)
        .list()
        .with_context(|| format!("listing {}", dir.display()))?;
    println!("{}", serde_json::to_string(&names)?);
    Ok(())
}

fn cmd_plot(input: &Path, setting: Setting, trial: u32, kind: PlotKind, out: &Path) -> Result<()> {
    let mut session = open_session(input, setting)?;
    session.select_trial(trial)?;
    let title = match &session.setting().name {
        Some(name) => format!("{} trial {}", name, trial),
        None => format!("trial {}", trial),
    };
    let fig = match kind {
        PlotKind::Velocity => {
            let profile = session.velocity_profile(VelocityMode::PySelect)?;
            let window = session.status().window;
            figure_from_velocity(&title, &profile, window)
        }
        PlotKind::Reach => figure_from_reach(&title, &session.reach_profile()?),
    };
    draw_plotters_figure(out, &fig)?;
    Ok(())
}

fn open_session(input: &Path, setting: Setting) -> Result<Session> {
    Session::open(input, setting).with_context(|| format!("loading {}", input.display()))
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let (x_min, x_max, y_min, y_max) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
    let (x_min, x_max) = padded(x_min, x_max);
    let (y_min, y_max) = padded(y_min, y_max);
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                let style = RGBColor(r, g, b).stroke_width(line.style.width.round().max(1.0) as u32);
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    style,
                ))?;
            }
        }
    }
    root.present()?;
    Ok(())
}

/// Widen a degenerate axis range so plotters has something to draw.
fn padded(min: f64, max: f64) -> (f64, f64) {
    if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    }
}
