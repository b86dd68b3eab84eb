use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
use serde_json::json;

mod blocks;
mod config;
mod diff;
mod encoding;
mod format;
mod logging;
mod patch;
mod run;
mod target;
use blocks::{PatchBlocks, render_formatter};
use config::{FileConfig, load_config};
use diff::DiffDisplay;
use format::{ElapsedMillis, RELATIVE_TIME, format_relative};
use logging::{ChangeRecord, record_change};
use patch::{StepState, injection_state, replacement_state};
use run::{PatchOutcome, RunOptions, RunReport, describe_steps, patch_target};
use target::{UpstreamPackage, read_upstream_package, resolve_root, resolve_target, version_mismatch};

const PREFIX: &str = "[plotly-patch]";

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // runs inside npm lifecycle hooks: a failed patch must never fail the install
    if let Err(err) = run(cli) {
        println!("{PREFIX} warning: {err:#}");
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or_default() {
        Command::Apply(cmd) => handle_apply(cmd)?,
        Command::Check(cmd) => handle_check(cmd)?,
        Command::Format(cmd) => handle_format(cmd),
        Command::Render => println!("{}", render_formatter(&RELATIVE_TIME)),
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct Settings {
    root: PathBuf,
    target: PathBuf,
    backup: bool,
    undo_log: Option<PathBuf>,
    change_log: bool,
    expect_version: Option<String>,
    context: usize,
    color: ColorChoice,
}

impl Settings {
    fn resolve(args: &TargetArgs, overrides: &SettingOverrides) -> Result<Self> {
        let file = match &args.config {
            Some(path) => load_config(path)?,
            None => FileConfig::default(),
        };
        let root = resolve_root(args.root.as_deref().or(file.root.as_deref()))?;
        let target = resolve_target(&root, args.target.as_deref().or(file.target.as_deref()));
        Ok(Self {
            target,
            backup: overrides.backup || file.backup.unwrap_or(false),
            undo_log: overrides.undo_log.clone().or(file.undo_log),
            change_log: overrides.change_log || file.change_log.unwrap_or(false),
            expect_version: overrides.expect_version.clone().or(file.expect_version),
            context: overrides.context.or(file.context).unwrap_or(3),
            color: overrides.color.or(file.color).unwrap_or_default(),
            root,
        })
    }
}

#[derive(Debug, Default)]
struct SettingOverrides {
    backup: bool,
    undo_log: Option<PathBuf>,
    change_log: bool,
    expect_version: Option<String>,
    context: Option<usize>,
    color: Option<ColorChoice>,
}

fn handle_apply(cmd: ApplyCommand) -> Result<()> {
    let overrides = SettingOverrides {
        backup: cmd.backup,
        undo_log: cmd.undo_log.clone(),
        change_log: cmd.change_log,
        expect_version: cmd.expect_version.clone(),
        context: cmd.context,
        color: cmd.color,
    };
    let settings = Settings::resolve(&cmd.target, &overrides)?;
    let package = load_upstream(&settings);

    let options = RunOptions {
        dry_run: cmd.dry_run,
        backup: settings.backup,
        undo_dir: settings.undo_log.clone(),
        diff: cmd.diff.then(|| DiffDisplay {
            context: settings.context,
            colorize: settings.color.should_color(),
        }),
    };
    let report = patch_target(&settings.target, &PatchBlocks::relative_time(), &options)?;

    if let Some(preview) = &report.preview {
        println!("--- preview: {} ---", report.target.display());
        print!("{preview}");
    }
    print_report(&report);
    if let Some(backup) = &report.backup {
        println!(
            "{PREFIX} backup saved: {} -> {}",
            report.target.display(),
            backup.display()
        );
    }
    if let Some(undo) = &report.undo_patch {
        println!("{PREFIX} undo patch: {}", undo.display());
    }
    if cmd.json {
        let version = package.as_ref().and_then(|pkg| pkg.version.clone());
        println!("{}", json!({ "report": &report, "upstream_version": version }));
    }

    if settings.change_log && !report.dry_run {
        let detail = if report.steps.is_empty() {
            report.message.clone()
        } else {
            describe_steps(&report.steps)
        };
        let record = ChangeRecord {
            command: "apply",
            path: &report.target,
            outcome: report.outcome.label(),
            detail: &detail,
            version: package.as_ref().and_then(|pkg| pkg.version.as_deref()),
        };
        if let Err(err) = record_change(&settings.root, &record) {
            println!("{PREFIX} warning: unable to record change log: {err:#}");
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    if report.outcome.is_warning() {
        println!("{PREFIX} warning: {}", report.message);
    } else {
        println!("{PREFIX} {}", report.message);
    }
}

fn load_upstream(settings: &Settings) -> Option<UpstreamPackage> {
    let package = match read_upstream_package(&settings.target) {
        Ok(package) => package,
        Err(err) => {
            println!("{PREFIX} warning: {err:#}");
            None
        }
    };
    if let Some(expected) = &settings.expect_version {
        if settings.target.exists() {
            if let Some(warning) = version_mismatch(package.as_ref(), expected) {
                println!("{PREFIX} warning: {warning}");
            }
        }
    }
    package
}

fn handle_check(cmd: CheckCommand) -> Result<()> {
    let settings = Settings::resolve(&cmd.target, &SettingOverrides::default())?;
    let package = load_upstream(&settings);
    println!("target: {}", settings.target.display());
    if let Some(pkg) = &package {
        println!(
            "upstream: {} {}",
            pkg.name.as_deref().unwrap_or("(unnamed)"),
            pkg.version.as_deref().unwrap_or("(no version)")
        );
    }

    let outcome = if !settings.target.exists() {
        PatchOutcome::TargetMissing
    } else {
        let bytes = std::fs::read(&settings.target)
            .with_context(|| format!("failed to read {}", settings.target.display()))?;
        let source = encoding::decode_source(&bytes)?;
        println!("encoding: {} ({})", source.encoding.name(), source.source);
        let (lines, outcome) = check_steps(&source.text, &PatchBlocks::relative_time());
        for line in lines {
            println!("{line}");
        }
        outcome
    };
    println!("outcome: {}", outcome.label());
    Ok(())
}

fn check_steps(text: &str, blocks: &PatchBlocks) -> (Vec<String>, PatchOutcome) {
    let states = [
        (patch::StepKind::Injection, injection_state(text, blocks)),
        (patch::StepKind::Replacement, replacement_state(text, blocks)),
    ];
    let lines = states
        .iter()
        .map(|(step, state)| format!("  {step}: {}", describe_state(*state)))
        .collect();
    (lines, predict_outcome(&states.map(|(_, state)| state)))
}

fn describe_state(state: StepState) -> &'static str {
    match state {
        StepState::Applied => "applied",
        StepState::Pending => "pending",
        StepState::Blocked => "anchor missing",
    }
}

// the injected block contains neither replacement text, so the states read
// off the unpatched file decide what apply_patch would do
fn predict_outcome(states: &[StepState]) -> PatchOutcome {
    if states.contains(&StepState::Blocked) {
        PatchOutcome::AnchorNotFound
    } else if states.iter().all(|state| *state == StepState::Applied) {
        PatchOutcome::AlreadyPatched
    } else {
        PatchOutcome::Applied
    }
}

fn handle_format(cmd: FormatCommand) {
    for line in format_lines(&cmd.millis) {
        println!("{line}");
    }
}

// one line per value; a bad value gets an error line and the rest still print
fn format_lines(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|raw| match raw.parse::<ElapsedMillis>() {
            Ok(elapsed) => format!("{raw}\t{}", format_relative(elapsed)),
            Err(err) => format!("{raw}\terror: {err}"),
        })
        .collect()
}

#[derive(Debug, Parser)]
#[command(
    name = "tickpatch",
    version,
    about = "Patches plotly.js so axis ticks show relative elapsed time"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Patch the target file (default when no command is given).
    Apply(ApplyCommand),
    /// Report which patch steps are applied without writing anything.
    Check(CheckCommand),
    /// Print the relative time label for millisecond values.
    Format(FormatCommand),
    /// Print the JavaScript formatter that gets injected.
    Render,
}

impl Default for Command {
    fn default() -> Self {
        Command::Apply(ApplyCommand::default())
    }
}

#[derive(Debug, Clone, Default, Args)]
struct TargetArgs {
    /// Project root containing node_modules (defaults to the current directory).
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    root: Option<PathBuf>,
    /// File to patch instead of node_modules/plotly.js/src/plots/plots.js.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    target: Option<PathBuf>,
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Args)]
struct ApplyCommand {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    diff: bool,
    #[arg(long)]
    context: Option<usize>,
    #[arg(long = "color", value_enum)]
    color: Option<ColorChoice>,
    #[arg(long, action = ArgAction::SetTrue)]
    backup: bool,
    #[arg(long = "undo-log", value_name = "DIR", value_hint = ValueHint::DirPath)]
    undo_log: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    change_log: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    #[arg(long, value_name = "VERSION")]
    expect_version: Option<String>,
}

#[derive(Debug, Args)]
struct CheckCommand {
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Args)]
struct FormatCommand {
    #[arg(value_name = "MS", required = true, allow_hyphen_values = true)]
    millis: Vec<String>,
}
