//! CLI interface for editdesk.
//!
//! Non-interactive: arguments in, text or JSON out. Logs go to stderr so
//! stdout stays clean for piping.
//!
//! Commands split into two groups:
//!
//! - `editdesk project new|list`: no project context needed.
//! - `editdesk --project <id> <command>`: everything else.
//!
//! The `--project` flag takes a full id or unambiguous prefix.

mod format;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use editdesk::agent::CommandAgent;
use editdesk::config::Config;
use editdesk::desk::Desk;
use editdesk::model::{SeriesBible, StageId};
use editdesk::report::render_stage;
use editdesk::storage::Storage;

use format::{format_diff, format_history, format_status, format_summary, format_versions};

/// Editdesk: run manuscripts through the editorial pipeline.
#[derive(Debug, Parser)]
#[command(name = "editdesk", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Project id: full id or unambiguous prefix (e.g. `a3b`).
    #[arg(long, global = true)]
    project: Option<String>,

    /// Agent command, overriding `EDITDESK_AGENT` and the config file.
    #[arg(long, global = true)]
    agent: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: editing a manuscript
  1. editdesk project new "The Salt Road" --file salt-road.txt
     → prints a project id (e.g. a3b0fc12-...)
  2. editdesk --project a3b run acquisitions
  3. editdesk --project a3b bible extract
  4. editdesk --project a3b run developmental
  5. editdesk --project a3b fixes developmental --issue 1 --issue 3
  6. editdesk --project a3b report --markdown

Stages, in order: acquisitions, developmental, line, copy, proof, cold_read (optional)"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage projects: create new ones, list, show.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Run one pipeline stage. Requires `--project`.
    ///
    /// The stage's predecessor must be completed. Rerunning a completed
    /// stage replaces its report.
    Run {
        /// Stage id, e.g. `line` or `cold_read`.
        stage: String,
    },

    /// Show per-stage status. Requires `--project`.
    Status,

    /// Print the consolidated report, or one stage's report. Requires `--project`.
    Report {
        /// Only this stage's report.
        #[arg(long)]
        stage: Option<String>,

        /// Render as markdown instead of JSON.
        #[arg(long)]
        markdown: bool,
    },

    /// Read or replace the Series Bible. Requires `--project`.
    Bible {
        #[command(subcommand)]
        command: BibleCommand,
    },

    /// Apply issues from a stage report to the current text. Requires `--project`.
    Fixes {
        /// Stage whose report holds the issues.
        stage: String,

        /// Issue number as shown by `report --stage <stage> --markdown`: the
        /// issue's 1-based position in the agent's list. Can be specified
        /// multiple times. All issues when omitted.
        #[arg(long = "issue")]
        issues: Vec<usize>,
    },

    /// List stored text versions. Requires `--project`.
    Versions,

    /// Make a stored version the current text. Requires `--project`.
    Restore {
        /// Version label, e.g. `original` or `line_fixes_applied`.
        label: String,
    },

    /// Line diff between two stored versions. Requires `--project`.
    Compare {
        /// Older version label, e.g. `original`.
        old: String,

        /// Newer version label.
        #[arg(default_value = "current")]
        new: String,

        /// Print JSON instead of a unified listing.
        #[arg(long)]
        json: bool,
    },

    /// Stop the stage running on a project. Requires `--project`.
    ///
    /// Works across processes; the run ends and the stage is marked failed.
    Cancel,

    /// Mark a stage stuck in progress as failed. Requires `--project`.
    Fail {
        stage: String,

        /// Why the run is being abandoned.
        #[arg(long, default_value = "abandoned run")]
        reason: String,
    },

    /// Show the project's event history. Requires `--project`.
    History,
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Create a project from a plain-text manuscript. Prints the project id.
    New {
        title: String,

        /// Manuscript file; `-` reads stdin.
        #[arg(long)]
        file: PathBuf,

        /// Use this id instead of a generated one.
        #[arg(long)]
        id: Option<String>,
    },

    /// List projects.
    List,

    /// Print the full project as JSON. Requires `--project`.
    Show,

    /// Change the project's title. Requires `--project`.
    Rename { title: String },

    /// Copy the project under a new id. Prints the new id. Requires `--project`.
    Copy,
}

#[derive(Debug, Subcommand)]
pub enum BibleCommand {
    /// Print the bible as JSON.
    Show,

    /// Replace the bible with the JSON in a file (`-` for stdin).
    Set { file: PathBuf },

    /// Build the bible from the original text with the agent.
    Extract,

    /// List archived bible numbers.
    Versions,

    /// Make an archived bible current again.
    Restore { version: u64 },
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config, storage: Storage) -> Result<(), String> {
    let cli = Cli::parse();
    let desk = Desk::new(storage);

    match cli.command {
        Command::Project { command } => match command {
            ProjectCommand::New { title, file, id } => {
                cmd_project_new(&desk, &title, &file, id.as_deref())
            }
            ProjectCommand::List => cmd_project_list(&desk),
            ProjectCommand::Show => {
                let id = require_project(&desk, cli.project.as_deref())?;
                let project = desk.get_project(&id).map_err(|e| e.to_string())?;
                print_json(&project)
            }
            ProjectCommand::Rename { title } => {
                let id = require_project(&desk, cli.project.as_deref())?;
                desk.rename_project(&id, &title)
                    .map_err(|e| e.to_string())?;
                eprintln!("Renamed to {title}");
                Ok(())
            }
            ProjectCommand::Copy => {
                let id = require_project(&desk, cli.project.as_deref())?;
                let copy = desk.duplicate_project(&id).map_err(|e| e.to_string())?;
                eprintln!("Copied as {}", copy.manuscript.title);
                println!("{}", copy.id());
                Ok(())
            }
        },
        Command::Run { stage } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let desk = with_agent(desk, config, cli.agent.as_deref())?;
            cmd_run(&desk, &id, &stage)
        }
        Command::Status => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let workflow = desk.get_status(&id).map_err(|e| e.to_string())?;
            print!("{}", format_status(&workflow));
            Ok(())
        }
        Command::Report { stage, markdown } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            cmd_report(&desk, &id, stage.as_deref(), markdown)
        }
        Command::Bible { command } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            cmd_bible(desk, config, cli.agent.as_deref(), &id, command)
        }
        Command::Fixes { stage, issues } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let desk = with_agent(desk, config, cli.agent.as_deref())?;
            cmd_fixes(&desk, &id, &stage, &issues)
        }
        Command::Versions => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let versions = desk.list_versions(&id).map_err(|e| e.to_string())?;
            print!("{}", format_versions(&versions));
            Ok(())
        }
        Command::Restore { label } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let backup = desk
                .restore_version(&id, &label)
                .map_err(|e| e.to_string())?;
            eprintln!("Restored {label}; previous text saved as {backup}");
            Ok(())
        }
        Command::Compare { old, new, json } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let diff = desk
                .compare_versions(&id, &old, &new)
                .map_err(|e| e.to_string())?;
            if json {
                return print_json(&diff);
            }
            print!("{}", format_diff(&diff));
            Ok(())
        }
        Command::Cancel => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let stage = desk.cancel_stage(&id).map_err(|e| e.to_string())?;
            eprintln!("Asked {stage} to stop");
            Ok(())
        }
        Command::Fail { stage, reason } => {
            let id = require_project(&desk, cli.project.as_deref())?;
            desk.mark_stage_failed(&id, &stage, &reason)
                .map_err(|e| e.to_string())?;
            eprintln!("Marked {stage} failed: {reason}");
            Ok(())
        }
        Command::History => {
            let id = require_project(&desk, cli.project.as_deref())?;
            let history = desk.history(&id).map_err(|e| e.to_string())?;
            print!("{}", format_history(&history));
            Ok(())
        }
    }
}

/// Attach the resolved command agent to the desk.
fn with_agent(desk: Desk, config: &Config, explicit: Option<&str>) -> Result<Desk, String> {
    let command = config.resolve_agent_command(explicit)?;
    let agent = CommandAgent::new(&command).map_err(|e| e.to_string())?;
    Ok(desk.with_agent(Arc::new(agent)))
}

/// Require that `--project` was provided and resolve it.
fn require_project(desk: &Desk, reference: Option<&str>) -> Result<String, String> {
    let reference = reference.ok_or("this command requires --project <id>")?;
    resolve_project(desk, reference)
}

/// Resolve a full project id or unambiguous prefix.
fn resolve_project(desk: &Desk, reference: &str) -> Result<String, String> {
    if desk.storage().project_exists(reference) {
        return Ok(reference.to_string());
    }

    let projects = desk
        .list_projects()
        .map_err(|e| format!("failed to list projects: {e}"))?;
    let matches: Vec<&str> = projects
        .iter()
        .map(|p| p.id.as_str())
        .filter(|id| id.starts_with(reference))
        .collect();

    match matches.as_slice() {
        [] => Err(format!("no project matching '{reference}'")),
        [id] => Ok((*id).to_string()),
        ids => Err(format!(
            "'{reference}' is ambiguous, matches {} projects: {}",
            ids.len(),
            ids.join(", ")
        )),
    }
}

fn cmd_project_new(desk: &Desk, title: &str, file: &Path, id: Option<&str>) -> Result<(), String> {
    let text = read_input(file)?;
    let project = match id {
        Some(id) => desk.create_project_with_id(id, title, &text),
        None => desk.create_project(title, &text),
    }
    .map_err(|e| format!("failed to create project: {e}"))?;

    eprintln!("{} words", project.manuscript.word_count);
    println!("{}", project.id());
    Ok(())
}

fn cmd_project_list(desk: &Desk) -> Result<(), String> {
    let projects = desk
        .list_projects()
        .map_err(|e| format!("failed to list projects: {e}"))?;

    if projects.is_empty() {
        println!("No projects");
        return Ok(());
    }

    for p in &projects {
        println!("{}", format_summary(p));
    }
    Ok(())
}

fn cmd_run(desk: &Desk, id: &str, stage: &str) -> Result<(), String> {
    let result = desk.run_stage(id, stage).map_err(|e| e.to_string())?;
    eprintln!(
        "{} completed: {} issues, next: {}",
        result.stage,
        result.report.issue_count(),
        result.next_stage
    );
    print_json(&result.report)
}

fn cmd_report(desk: &Desk, id: &str, stage: Option<&str>, markdown: bool) -> Result<(), String> {
    if let Some(stage) = stage {
        let stage_id = stage.parse::<StageId>().map_err(|e| e.to_string())?;
        let report = desk
            .get_stage_report(id, stage)
            .map_err(|e| e.to_string())?;
        if markdown {
            println!("{}", render_stage(stage_id, &report));
            return Ok(());
        }
        return print_json(&report);
    }

    let report = desk
        .generate_complete_report(id)
        .map_err(|e| e.to_string())?;
    if markdown {
        print!("{}", report.to_markdown());
        Ok(())
    } else {
        print_json(&report)
    }
}

fn cmd_bible(
    desk: Desk,
    config: &Config,
    agent: Option<&str>,
    id: &str,
    command: BibleCommand,
) -> Result<(), String> {
    match command {
        BibleCommand::Show => {
            let bible = desk.get_bible(id).map_err(|e| e.to_string())?;
            print_json(&bible)
        }
        BibleCommand::Set { file } => {
            let json = read_input(&file)?;
            let bible: SeriesBible =
                serde_json::from_str(&json).map_err(|e| format!("invalid bible JSON: {e}"))?;
            let archived = desk.update_bible(id, &bible).map_err(|e| e.to_string())?;
            match archived {
                Some(n) => eprintln!("Bible updated; previous saved as #{n}"),
                None => eprintln!("Bible updated"),
            }
            Ok(())
        }
        BibleCommand::Versions => {
            let versions = desk.list_bible_versions(id).map_err(|e| e.to_string())?;
            if versions.is_empty() {
                println!("No archived bibles");
            }
            for n in versions {
                println!("#{n}");
            }
            Ok(())
        }
        BibleCommand::Restore { version } => {
            desk.restore_bible_version(id, version)
                .map_err(|e| e.to_string())?;
            eprintln!("Restored bible #{version}");
            Ok(())
        }
        BibleCommand::Extract => {
            let desk = with_agent(desk, config, agent)?;
            let bible = desk.extract_bible(id).map_err(|e| e.to_string())?;
            eprintln!("Extracted {} entities", bible.len());
            print_json(&bible)
        }
    }
}

fn cmd_fixes(desk: &Desk, id: &str, stage: &str, issues: &[usize]) -> Result<(), String> {
    let indices = issues
        .iter()
        .map(|&n| {
            n.checked_sub(1)
                .ok_or_else(|| "issue numbers start at 1".to_string())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let applied = desk
        .apply_fixes(id, stage, &indices)
        .map_err(|e| e.to_string())?;
    eprintln!(
        "Applied {} issues from {}; saved as {}",
        applied.issues_applied, applied.stage, applied.label
    );
    println!("{}", applied.text_digest);
    Ok(())
}

/// Read a UTF-8 file, or stdin for `-`.
fn read_input(path: &Path) -> Result<String, String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        return Ok(text);
    }
    fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize: {e}"))?;
    println!("{json}");
    Ok(())
}
