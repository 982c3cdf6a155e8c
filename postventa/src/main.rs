//! Operational CLI for a postventa project directory.
//!
//! State lives in `.postventa/state/` under the project directory: the
//! store (`store.json`), its schema and `config.toml`. The HTTP server
//! watches the same store, so changes made here show up there. Writes are
//! checked against the file as it was loaded; when the server changed it in
//! between, the command fails instead of overwriting.

use std::path::{Path, PathBuf};
use std::process::exit;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;

use postventa::actions::admin::technician_roster;
use postventa::actions::reminders::send_reminders;
use postventa::actions::{Actor, Ctx, atomically};
use postventa::auth;
use postventa::core::invariants::{collect_warnings, validate_invariants};
use postventa::core::kpi::{KpiCalculator, KpiFilter};
use postventa::core::schedule::dedupe_availability;
use postventa::core::types::ProjectId;
use postventa::exit_codes;
use postventa::io::config::{PostventaConfig, load_config};
use postventa::io::init::{InitOptions, PostventaPaths, init_project};
use postventa::io::mailer::LogMailer;
use postventa::io::store_file::{
    StoreChanged, StoreStamp, load_store_for_repair, load_store_stamped, write_store_checked,
};
use postventa::logging;
use postventa::model::Store;
use postventa::notifications::{carry_deliveries, dispatch_pending};

const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Parser)]
#[command(
    name = "postventa",
    version,
    about = "Warranty claim management: maintenance commands"
)]
struct Cli {
    /// Directory that contains `.postventa/`.
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.postventa/` with default config and an empty store.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check config and store (schema, invariants, data warnings).
    Validate,
    /// Print the KPI report.
    Kpis {
        #[arg(long)]
        project: Option<u64>,
        /// First day included (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day included (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Scalar KPIs as CSV instead of JSON.
        #[arg(long)]
        csv: bool,
    },
    /// List technicians with their current load.
    Technicians,
    /// Remove duplicated availability windows.
    DedupeAvailability,
    /// Queue reminders for the visits of one day (default: tomorrow).
    SendReminders {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Deliver pending notifications through the log mailer.
    DispatchNotifications,
    /// Set a new password; a random one is generated and printed when omitted.
    ResetPassword {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = PostventaPaths::new(&cli.project_dir);
    match cli.command {
        Command::Init { force } => cmd_init(&cli.project_dir, force),
        Command::Validate => cmd_validate(&paths),
        Command::Kpis {
            project,
            from,
            to,
            csv,
        } => {
            let filter = KpiFilter {
                project: project.map(ProjectId),
                from,
                to,
            };
            cmd_kpis(&paths, &filter, csv)
        }
        Command::Technicians => cmd_technicians(&paths),
        Command::DedupeAvailability => cmd_dedupe(&paths),
        Command::SendReminders { date } => cmd_send_reminders(&paths, date),
        Command::DispatchNotifications => cmd_dispatch(&paths),
        Command::ResetPassword { username, password } => {
            cmd_reset_password(&paths, &username, password)
        }
    }
}

fn require_initialized(paths: &PostventaPaths) -> Result<()> {
    if !paths.state_dir.is_dir() {
        bail!(
            "{} not found (run `postventa init` first)",
            paths.state_dir.display()
        );
    }
    Ok(())
}

fn load_state(paths: &PostventaPaths) -> Result<(PostventaConfig, Store, StoreStamp)> {
    require_initialized(paths)?;
    let cfg = load_config(&paths.config_path)?;
    cfg.validate().context("invalid config")?;
    let (store, stamp) = load_store_stamped(&paths.store_path)?;
    Ok((cfg, store, stamp))
}

/// Write back a store loaded with `stamp`.
fn save(paths: &PostventaPaths, store: &Store, stamp: &StoreStamp) -> Result<()> {
    write_store_checked(&paths.store_path, store, stamp)
        .context("store not saved, run the command again")?;
    Ok(())
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_project(root, &InitOptions { force })?;
    println!("initialized {}", paths.postventa_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(paths: &PostventaPaths) -> Result<i32> {
    let (cfg, store, _) = load_state(paths)?;
    let warnings = collect_warnings(&store, &cfg.folio.prefix);
    if warnings.is_empty() {
        println!("ok");
        return Ok(exit_codes::OK);
    }
    for warning in &warnings {
        println!("warning: {warning}");
    }
    Ok(exit_codes::WARNINGS)
}

fn cmd_kpis(paths: &PostventaPaths, filter: &KpiFilter, csv: bool) -> Result<i32> {
    let (cfg, store, _) = load_state(paths)?;
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(anyhow!("--from {from} is after --to {to}"));
    }
    let report = KpiCalculator::new(&store, &cfg.kpi, filter).all_kpis();
    if csv {
        print!("{}", report.to_csv());
    } else {
        let json = serde_json::to_string_pretty(&report).context("serialize kpi report")?;
        println!("{json}");
    }
    Ok(exit_codes::OK)
}

fn cmd_technicians(paths: &PostventaPaths) -> Result<i32> {
    let (_, store, _) = load_state(paths)?;
    for entry in technician_roster(&store) {
        let rating = entry
            .rating
            .map(|r| format!("{r:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            entry.id,
            entry.rut,
            entry.name,
            entry.specialty.as_deref().unwrap_or("-"),
            if entry.active { "activo" } else { "inactivo" },
            entry.active_claims,
            rating
        );
    }
    Ok(exit_codes::OK)
}

/// Loads without the invariant gate, since duplicated windows are exactly
/// what it repairs. Other violations still block the write.
fn cmd_dedupe(paths: &PostventaPaths) -> Result<i32> {
    require_initialized(paths)?;
    let repair = load_store_for_repair(&paths.store_path)?;
    let mut store = repair.store;
    let removed = dedupe_availability(&mut store);
    let errors = validate_invariants(&store);
    if !errors.is_empty() {
        bail!("store invariants failed: {}", errors.join("; "));
    }
    if !removed.is_empty() {
        save(paths, &store, &repair.stamp)?;
    }
    println!("removed {} duplicated window(s)", removed.len());
    Ok(exit_codes::OK)
}

fn cmd_send_reminders(paths: &PostventaPaths, date: Option<NaiveDate>) -> Result<i32> {
    let (cfg, mut store, stamp) = load_state(paths)?;
    let now = Local::now().naive_local();
    let date = date.unwrap_or_else(|| now.date() + Duration::days(1));
    let ctx = Ctx::new(&cfg, now, Actor::System);
    let sent = atomically(&mut store, |draft| send_reminders(draft, &ctx, date))?;
    if !sent.is_empty() {
        save(paths, &store, &stamp)?;
    }
    println!("queued {} reminder(s) for {date}", sent.len());
    Ok(exit_codes::OK)
}

fn cmd_dispatch(paths: &PostventaPaths) -> Result<i32> {
    let (cfg, mut store, stamp) = load_state(paths)?;
    let mailer = LogMailer::new(cfg.notifications.sender.clone());
    let summary = dispatch_pending(&mut store, &mailer, Local::now().naive_local());
    if summary.sent > 0 {
        save_deliveries(paths, &store, &stamp)?;
    }
    info!(?summary, "dispatch finished");
    println!(
        "sent {}, failed {}, skipped {}",
        summary.sent, summary.failed, summary.skipped
    );
    Ok(exit_codes::OK)
}

/// Mails already went out, so a store changed meanwhile is not a reason to
/// give up: the delivery marks move onto a fresh copy instead.
fn save_deliveries(paths: &PostventaPaths, store: &Store, stamp: &StoreStamp) -> Result<()> {
    match write_store_checked(&paths.store_path, store, stamp) {
        Ok(_) => Ok(()),
        Err(err) if err.is::<StoreChanged>() => {
            let (mut fresh, fresh_stamp) = load_store_stamped(&paths.store_path)?;
            let carried = carry_deliveries(store, &mut fresh);
            info!(carried, "store changed during dispatch, merged delivery marks");
            save(paths, &fresh, &fresh_stamp)
        }
        Err(err) => Err(err),
    }
}

fn cmd_reset_password(
    paths: &PostventaPaths,
    username: &str,
    password: Option<String>,
) -> Result<i32> {
    let (_, mut store, stamp) = load_state(paths)?;
    let generated = password.is_none();
    let password = password.unwrap_or_else(|| auth::generate_password(GENERATED_PASSWORD_LEN));
    atomically(&mut store, |draft| auth::reset_password(draft, username, &password))
        .with_context(|| format!("reset password for {username}"))?;
    save(paths, &store, &stamp)?;
    if generated {
        println!("{username}\t{password}");
    } else {
        println!("password updated for {username}");
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["postventa", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.project_dir, PathBuf::from("."));
    }

    #[test]
    fn parse_kpis_with_filter() {
        let cli = Cli::parse_from([
            "postventa",
            "--project-dir",
            "/srv/obra",
            "kpis",
            "--project",
            "2",
            "--from",
            "2025-01-01",
            "--csv",
        ]);
        assert_eq!(cli.project_dir, PathBuf::from("/srv/obra"));
        match cli.command {
            Command::Kpis {
                project,
                from,
                to,
                csv,
            } => {
                assert_eq!(project, Some(2));
                assert_eq!(from, NaiveDate::from_ymd_opt(2025, 1, 1));
                assert_eq!(to, None);
                assert!(csv);
            }
            _ => panic!("expected kpis"),
        }
    }

    #[test]
    fn parse_reset_password_without_password() {
        let cli = Cli::parse_from(["postventa", "reset-password", "cdiaz"]);
        assert!(matches!(
            cli.command,
            Command::ResetPassword { ref username, password: None } if username == "cdiaz"
        ));
    }
}
