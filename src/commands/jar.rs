//! Jar deployment commands
//!
//! - `validate` - Check every declaration
//! - `plan` - Show resolved deployment plans
//! - `status` - Show current state vs desired state
//! - `diff` - Preview what apply would change
//! - `apply` - Make the filesystem match the manifest
//! - `deploy` - One-off declaration from the command line

use anyhow::{Context as AnyhowContext, Result, anyhow, bail};
use colored::Colorize;
use declarative::{
    AutoConfirm, ConfirmCallback, DiffSummary, ExecuteOptions, ExecuteSummary, ExecutionPlan,
    ResourceDiff, ResourceState, compute_diffs, execute, filter_by_target, group_by_plan,
};
use jarkit::{DeploymentPlan, FileEnsure, Fetcher, JarError, JarParams, ManagedFile, Outcome};
use std::sync::Arc;

use crate::Context;
use crate::cli::DeployArgs;
use crate::config::{JarDeclaration, Manifest};
use crate::paths;
use crate::progress::ApplyProgress;
use crate::ui;

// ============================================================================
// Loading and Resolution
// ============================================================================

/// A declaration after validation and resolution
struct Resolved {
    name: String,
    result: jarkit::Result<DeploymentPlan>,
}

/// Manifest plus the fetch backend it configures
struct Loaded {
    manifest: Manifest,
    fetcher: Arc<dyn Fetcher>,
}

fn load(ctx: &Context) -> Result<Loaded> {
    let path = paths::manifest_path(ctx.file.as_deref())?;
    log::info!("Loading manifest from {}", path.display());
    let manifest = Manifest::load(&path)?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(manifest.fetch.fetcher());
    Ok(Loaded { manifest, fetcher })
}

/// Manifest when one exists, defaults otherwise (used by `deploy`)
fn load_or_default(ctx: &Context) -> Result<Loaded> {
    let path = paths::manifest_path(ctx.file.as_deref())?;
    if ctx.file.is_none() && !path.exists() {
        log::debug!("No manifest at {}, using defaults", path.display());
        let manifest = Manifest::default();
        let fetcher: Arc<dyn Fetcher> = Arc::new(manifest.fetch.fetcher());
        return Ok(Loaded { manifest, fetcher });
    }
    load(ctx)
}

fn resolve_one(jar: &JarDeclaration, loaded: &Loaded) -> Resolved {
    let result = jarkit::deploy(
        &jar.name,
        &jar.params,
        &loaded.manifest.server,
        loaded.fetcher.as_ref(),
    );
    if let Err(e) = &result {
        log::debug!("{}: {e}", jar.name);
    }
    Resolved {
        name: jar.name.clone(),
        result,
    }
}

fn resolve_all(loaded: &Loaded) -> Vec<Resolved> {
    loaded
        .manifest
        .jars
        .iter()
        .map(|jar| resolve_one(jar, loaded))
        .collect()
}

fn report_error(name: &str, err: &JarError) {
    let phase = if err.is_deferred() {
        "resolution"
    } else {
        "validation"
    };
    ui::error(&format!("{}: {} {}", name.bold(), err, format!("({phase})").dimmed()));
}

/// Valid plans only; an invalid declaration or two declarations sharing
/// a path abort
fn valid_plans(resolved: Vec<Resolved>) -> Result<Vec<DeploymentPlan>> {
    let mut plans = Vec::with_capacity(resolved.len());
    let mut invalid = 0;
    for r in resolved {
        match r.result {
            Ok(plan) => plans.push(plan),
            Err(e) => {
                report_error(&r.name, &e);
                invalid += 1;
            }
        }
    }
    if invalid > 0 {
        bail!("{invalid} invalid declaration(s), run `tomcat-jar validate` for details");
    }
    jarkit::check_collisions(&plans).context("Conflicting declarations")?;
    Ok(plans)
}

fn execution_plans(
    plans: Vec<DeploymentPlan>,
    fetcher: &Arc<dyn Fetcher>,
    target: Option<&str>,
) -> Vec<ExecutionPlan> {
    let all = plans
        .into_iter()
        .map(|p| p.into_execution_plan(Arc::clone(fetcher)))
        .collect();
    filter_by_target(all, target)
}

// ============================================================================
// Validate Command
// ============================================================================

pub fn validate(ctx: &Context) -> Result<()> {
    let loaded = load(ctx)?;
    let resolved = resolve_all(&loaded);

    if !ctx.quiet {
        ui::header("Validate");
    }

    let mut invalid = 0;
    for r in &resolved {
        match &r.result {
            Ok(plan) => {
                if !ctx.quiet {
                    ui::success(&format!("{} → {}", r.name.bold(), plan.target.display()));
                }
            }
            Err(e) => {
                report_error(&r.name, e);
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        bail!("{invalid} of {} declaration(s) invalid", resolved.len());
    }

    let total = resolved.len();
    let plans: Vec<DeploymentPlan> = resolved.into_iter().filter_map(|r| r.result.ok()).collect();
    jarkit::check_collisions(&plans).context("Conflicting declarations")?;

    if !ctx.quiet {
        println!();
        ui::dim(&format!("{total} declaration(s) valid"));
    }
    Ok(())
}

// ============================================================================
// Plan Command
// ============================================================================

pub fn plan(ctx: &Context, target: Option<&str>, json: bool) -> Result<()> {
    let loaded = load(ctx)?;
    let plans = valid_plans(resolve_all(&loaded))?;

    // Filter on the execution plan so targets behave like apply's
    let selected: Vec<DeploymentPlan> = plans
        .into_iter()
        .filter(|p| {
            p.clone()
                .into_execution_plan(Arc::clone(&loaded.fetcher))
                .matches_target(target)
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&selected).context("Failed to serialize plans")?;
        println!("{out}");
        return Ok(());
    }

    ui::header("Deployment Plan");
    if selected.is_empty() {
        ui::info("No matching declarations");
        return Ok(());
    }

    for plan in &selected {
        print_plan(plan);
    }
    Ok(())
}

fn print_plan(plan: &DeploymentPlan) {
    ui::section(&plan.name);
    ui::kv("target", &plan.target.display().to_string());
    match &plan.outcome {
        Outcome::Present { stage, file } => {
            ui::kv("ensure", "present");
            let mut source = stage.source.to_string();
            if stage.allow_insecure {
                source.push_str(&format!(" {}", "(insecure allowed)".yellow()));
            }
            ui::kv("source", &source);
            ui::kv("file", &describe_file(file));
        }
        Outcome::Absent { file, purge } => {
            ui::kv("ensure", "absent");
            ui::kv("remove", &describe_file(file));
            match purge {
                Some(dir) => ui::kv("purge", &describe_file(dir)),
                None => ui::kv("purge", "no"),
            }
        }
    }
}

fn describe_file(file: &ManagedFile) -> String {
    match &file.ensure {
        FileEnsure::File { owner, group, mode } => {
            format!("{} ({owner}:{group} {mode:04o})", file.path.display())
        }
        FileEnsure::Absent { force: true } => format!("{} (recursive)", file.path.display()),
        FileEnsure::Absent { force: false } => file.path.display().to_string(),
    }
}

// ============================================================================
// Status Command
// ============================================================================

pub fn status(ctx: &Context, target: Option<&str>) -> Result<()> {
    let loaded = load(ctx)?;
    let plans = valid_plans(resolve_all(&loaded))?;
    let plans = execution_plans(plans, &loaded.fetcher, target);

    ui::header("Jar Status");
    if plans.is_empty() {
        ui::info("No matching declarations");
        return Ok(());
    }

    let mut pending = 0;
    for plan in &plans {
        ui::section(&plan.name);
        for step in plan.steps() {
            let resource = step.resource.as_ref();
            let desired = resource.desired_state();
            let current = match resource.current_state() {
                Ok(state) => state,
                Err(e) => {
                    log::debug!("{}: {e:#}", resource.id());
                    ResourceState::Unknown
                }
            };

            if current == desired {
                println!("  {} {} {}", "✓".green(), resource.id(), current.to_string().dimmed());
            } else {
                pending += 1;
                println!(
                    "  {} {} {} → {}",
                    "✗".red(),
                    resource.id(),
                    current.to_string().dimmed(),
                    desired
                );
            }
        }
    }

    println!();
    if pending == 0 {
        ui::success("All jars converged");
    } else {
        ui::warn(&format!(
            "{pending} step(s) out of sync, run {} to converge",
            "tomcat-jar apply".bold()
        ));
    }
    Ok(())
}

// ============================================================================
// Diff Command
// ============================================================================

pub fn diff(ctx: &Context, target: Option<&str>) -> Result<()> {
    let loaded = load(ctx)?;
    let plans = valid_plans(resolve_all(&loaded))?;
    let plans = execution_plans(plans, &loaded.fetcher, target);

    ui::header("Diff");
    let diffs: Vec<ResourceDiff> = plans.iter().flat_map(compute_diffs).collect();
    print_diffs(&diffs);
    Ok(())
}

fn print_diffs(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        ui::success("Nothing to do, everything is up to date");
        return;
    }

    for (plan, group) in group_by_plan(diffs) {
        ui::section(&plan);
        for d in group {
            let marker = if d.is_addition() {
                "+".green()
            } else if d.is_removal() {
                "-".red()
            } else {
                "~".yellow()
            };
            println!("  {marker} {}", d.description);
            ui::dim(&format!("  {} → {}", d.current, d.desired));
            if !d.subscribes_to.is_empty() {
                ui::dim(&format!("  after {}", d.subscribes_to.join(", ")));
            }
        }
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!();
    println!(
        "  {} to add, {} to change, {} to remove",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
}

// ============================================================================
// Apply Command
// ============================================================================

/// Interactive confirmation through dialoguer
struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

pub fn apply(
    ctx: &Context,
    target: Option<&str>,
    dry_run: bool,
    yes: bool,
    jobs: usize,
) -> Result<()> {
    let loaded = load(ctx)?;
    let plans = valid_plans(resolve_all(&loaded))?;
    let plans = execution_plans(plans, &loaded.fetcher, target);
    run(ctx, plans, dry_run, yes, jobs)
}

/// Show the diff, then execute unless this is a dry run
fn run(
    ctx: &Context,
    plans: Vec<ExecutionPlan>,
    dry_run: bool,
    yes: bool,
    jobs: usize,
) -> Result<()> {
    if plans.is_empty() {
        ui::info("No matching declarations");
        return Ok(());
    }

    let diffs: Vec<ResourceDiff> = plans.iter().flat_map(compute_diffs).collect();
    if !ctx.quiet || diffs.is_empty() {
        ui::header("Changes");
        print_diffs(&diffs);
    }
    if diffs.is_empty() {
        return Ok(());
    }

    if dry_run {
        println!();
        ui::info("Dry run, no changes made");
        return Ok(());
    }

    let opts = ExecuteOptions {
        dry_run,
        jobs,
        verbose: ctx.verbose > 0,
    };
    let mut progress = ApplyProgress::new(ctx.quiet);

    let summary = if yes {
        execute(plans, opts, &mut progress, &mut AutoConfirm)?
    } else {
        println!();
        execute(plans, opts, &mut progress, &mut PromptConfirm)?
    };

    if summary.total() == summary.skipped && summary.skipped == diffs.len() {
        ui::warn("Cancelled");
        return Ok(());
    }

    print_summary(&summary);
    if !summary.is_success() {
        bail!("{} step(s) failed", summary.failed);
    }
    Ok(())
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Jars deployed successfully!", "✓".green().bold());
    } else {
        println!("  {} Deployment finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} steps created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} steps modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} steps removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} steps skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "steps".red());
    }
}

// ============================================================================
// Deploy Command
// ============================================================================

/// Build parameters from `key=value` pairs
fn params_from_pairs(pairs: &[(String, String)]) -> Result<JarParams> {
    let mut params = JarParams::default();
    for (key, value) in pairs {
        params.set(key, value).map_err(|e| anyhow!(e))?;
    }
    Ok(params)
}

pub fn deploy(ctx: &Context, args: DeployArgs) -> Result<()> {
    let loaded = load_or_default(ctx)?;
    let params = params_from_pairs(&args.params)?;
    let declaration = JarDeclaration::new(&args.name, params);

    let resolved = resolve_one(&declaration, &loaded);
    let plan = match resolved.result {
        Ok(plan) => plan,
        Err(e) => {
            report_error(&resolved.name, &e);
            return Err(e).with_context(|| format!("Cannot deploy {}", resolved.name));
        }
    };

    let plans = vec![plan.into_execution_plan(Arc::clone(&loaded.fetcher))];
    run(ctx, plans, args.dry_run, args.yes, 1)
}
