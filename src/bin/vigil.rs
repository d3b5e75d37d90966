//! vigil CLI: a thin `clap` front end over `vigil_core`. Every command
//! here only parses arguments, builds the engine types it needs, and
//! calls into the library; the actual analysis/fix/integration logic
//! lives in `vigil_core`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;

use vigil_core::analysis::{AnalyzerRegistry, FalsePositiveFilter, Issue, Orchestrator};
use vigil_core::core::config::EngineConfig;
use vigil_core::core::safety::SafetyEnvelope;
use vigil_core::fixes::{ApprovalDecision, ApprovalSession, DefenseInDepthValidator, FixGenerator};
use vigil_core::integration::package::{analyze_package, PackageFile, Role};
use vigil_core::integration::{connector, mapper, AutomatedPatcher, IntegrationMap};
use vigil_core::io::PersistenceStore;
use vigil_core::lang::registry::language_key_for_path;
use vigil_core::memory::{EmbeddingOracle, MemoryStore};
use vigil_core::walker::Scope;
use vigil_core::VigilError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A persistent, learning static-analysis engine for polyglot repositories.
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = VERSION)]
#[command(about = "vigil - persistent, learning static-analysis engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show hidden maintenance commands (`test`, `validate`, `consolidate`)
    /// in `--help`. They run normally even without this flag.
    #[arg(long, global = true)]
    show_all: bool,

    /// Alias for `--show-all`, kept for operators used to security-tool
    /// conventions.
    #[arg(long, global = true)]
    help_security: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a path for Issues.
    Analyze(AnalyzeArgs),
    /// Propose and/or apply fixes for a previously analyzed path.
    Fix(FixArgs),
    /// Ingest a batch of (issue, verdict) feedback records.
    Train(TrainArgs),
    /// Print memory/intelligence metrics.
    Stats(ConfigOnlyArgs),
    /// Improvement-cycle reports.
    Cycle(CycleArgs),
    /// Emit an Integration Map for an update package.
    #[command(name = "map-integration")]
    MapIntegration(MapIntegrationArgs),
    /// Run the Automated Patcher over a previously generated Integration Map.
    #[command(name = "execute-integration")]
    ExecuteIntegration(ExecuteIntegrationArgs),
    /// End-to-end map + execute pipeline for an update package.
    #[command(name = "auto-update")]
    AutoUpdate(AutoUpdateArgs),
    /// Historical run statistics.
    Metrics(ConfigOnlyArgs),

    /// Parse-check a single file without recording anything.
    #[command(hide = true)]
    Test(TestArgs),
    /// Validate a `vigil` configuration file.
    #[command(hide = true)]
    Validate(ConfigOnlyArgs),
    /// Prune stale/low-quality patterns from every language store.
    #[command(hide = true)]
    Consolidate(ConfigOnlyArgs),
}

#[derive(clap::Args)]
struct ConfigOnlyArgs {
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Directory or file to analyze.
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Skip recursive-improvement passes; analyze once and exit.
    #[arg(long)]
    quick: bool,
    /// Override the configured File Walker batch size.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Analyze only files changed relative to this git ref.
    #[arg(long)]
    git_diff: Option<String>,
    /// With `--git-diff`, restrict to staged files only (diff semantics
    /// are the Walker's; this is forwarded as part of the scope).
    #[arg(long)]
    staged_only: bool,
    /// Analyze only files changed since this commit.
    #[arg(long)]
    since_commit: Option<String>,
    /// Recursive-improvement depth (capped by the configured hard cap).
    #[arg(long, default_value_t = 0)]
    max_depth: u32,
    #[command(flatten)]
    config: ConfigOnlyArgs,
}

#[derive(clap::Args)]
struct FixArgs {
    /// Directory or file to analyze and fix.
    path: PathBuf,
    /// Prompt interactively for every non-`auto_safe` proposal (default).
    #[arg(long, conflicts_with = "auto_safe_only")]
    interactive: bool,
    /// Apply only `auto_safe` proposals; skip everything else without
    /// prompting.
    #[arg(long)]
    auto_safe_only: bool,
    /// Compute and print proposals without writing anything.
    #[arg(long)]
    dry_run: bool,
    #[command(flatten)]
    config: ConfigOnlyArgs,
}

#[derive(clap::Args)]
struct TrainArgs {
    /// JSON file: an array of `{issue, line_text, verdict}` records,
    /// where `verdict` is `"false_positive"` or `"manual_fix"`.
    feedback_file: PathBuf,
    #[command(flatten)]
    config: ConfigOnlyArgs,
}

#[derive(clap::Args)]
struct CycleArgs {
    #[command(subcommand)]
    report: CycleReport,
}

#[derive(Subcommand)]
enum CycleReport {
    /// Fixes applied outside the automated pipeline, from run history.
    ManualFixes(ConfigOnlyArgs),
    /// Issue-count deltas between consecutive runs.
    ScanComparison(ConfigOnlyArgs),
    /// Pattern counts and reuse rates per language.
    Patterns(ConfigOnlyArgs),
    /// Per-run pass/rollback/regression counters.
    CycleMetrics(ConfigOnlyArgs),
}

#[derive(clap::Args)]
struct MapIntegrationArgs {
    /// Root of the update package to integrate.
    package_path: PathBuf,
    /// Project the package would be integrated into.
    #[arg(default_value = ".")]
    project_root: PathBuf,
    /// Write the Integration Map JSON here instead of stdout.
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Command the Validation step should run after integration.
    #[arg(long)]
    validation_command: Option<String>,
    #[command(flatten)]
    config: ConfigOnlyArgs,
}

#[derive(clap::Args)]
struct ExecuteIntegrationArgs {
    /// Integration Map JSON produced by `map-integration`.
    map: PathBuf,
    /// Project the map applies to.
    #[arg(default_value = ".")]
    project_root: PathBuf,
    /// Validate the map and print what would happen without writing.
    #[arg(long)]
    dry_run: bool,
    /// Confirm every non-safe step interactively.
    #[arg(long)]
    interactive: bool,
    #[command(flatten)]
    config: ConfigOnlyArgs,
}

#[derive(clap::Args)]
struct AutoUpdateArgs {
    /// Root of the update package to integrate end-to-end.
    package_path: PathBuf,
    /// Project the package is integrated into.
    #[arg(default_value = ".")]
    project_root: PathBuf,
    /// Map and validate without writing anything.
    #[arg(long)]
    dry_run: bool,
    #[command(flatten)]
    config: ConfigOnlyArgs,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Single file to parse-check.
    path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let raw: Vec<String> = std::env::args().collect();
    if raw.iter().any(|a| a == "--show-all" || a == "--help-security") && raw.iter().any(|a| a == "--help" || a == "-h") {
        print_full_help();
        return Ok(());
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();

    let exit_code = match cli.command {
        Commands::Analyze(args) => cmd_analyze(args)?,
        Commands::Fix(args) => cmd_fix(args)?,
        Commands::Train(args) => cmd_train(args)?,
        Commands::Stats(args) => cmd_stats(args)?,
        Commands::Cycle(args) => cmd_cycle(args)?,
        Commands::MapIntegration(args) => cmd_map_integration(args)?,
        Commands::ExecuteIntegration(args) => cmd_execute_integration(args)?,
        Commands::AutoUpdate(args) => cmd_auto_update(args)?,
        Commands::Metrics(args) => cmd_metrics(args)?,
        Commands::Test(args) => cmd_test(args)?,
        Commands::Validate(args) => cmd_validate(args)?,
        Commands::Consolidate(args) => cmd_consolidate(args)?,
    };
    std::process::exit(exit_code);
}

fn print_full_help() {
    println!("vigil {VERSION} - persistent, learning static-analysis engine\n");
    println!("Commands:");
    for (name, about) in [
        ("analyze", "Analyze a path for Issues"),
        ("fix", "Propose and/or apply fixes"),
        ("train", "Ingest (issue, verdict) feedback"),
        ("stats", "Print memory/intelligence metrics"),
        ("cycle", "Improvement-cycle reports"),
        ("map-integration", "Emit an Integration Map"),
        ("execute-integration", "Run the Automated Patcher over a map"),
        ("auto-update", "End-to-end map + execute pipeline"),
        ("metrics", "Historical run statistics"),
        ("test", "(hidden) parse-check a single file"),
        ("validate", "(hidden) validate a configuration file"),
        ("consolidate", "(hidden) prune stale/low-quality patterns"),
    ] {
        println!("  {:<20} {about}", name);
    }
}

fn load_config(config: &ConfigOnlyArgs) -> anyhow::Result<EngineConfig> {
    match &config.config {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn open_memory_store(config: &EngineConfig) -> MemoryStore {
    let oracle = Arc::new(EmbeddingOracle::new(config.memory.embedding_model_path.as_deref()));
    MemoryStore::new(
        config.data_dir.clone(),
        oracle,
        Duration::from_millis(config.memory.search_timeout_ms),
    )
    .with_max_patterns(config.memory.max_patterns_per_language)
}

fn scope_from_analyze_args(args: &AnalyzeArgs) -> Scope {
    if let Some(commit) = &args.since_commit {
        Scope::GitDiff { base_ref: commit.clone() }
    } else if let Some(base_ref) = &args.git_diff {
        Scope::GitDiff { base_ref: base_ref.clone() }
    } else if args.path.is_file() {
        Scope::Explicit { paths: vec![args.path.clone()] }
    } else {
        Scope::FullTree
    }
}

fn record_run(
    persistence: &PersistenceStore,
    command: &str,
    issues: &[Issue],
    fixes_applied: usize,
    fixes_rejected: usize,
    rollbacks_performed: usize,
    passes_run: u32,
    regression_detected: bool,
) -> anyhow::Result<String> {
    let (run_id, run_dir) = persistence.begin_run()?;
    persistence.write_issues(&run_dir, issues)?;
    let mut issues_by_severity = HashMap::new();
    for issue in issues {
        *issues_by_severity.entry(format!("{:?}", issue.severity).to_lowercase()).or_insert(0) += 1;
    }
    persistence.append_run_summary(&vigil_core::io::RunSummary {
        run_id: run_id.clone(),
        timestamp: chrono::Utc::now(),
        command: command.to_string(),
        issues_by_severity,
        fixes_applied,
        fixes_rejected,
        rollbacks_performed,
        passes_run,
        regression_detected,
    })?;
    Ok(run_id)
}

fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let project_root = if args.path.is_file() {
        args.path.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        args.path.clone()
    };
    let envelope = match SafetyEnvelope::new(&project_root, &config.safety) {
        Ok(e) => e,
        Err(VigilError::BoundaryViolation { .. }) => {
            eprintln!("{}", style("boundary violation: analysis path escapes an allowed root").red());
            return Ok(2);
        }
        Err(err) => return Err(err.into()),
    };
    let memory = open_memory_store(&config);
    let orchestrator = Orchestrator::new(&envelope, &memory, config.orchestrator.clone());

    let scope = scope_from_analyze_args(&args);
    let batch_size = args.batch_size.unwrap_or(config.walker.batch_size);
    let max_depth = if args.quick { 0 } else { config.validate_recursion_depth(args.max_depth.max(config.orchestrator.max_depth))? };

    let result = orchestrator.run_recursive(&scope, batch_size, max_depth)?;

    let persistence = PersistenceStore::new(config.data_dir.clone());
    record_run(&persistence, "analyze", &result.issues, 0, 0, 0, result.passes_run, false)?;

    let critical = result.issues.iter().filter(|i| matches!(i.severity, vigil_core::analysis::Severity::Critical)).count();
    for issue in &result.issues {
        println!("{:?} {} {}:{} {}", issue.severity, issue.issue_type, issue.file_path, issue.line, issue.description);
    }
    println!(
        "{} issues found ({} critical), {} pass(es)",
        result.issues.len(),
        critical,
        result.passes_run
    );

    Ok(if critical > 0 { 1 } else { 0 })
}

fn cmd_fix(args: FixArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let project_root = if args.path.is_file() {
        args.path.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        args.path.clone()
    };
    let envelope = SafetyEnvelope::new(&project_root, &config.safety)?;
    let memory = open_memory_store(&config);
    let registry = AnalyzerRegistry::new();

    let scope = if args.path.is_file() {
        Scope::Explicit { paths: vec![args.path.clone()] }
    } else {
        Scope::FullTree
    };
    let walker = vigil_core::walker::FileWalker::new(&envelope, config.walker.clone());
    let batches = walker.discover(&scope)?;

    let mut proposals = Vec::new();
    for batch in batches {
        for path in batch.files {
            let resolved = envelope.resolve_in_project(&path)?;
            let Ok(analyzer) = registry.analyzer_for_file(&resolved) else { continue };
            let content = std::fs::read_to_string(&resolved)?;
            let handle = memory.open(analyzer.language_name())?;
            let issues = analyzer.analyze_file(&resolved.display().to_string(), &content, &handle)?;
            let lines: Vec<String> = content.lines().map(str::to_string).collect();
            let filtered = FalsePositiveFilter::filter(&handle, issues, &lines);
            for issue in &filtered {
                let Some(line_text) = lines.get(issue.line.saturating_sub(1)) else { continue };
                match FixGenerator::generate(issue, &resolved.display().to_string(), line_text, &handle, &config.fixes) {
                    Ok(Some(proposal)) => proposals.push(proposal),
                    Ok(None) => {}
                    Err(err) => eprintln!("{}", style(format!("rejected at classification: {err}")).yellow()),
                }
            }
        }
    }

    if proposals.is_empty() {
        println!("no fix proposals found");
        return Ok(0);
    }

    if args.dry_run {
        for proposal in &proposals {
            println!("{} [{}]\n{}", proposal.target_file, proposal.template_id, proposal.preview());
        }
        return Ok(0);
    }

    let mut decisions = Vec::new();
    let mut by_language: HashMap<&'static str, Vec<vigil_core::fixes::FixProposal>> = HashMap::new();
    for proposal in proposals {
        let language = registry
            .analyzer_for_file(Path::new(&proposal.target_file))
            .map(|a| a.language_name())
            .unwrap_or("python");
        by_language.entry(language).or_default().push(proposal);
    }
    for (language, language_proposals) in by_language {
        let handle = memory.open(language)?;
        let mut session = ApprovalSession::new(&handle);
        if args.auto_safe_only {
            session = session.auto_safe_only();
        }
        decisions.extend(session.run(&language_proposals)?);
    }

    let validator = DefenseInDepthValidator::new(&config.fixes);
    let patcher = AutomatedPatcher::new(&envelope, &config.fixes, args.interactive);
    let backup_dir = std::env::temp_dir().join("vigil-backups").join(uuid::Uuid::new_v4().to_string());
    let ctx = patcher.apply_fixes(&decisions, &backup_dir, &validator)?;

    let accepted = decisions.iter().filter(|(_, d)| *d == ApprovalDecision::Accept).count();
    let rejected = decisions.iter().filter(|(_, d)| *d == ApprovalDecision::Reject).count();
    println!("{} fixes applied, {} rejected, {} files committed", accepted, rejected, ctx.committed.len());

    let persistence = PersistenceStore::new(config.data_dir.clone());
    record_run(&persistence, "fix", &[], accepted, rejected, 0, 1, false)?;

    Ok(0)
}

fn cmd_train(args: TrainArgs) -> anyhow::Result<i32> {
    #[derive(serde::Deserialize)]
    struct FeedbackRecord {
        issue: Issue,
        line_text: String,
        verdict: String,
    }

    let config = load_config(&args.config)?;
    let memory = open_memory_store(&config);
    let bytes = std::fs::read(&args.feedback_file)?;
    let records: Vec<FeedbackRecord> = serde_json::from_slice(&bytes)?;

    let mut ingested = 0;
    for record in &records {
        let Some(language) = language_key_for_path(Path::new(&record.issue.file_path)) else { continue };
        let handle = memory.open(language)?;
        match record.verdict.as_str() {
            "false_positive" => FalsePositiveFilter::confirm_false_positive(&handle, &record.issue, &record.line_text)?,
            "manual_fix" => FalsePositiveFilter::record_manual_fix(&handle, &record.issue, &record.line_text)?,
            other => {
                eprintln!("skipping record with unknown verdict '{other}'");
                continue;
            }
        }
        ingested += 1;
    }
    println!("ingested {ingested} of {} feedback record(s)", records.len());
    Ok(0)
}

fn cmd_stats(args: ConfigOnlyArgs) -> anyhow::Result<i32> {
    let config = load_config(&args)?;
    let memory = open_memory_store(&config);
    for language in vigil_core::lang::SUPPORTED_LANGUAGES {
        let handle = memory.open(language)?;
        let patterns = handle.all_patterns();
        let total: u64 = patterns.iter().map(|p| p.success_count + p.failure_count).sum();
        let successes: u64 = patterns.iter().map(|p| p.success_count).sum();
        let reuse_rate = if total == 0 { 0.0 } else { successes as f64 / total as f64 };
        let namespaces = handle.namespaces();
        let accepted = namespaces.intelligent_fix_generator.values().filter(|v| v.get("outcome").and_then(|o| o.as_str()) == Some("accepted")).count();
        let decided = namespaces.intelligent_fix_generator.len();
        let approval_rate = if decided == 0 { 0.0 } else { accepted as f64 / decided as f64 };
        println!(
            "{language}: {} patterns, reuse_rate={reuse_rate:.2}, approval_rate={approval_rate:.2}",
            patterns.len()
        );
    }

    let persistence = PersistenceStore::new(config.data_dir.clone());
    let history = persistence.read_history()?;
    let regressions = history.iter().filter(|r| r.regression_detected).count();
    let regression_rate = if history.is_empty() { 0.0 } else { regressions as f64 / history.len() as f64 };
    println!("{} recorded run(s), regression_rate={regression_rate:.2}", history.len());
    Ok(0)
}

fn cmd_metrics(args: ConfigOnlyArgs) -> anyhow::Result<i32> {
    let config = load_config(&args)?;
    let persistence = PersistenceStore::new(config.data_dir.clone());
    let history = persistence.read_history()?;
    for run in &history {
        println!(
            "{} [{}] passes={} applied={} rejected={} rollbacks={} regression={}",
            run.run_id, run.command, run.passes_run, run.fixes_applied, run.fixes_rejected, run.rollbacks_performed, run.regression_detected
        );
    }
    Ok(0)
}

fn cmd_cycle(args: CycleArgs) -> anyhow::Result<i32> {
    match args.report {
        CycleReport::ManualFixes(c) => {
            let config = load_config(&c)?;
            let memory = open_memory_store(&config);
            for language in vigil_core::lang::SUPPORTED_LANGUAGES {
                let handle = memory.open(language)?;
                let count = handle.namespaces().issue_validations.len();
                println!("{language}: {count} manually recorded decisions");
            }
            Ok(0)
        }
        CycleReport::ScanComparison(c) => {
            let config = load_config(&c)?;
            let persistence = PersistenceStore::new(config.data_dir.clone());
            let history = persistence.read_history()?;
            for pair in history.windows(2) {
                let before: usize = pair[0].issues_by_severity.values().sum();
                let after: usize = pair[1].issues_by_severity.values().sum();
                println!("{} -> {}: {before} -> {after} issues", pair[0].run_id, pair[1].run_id);
            }
            Ok(0)
        }
        CycleReport::Patterns(c) => cmd_stats(c),
        CycleReport::CycleMetrics(c) => cmd_metrics(c),
    }
}

fn load_package_files(package_path: &Path) -> anyhow::Result<Vec<PackageFile>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(package_path).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(package_path).unwrap_or(entry.path());
        if relative.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
        let path = relative.to_string_lossy().to_string();
        let language = language_key_for_path(entry.path()).map(str::to_string);
        files.push(PackageFile {
            path,
            content,
            language,
            role: Role::Utility,
            internal_dependencies: Vec::new(),
            external_dependencies: Vec::new(),
        });
    }
    Ok(files)
}

fn build_map(package_path: &Path, project_root: &Path, validation_command: Option<&str>) -> anyhow::Result<IntegrationMap> {
    let files = load_package_files(package_path)?;
    let graph = analyze_package(files);

    let mut orphan_caps = Vec::new();
    let mut target_caps = Vec::new();
    for entry_point in graph.entry_points.iter() {
        let Some(file) = graph.files.iter().find(|f| &f.path == entry_point) else { continue };
        let Some(language) = &file.language else { continue };
        if let Ok(mut adapter) = vigil_core::lang::adapter_for_language(language) {
            if let Ok(index) = adapter.parse(&file.path, &file.content) {
                orphan_caps.push(connector::capabilities(&file.path, &index));
            }
        }
    }
    for entry in walkdir::WalkDir::new(project_root).max_depth(6).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = language_key_for_path(entry.path()) else { continue };
        let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
        let Ok(mut adapter) = vigil_core::lang::adapter_for_language(language) else { continue };
        let Ok(index) = adapter.parse(&entry.path().display().to_string(), &content) else { continue };
        target_caps.push(connector::capabilities(&entry.path().display().to_string(), &index));
    }

    let connector_config = vigil_core::core::config::ConnectorConfig::default();
    let suggestions = connector::suggest_connections(&orphan_caps, &target_caps, &connector_config);

    Ok(mapper::build_integration_map(&graph, &suggestions, &project_root.display().to_string(), validation_command))
}

fn cmd_map_integration(args: MapIntegrationArgs) -> anyhow::Result<i32> {
    let _config = load_config(&args.config)?;
    let map = build_map(&args.package_path, &args.project_root, args.validation_command.as_deref())?;
    let json = serde_json::to_string_pretty(&map)?;
    match &args.out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(0)
}

fn cmd_execute_integration(args: ExecuteIntegrationArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let bytes = std::fs::read(&args.map)?;
    let map: IntegrationMap = serde_json::from_slice(&bytes)?;

    if args.dry_run {
        println!(
            "{} step(s), risk={:?}, estimated {}s",
            map.steps.len(),
            map.risk_assessment,
            map.total_estimated_time_seconds
        );
        return Ok(0);
    }

    let envelope = SafetyEnvelope::new(&args.project_root, &config.safety)?;
    let patcher = AutomatedPatcher::new(&envelope, &config.fixes, args.interactive);
    let backup_dir = std::env::temp_dir().join("vigil-backups").join(uuid::Uuid::new_v4().to_string());

    match patcher.execute(&map, &backup_dir) {
        Ok(ctx) => {
            println!("{} file(s) committed", ctx.committed.len());
            let persistence = PersistenceStore::new(config.data_dir.clone());
            record_run(&persistence, "execute-integration", &[], ctx.committed.len(), 0, 0, 1, false)?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("{}", style(format!("integration failed: {err}")).red());
            let persistence = PersistenceStore::new(config.data_dir.clone());
            record_run(&persistence, "execute-integration", &[], 0, 0, 1, 1, false)?;
            Ok(2)
        }
    }
}

fn cmd_auto_update(args: AutoUpdateArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let map = build_map(&args.package_path, &args.project_root, None)?;

    if args.dry_run {
        println!(
            "{} step(s), risk={:?}, estimated {}s",
            map.steps.len(),
            map.risk_assessment,
            map.total_estimated_time_seconds
        );
        return Ok(0);
    }

    let envelope = SafetyEnvelope::new(&args.project_root, &config.safety)?;
    let patcher = AutomatedPatcher::new(&envelope, &config.fixes, false);
    let backup_dir = std::env::temp_dir().join("vigil-backups").join(uuid::Uuid::new_v4().to_string());
    let ctx = patcher.execute(&map, &backup_dir)?;
    println!("{} file(s) committed", ctx.committed.len());

    let persistence = PersistenceStore::new(config.data_dir.clone());
    record_run(&persistence, "auto-update", &[], ctx.committed.len(), 0, 0, 1, false)?;
    Ok(0)
}

fn cmd_test(args: TestArgs) -> anyhow::Result<i32> {
    let Some(language) = language_key_for_path(&args.path) else {
        eprintln!("unsupported language for {}", args.path.display());
        return Ok(2);
    };
    let mut adapter = vigil_core::lang::adapter_for_language(language)?;
    let content = std::fs::read_to_string(&args.path)?;
    let index = adapter.parse(&args.path.display().to_string(), &content)?;
    match index.parse_error {
        Some(message) => {
            println!("parse error: {message}");
            Ok(1)
        }
        None => {
            println!("{} parses cleanly ({} entities)", args.path.display(), index.entities.len());
            Ok(0)
        }
    }
}

fn cmd_validate(args: ConfigOnlyArgs) -> anyhow::Result<i32> {
    match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(_) => {
                println!("{} is valid", path.display());
                Ok(0)
            }
            Err(err) => {
                eprintln!("{}", style(format!("invalid configuration: {err}")).red());
                Ok(1)
            }
        },
        None => {
            println!("no --config given; defaults are always valid");
            Ok(0)
        }
    }
}

fn cmd_consolidate(args: ConfigOnlyArgs) -> anyhow::Result<i32> {
    let config = load_config(&args)?;
    let memory = open_memory_store(&config);
    let mut total_pruned = 0;
    for language in vigil_core::lang::SUPPORTED_LANGUAGES {
        let handle = memory.open(language)?;
        let pruned = handle.prune(config.memory.prune_quality_threshold, config.memory.prune_stale_days)?;
        total_pruned += pruned;
        if pruned > 0 {
            println!("{language}: pruned {pruned} pattern(s)");
        }
    }
    println!("{total_pruned} pattern(s) pruned in total");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn analyze_defaults_to_current_directory() {
        let cli = Cli::parse_from(["vigil", "analyze"]);
        match cli.command {
            Commands::Analyze(args) => assert_eq!(args.path, PathBuf::from(".")),
            _ => panic!("expected Analyze"),
        }
    }

    #[test]
    fn fix_parses_auto_safe_only() {
        let cli = Cli::parse_from(["vigil", "fix", "src/", "--auto-safe-only"]);
        match cli.command {
            Commands::Fix(args) => {
                assert_eq!(args.path, PathBuf::from("src/"));
                assert!(args.auto_safe_only);
            }
            _ => panic!("expected Fix"),
        }
    }

    #[test]
    fn hidden_commands_still_parse() {
        let cli = Cli::parse_from(["vigil", "validate", "--config", "vigil.yml"]);
        match cli.command {
            Commands::Validate(args) => assert_eq!(args.config, Some(PathBuf::from("vigil.yml"))),
            _ => panic!("expected Validate"),
        }
    }

    #[test]
    fn cycle_subcommand_parses() {
        let cli = Cli::parse_from(["vigil", "cycle", "patterns"]);
        match cli.command {
            Commands::Cycle(args) => assert!(matches!(args.report, CycleReport::Patterns(_))),
            _ => panic!("expected Cycle"),
        }
    }
}
