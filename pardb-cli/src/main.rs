//! Command-line front end for the parity vault. Thin by design: every piece
//! of logic beyond flag parsing and reporting lives in `pardb-core`.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use pardb_core::context::{apply_niceness, parse_par2_options, Context, ParityMode};
use pardb_core::hash::HashAlgo;
use pardb_core::index::Index;
use pardb_core::lock::VaultLock;
use pardb_core::par2child::resolve_binary;
use pardb_core::sizes::parse_size;
use pardb_core::vault::Vault;
use pardb_core::walk::WalkFilters;
use pardb_core::{clean, hash_pipeline, parity_pipeline, scan, verify};
use std::path::PathBuf;
use std::time::Duration;

/// Maintain a content-addressed parity vault over a directory tree.
#[derive(Parser)]
#[command(name = "pardb", version, about = "Content-addressed parity vault")]
struct Cli {
    /// Directory to scan.
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Base directory for the `.pardatabase` vault (defaults to `target`).
    #[arg(long)]
    basedir: Option<PathBuf>,

    /// Digest family used for both file and artifact hashing.
    #[arg(long, default_value = "sha512")]
    hash: String,

    /// Minimum file size eligible for scanning (hashing).
    #[arg(long, default_value = "1")]
    min_scan: String,
    /// Maximum file size eligible for scanning (hashing).
    #[arg(long)]
    max_scan: Option<String>,
    /// Minimum file size eligible for parity protection.
    #[arg(long, default_value = "1")]
    min_par: String,
    /// Maximum file size eligible for parity protection.
    #[arg(long)]
    max_par: Option<String>,

    /// Pass-through options string for the parity tool (e.g. "-r10 -n4").
    #[arg(long, default_value = "")]
    options: String,

    /// Force sequential hash/parity mode instead of the default parallel race.
    #[arg(long)]
    sequential: bool,

    /// Work around parity tools that mishandle single-character base names.
    #[arg(long)]
    singlecharfix: bool,

    /// Sleep `delay * read_elapsed` after each hash, for thermal pacing.
    #[arg(long)]
    delay: Option<f64>,

    /// Best-effort reduction of this process's I/O/CPU priority.
    #[arg(long)]
    nice: bool,

    /// Plan only; make no filesystem or index changes.
    #[arg(long)]
    dry_run: bool,

    /// Re-hash every indexed file and report mismatches instead of scanning.
    #[arg(long)]
    verify: bool,

    /// Repair a single file from vault artifacts instead of scanning.
    #[arg(long)]
    repair: Option<PathBuf>,

    /// Drop dead records and orphaned vault entries, then exit.
    #[arg(long)]
    clean: bool,

    /// Name of the `par2`-compatible binary to invoke.
    #[arg(long, default_value = "par2")]
    parity_tool: String,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Exit codes:
/// - `0`: success.
/// - `1`: usage error (bad hash name, missing parity tool, unreadable
///   target, unwritable basedir).
/// - `2`: verification found corrupted or unverifiable files.
/// - `3`: repair failed.
/// - `4`: a normal scan run completed but logged per-file I/O or parity-tool
///   errors along the way (run still saved the index; see §7 error policy).
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pardb: error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli
        .target
        .canonicalize()
        .with_context(|| format!("target directory not readable: {}", cli.target.display()))?;
    if !root.is_dir() {
        bail!("target is not a directory: {}", root.display());
    }

    let base_root = cli.basedir.clone().unwrap_or_else(|| root.clone());
    let basedir = base_root.join(".pardatabase");
    std::fs::create_dir_all(&basedir)
        .with_context(|| format!("basedir not writable: {}", basedir.display()))?;

    let algo = HashAlgo::parse(&cli.hash)?;

    // The parity tool is required up front for every invocation, mirroring
    // `pardatabase.py`'s unconditional `shutil.which('par2')` gate ahead of
    // its own argument dispatch.
    resolve_binary(&cli.parity_tool)
        .with_context(|| format!("install '{}' to continue", cli.parity_tool))?;

    let _lock = VaultLock::acquire(&basedir)?;

    let mut ctx = Context::new(root.clone(), basedir.clone());
    ctx.algo = algo;
    ctx.parity_binary = cli.parity_tool.clone();
    ctx.parity_mode = if cli.sequential { ParityMode::Sequential } else { ParityMode::Parallel };
    ctx.singlecharfix = cli.singlecharfix;
    ctx.par2_options = parse_par2_options(&cli.options);
    ctx.delay_factor = cli.delay;
    ctx.dry_run = cli.dry_run;

    if cli.nice {
        apply_niceness();
    }

    let mut index = Index::load(&basedir)?;
    index.meta.hash = algo.name().to_string();
    ctx.truncate_width = index.meta.truncate;

    let vault_obj = Vault::open(&basedir, algo, ctx.truncate_width)?;

    if cli.clean {
        let report = clean::clean(&ctx, &mut index, &vault_obj);
        index.save(&basedir, Duration::ZERO)?;
        println!(
            "cleaned: {} dead record(s), {} vault entr(y/ies) freed, {} orphan(s) removed",
            report.records_dropped, report.vault_entries_cleaned, report.orphans_cleaned
        );
        return Ok(0);
    }

    if let Some(target) = &cli.repair {
        let rel = relative_to_root(&root, target)?;
        let ok = verify::repair(&ctx, &mut index, &vault_obj, &rel)?;
        index.save(&basedir, Duration::ZERO)?;
        if ok {
            println!("repaired {rel}");
            return Ok(0);
        }
        eprintln!("repair failed for {rel}");
        return Ok(3);
    }

    if cli.verify {
        let report = verify::verify(&ctx, &mut index, &vault_obj);
        index.save(&basedir, Duration::ZERO)?;
        println!(
            "verify: {} ok, {} corrupted, {} missing, {} updated-without-rescan, {} bad vault digest(s), {} no digest",
            report.ok,
            report.corrupted.len(),
            report.missing.len(),
            report.updated_without_rescan.len(),
            report.bad_vault_digests.len(),
            report.no_digest.len()
        );
        for path in &report.corrupted {
            println!("  CORRUPTED: {path}");
        }
        if report.corrupted.is_empty() && report.bad_vault_digests.is_empty() {
            return Ok(0);
        }
        return Ok(2);
    }

    let scan_filters = WalkFilters {
        min_size: parse_size(&cli.min_scan)?.max(1),
        max_size: cli.max_scan.as_deref().map(parse_size).transpose()?,
        ..WalkFilters::default()
    };
    let parity_filters = WalkFilters {
        min_size: parse_size(&cli.min_par)?.max(1),
        max_size: cli.max_par.as_deref().map(parse_size).transpose()?,
        ..WalkFilters::default()
    };

    let plan = scan::plan(&mut index.records, &index.vault, &root, &scan_filters, &parity_filters);
    println!(
        "plan: {} file(s) need hashing, {} file(s) need parity",
        plan.needs_hash.len(),
        plan.needs_parity.len()
    );

    if cli.dry_run {
        for path in &plan.needs_hash {
            println!("  hash:   {path}");
        }
        for path in &plan.needs_parity {
            println!("  parity: {path}");
        }
        index.save(&basedir, Duration::ZERO)?;
        return Ok(0);
    }

    let hash_report = hash_pipeline::run(&ctx, &mut index, &plan.needs_hash)?;
    let mut had_errors = hash_report.io_errors > 0;
    println!("hashed {} file(s), {} io error(s)", hash_report.hashed, hash_report.io_errors);
    if hash_report.interrupted {
        index.save(&basedir, Duration::ZERO)?;
        return Ok(4);
    }

    let parity_report = parity_pipeline::run(&mut ctx, &mut index, &vault_obj, &plan.needs_parity)?;
    had_errors = had_errors || parity_report.tool_failed > 0 || parity_report.io_errors > 0;
    println!(
        "parity: {} installed, {} deduped, {} tool failure(s), {} io error(s){}",
        parity_report.installed,
        parity_report.deduped,
        parity_report.tool_failed,
        parity_report.io_errors,
        if parity_report.degraded_to_sequential { " (degraded to sequential)" } else { "" }
    );

    index.save(&basedir, Duration::ZERO)?;
    if parity_report.interrupted {
        return Ok(4);
    }
    Ok(if had_errors { 4 } else { 0 })
}

fn relative_to_root(root: &std::path::Path, target: &std::path::Path) -> Result<String> {
    let abs = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()?.join(target)
    };
    let rel = pathdiff::diff_paths(&abs, root)
        .with_context(|| format!("{} is not under {}", target.display(), root.display()))?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}
