//! apiqa CLI - declarative HTTP API testing with OpenAPI contract checks

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use apiqa_core::{CoverageReport, Scenario, VarMap};
use apiqa_runner::{CancelToken, Runner, Validator, diff_documents};

#[derive(Parser)]
#[command(name = "apiqa")]
#[command(about = "Declarative HTTP API test runner with OpenAPI contract checks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (failure details even on pass, debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a test suite against a live endpoint
    Run {
        /// Path to the YAML/JSON suite document
        #[arg(long)]
        spec: PathBuf,

        /// Output directory for artifacts
        #[arg(long, default_value = "reports")]
        out: PathBuf,

        /// Optional suite name override
        #[arg(long)]
        name: Option<String>,

        /// JSON env files; later files override earlier ones
        #[arg(long, value_delimiter = ',')]
        env: Vec<PathBuf>,

        /// Write JSON results. Use --json=false to disable.
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        json: bool,

        /// Write JUnit XML results
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        junit: bool,

        /// Write HTML report
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        html: bool,

        /// OpenAPI spec for contract checks & coverage (overrides the
        /// suite's own `openapi` field)
        #[arg(long)]
        openapi: Option<PathBuf>,

        /// Fail when coverage percent is below this threshold
        #[arg(long)]
        coverage_min: Option<f64>,

        /// Number of scenarios to execute in parallel
        #[arg(long, default_value_t = 1)]
        parallel: usize,

        /// Stop after the first failing scenario (forces --parallel=1)
        #[arg(long)]
        fail_fast: bool,

        /// Comma-separated tags to include (OR semantics)
        #[arg(long)]
        include_tags: Option<String>,

        /// Comma-separated tags to exclude (OR semantics)
        #[arg(long)]
        exclude_tags: Option<String>,
    },

    /// Compare two OpenAPI specs at the operation level
    Diff {
        /// Path to OpenAPI A
        #[arg(long)]
        a: PathBuf,

        /// Path to OpenAPI B
        #[arg(long)]
        b: PathBuf,

        /// Output directory for contract-diff.json
        #[arg(long, default_value = "reports")]
        out: PathBuf,
    },

    /// Export JSON Schema for the results interchange format
    Schema,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            spec,
            out,
            name,
            env,
            json,
            junit,
            html,
            openapi,
            coverage_min,
            parallel,
            fail_fast,
            include_tags,
            exclude_tags,
        } => {
            let data = std::fs::read(&spec)
                .with_context(|| format!("read spec {}", spec.display()))?;
            let mut suite = apiqa_core::parse_bytes(&data).context("parse")?;
            if let Some(name) = name {
                suite.name = name;
            }

            if include_tags.is_some() || exclude_tags.is_some() {
                let include = split_csv(include_tags.as_deref().unwrap_or(""));
                let exclude = split_csv(exclude_tags.as_deref().unwrap_or(""));
                suite.scenarios = filter_by_tags(suite.scenarios, &include, &exclude);
                if suite.scenarios.is_empty() {
                    bail!("no scenarios left after tag filtering");
                }
            }

            let base_vars = if env.is_empty() {
                VarMap::new()
            } else {
                apiqa_core::load_json_files(&env).context("load env")?
            };

            // Flag wins; else the suite's openapi field, relative to the
            // suite file.
            let openapi_file = openapi.or_else(|| {
                suite.openapi.as_ref().map(|rel| {
                    let p = Path::new(rel);
                    if p.is_absolute() {
                        p.to_path_buf()
                    } else {
                        spec.parent().unwrap_or(Path::new(".")).join(p)
                    }
                })
            });

            let mut runner = Runner::new()
                .context("http client")?
                .with_vars(base_vars)
                .with_parallel(parallel)
                .with_fail_fast(fail_fast);
            if let Some(path) = &openapi_file {
                let validator = Validator::load_from_file(path).context("openapi load")?;
                runner = runner.with_contract(validator);
            }

            let res = runner.run_suite(&CancelToken::new(), &suite);

            std::fs::create_dir_all(&out)
                .with_context(|| format!("mkdir {}", out.display()))?;

            let mut json_path = None;
            if json {
                let path = out.join("results.json");
                let mut f = std::fs::File::create(&path)
                    .with_context(|| format!("create {}", path.display()))?;
                report::write_json(&mut f, &res)?;
                json_path = Some(path);
            }
            if junit {
                let path = out.join("junit.xml");
                let mut f = std::fs::File::create(&path)
                    .with_context(|| format!("create {}", path.display()))?;
                report::write_junit(&mut f, &suite.name, &res)?;
            }
            if html {
                let path = out.join("report.html");
                let mut f = std::fs::File::create(&path)
                    .with_context(|| format!("create {}", path.display()))?;
                match &json_path {
                    Some(jp) => report::write_html_from_json_path(&mut f, &suite.name, jp)?,
                    None => report::write_html(&mut f, &suite.name, &res)?,
                }
            }

            if let Some(validator) = runner.validator() {
                let coverage =
                    CoverageReport::compute(&validator.operations(), &runner.covered());
                let path = out.join("coverage.json");
                let mut f = std::fs::File::create(&path)
                    .with_context(|| format!("create {}", path.display()))?;
                report::write_coverage(&mut f, &coverage)?;

                if let Some(min) = coverage_min {
                    if !coverage.passes_gate(min) {
                        eprintln!(
                            "coverage gate failed: got {:.2}%, need >= {min:.2}%",
                            coverage.percent
                        );
                        println!("FAIL");
                        return Ok(1);
                    }
                }
            }

            if !res.passed || cli.verbose {
                for sc in &res.scenarios {
                    if sc.passed {
                        continue;
                    }
                    eprintln!("\nScenario FAILED: {}", sc.name);
                    for (i, st) in sc.steps.iter().enumerate() {
                        if st.passed {
                            continue;
                        }
                        eprintln!("  Step {}: status={}", i + 1, st.status_code);
                        for e in &st.errors {
                            eprintln!("    - {e}");
                        }
                    }
                }
            }

            if res.passed {
                println!("PASS");
                Ok(0)
            } else {
                println!("FAIL");
                Ok(1)
            }
        }

        Commands::Diff { a, b, out } => {
            std::fs::create_dir_all(&out)
                .with_context(|| format!("mkdir {}", out.display()))?;
            let doc_a = Validator::load_from_file(&a).context("openapi A load")?;
            let doc_b = Validator::load_from_file(&b).context("openapi B load")?;

            let rep = diff_documents(doc_a.document(), doc_b.document());

            let path = out.join("contract-diff.json");
            let mut f = std::fs::File::create(&path)
                .with_context(|| format!("create {}", path.display()))?;
            report::write_diff(&mut f, &rep)?;

            println!("Contract diff ({} → {})", a.display(), b.display());
            if rep.added.is_empty() && rep.removed.is_empty() && rep.changed_status.is_empty() {
                println!("  No changes.");
            } else {
                if !rep.added.is_empty() {
                    println!("  Added:");
                    for op in &rep.added {
                        println!("    + {} {}", op.method, op.path);
                    }
                }
                if !rep.removed.is_empty() {
                    println!("  Removed:");
                    for op in &rep.removed {
                        println!("    - {} {}", op.method, op.path);
                    }
                }
                if !rep.changed_status.is_empty() {
                    println!("  Status changes:");
                    for ch in &rep.changed_status {
                        println!(
                            "    * {} {}: {:?} -> {:?}",
                            ch.method, ch.path, ch.a, ch.b
                        );
                    }
                }
            }
            println!("wrote {}", path.display());
            Ok(0)
        }

        Commands::Schema => {
            println!("{}", apiqa_core::result_schema());
            Ok(0)
        }
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// OR semantics, case-insensitive: keep scenarios matching any include tag
/// (when includes are given) and drop scenarios matching any exclude tag.
fn filter_by_tags(scenarios: Vec<Scenario>, include: &[String], exclude: &[String]) -> Vec<Scenario> {
    if include.is_empty() && exclude.is_empty() {
        return scenarios;
    }
    let lower = |tags: &[String]| -> Vec<String> {
        tags.iter().map(|t| t.to_lowercase()).collect()
    };
    let include = lower(include);
    let exclude = lower(exclude);
    let has_any = |tags: &[String], set: &[String]| -> bool {
        tags.iter().any(|t| set.contains(&t.to_lowercase()))
    };

    scenarios
        .into_iter()
        .filter(|sc| {
            if !include.is_empty() && !has_any(&sc.tags, &include) {
                return false;
            }
            if !exclude.is_empty() && has_any(&sc.tags, &exclude) {
                return false;
            }
            true
        })
        .collect()
}
