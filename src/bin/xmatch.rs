use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use xmatch::catalogs::{load_reference_catalog_from_file, load_target_catalogs_from_files};
use xmatch::crossmatch::{cross_match, write_associations_to_file, CrossMatchConfig};
use xmatch::summary::{
    load_tce_files, load_toi_file, summarize_targets, write_summary_to_file, TCE_PREAMBLE_LINES,
    TOI_PREAMBLE_LINES,
};

#[derive(Parser)]
#[command(name = "xmatch")]
#[command(about = "Epoch-corrected one-to-one catalog cross-match", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-match a reference catalog against one or more target lists
    Match {
        /// Reference catalog CSV (id, ra, dec, pm_ra, pm_dec, magnitude)
        #[arg(long)]
        reference: PathBuf,

        /// Target list CSV; may be given several times
        #[arg(long = "target", required = true)]
        targets: Vec<PathBuf>,

        /// Association table to write
        #[arg(short, long)]
        output: PathBuf,

        /// JSON configuration; missing fields keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write per-stage counts as JSON
        #[arg(long)]
        diagnostics: Option<PathBuf>,

        /// Preamble lines before the reference header
        #[arg(long, default_value = "0")]
        reference_skip_lines: usize,

        /// Preamble lines before each target-list header
        #[arg(long, default_value = "0")]
        target_skip_lines: usize,
    },

    /// Summarise TCE counts and TOI comment flags per TIC id
    Summarize {
        /// TOI catalog CSV
        #[arg(long)]
        toi: PathBuf,

        /// Sector tcestats CSV; may be given several times
        #[arg(long = "tce", required = true)]
        tces: Vec<PathBuf>,

        /// Summary table to write
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = TOI_PREAMBLE_LINES)]
        toi_skip_lines: usize,

        #[arg(long, default_value_t = TCE_PREAMBLE_LINES)]
        tce_skip_lines: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Match {
            reference,
            targets,
            output,
            config,
            diagnostics,
            reference_skip_lines,
            target_skip_lines,
        } => {
            let config = match config {
                Some(path) => CrossMatchConfig::from_json_file(&path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => CrossMatchConfig::default(),
            };
            info!("Config: {:?}", config);

            let reference_catalog =
                load_reference_catalog_from_file(&reference, reference_skip_lines)
                    .with_context(|| format!("loading reference catalog {}", reference.display()))?;
            let target_catalog = load_target_catalogs_from_files(&targets, target_skip_lines)
                .context("loading target lists")?;

            let result = cross_match(&reference_catalog.records, &target_catalog.records, &config)
                .context("cross-match failed")?;

            write_associations_to_file(&output, &result.associations)
                .with_context(|| format!("writing {}", output.display()))?;

            if let Some(path) = diagnostics {
                let report = serde_json::json!({
                    "config": config,
                    "reference_load": reference_catalog.stats,
                    "target_load": target_catalog.stats,
                    "crossmatch": result.diagnostics,
                });
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("writing diagnostics {}", path.display()))?;
                info!("Wrote diagnostics to {}", path.display());
            }
        }

        Commands::Summarize {
            toi,
            tces,
            output,
            toi_skip_lines,
            tce_skip_lines,
        } => {
            let toi_rows = load_toi_file(&toi, toi_skip_lines)
                .with_context(|| format!("loading TOI catalog {}", toi.display()))?;
            let tce_rows = load_tce_files(&tces, tce_skip_lines).context("loading TCE files")?;
            let summary = summarize_targets(&toi_rows, &tce_rows);
            write_summary_to_file(&output, &summary)
                .with_context(|| format!("writing {}", output.display()))?;
        }
    }
    Ok(())
}
