use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relief_format::{
    ascii_stl, load_config, load_job, save_config, stl_file_name, write_binary_stl, Manifest, ManifestFile,
};
use relief_pipeline::{run_batch, CancelToken, PipelineConfig, PipelineError, TileInput, TileOutput};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "relief", version, about = "Turn terrain tiles into printable solids")]
struct Args {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every tile of a job file.
    Run {
        /// Job file (config plus inline tiles).
        job: PathBuf,

        /// Extra tile files, loaded one at a time after the job's own tiles.
        #[arg(long)]
        tile: Vec<PathBuf>,

        /// Replace the job's configuration.
        #[arg(long, env = "RELIEF_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, short, default_value = "out")]
        out: PathBuf,

        /// Write ASCII STL instead of binary.
        #[arg(long, default_value_t = false)]
        ascii: bool,
    },
    /// Print the default configuration.
    Config,
    /// Check a configuration file.
    Validate { config: PathBuf },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_tile(path: &Path) -> Result<TileInput, PipelineError> {
    let tile = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| PipelineError::Load {
        tile: tile.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| PipelineError::Load {
        tile,
        reason: e.to_string(),
    })
}

fn write_tile(out: &Path, output: &TileOutput, ascii: bool) -> Result<Vec<ManifestFile>> {
    let mut files = Vec::new();
    for (category, mesh) in output.solids() {
        let name = stl_file_name(&output.name, category);
        let path = out.join(&name);
        let triangles = if ascii {
            let text = ascii_stl(mesh, &name)?;
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            mesh.triangle_count()
        } else {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            write_binary_stl(&mut BufWriter::new(file), mesh, &name)?
        };
        info!(file = %name, triangles, "wrote solid");
        files.push(ManifestFile {
            category: category.to_string(),
            path: name,
            triangles,
        });
    }
    Ok(files)
}

fn run(job: &Path, tiles: &[PathBuf], config: Option<&Path>, out: &Path, ascii: bool) -> Result<()> {
    let job = load_job(&read(job)?).context("loading job")?;
    let config: PipelineConfig = match config {
        Some(path) => load_config(&read(path)?).context("loading config")?,
        None => job.config,
    };
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let inputs = job
        .tiles
        .into_iter()
        .map(Ok)
        .chain(tiles.iter().map(|p| load_tile(p)));
    let mut manifest = Manifest::new(Default::default());
    let report = run_batch(&config, inputs, &CancelToken::new(), |output| {
        let files = write_tile(out, output, ascii).map_err(|e| PipelineError::Sink {
            reason: format!("{e:#}"),
        })?;
        manifest.add_tile(output, files);
        Ok(())
    })?;
    manifest.finish(&report);

    let path = out.join("manifest.json");
    fs::write(&path, manifest.to_json()?).with_context(|| format!("writing {}", path.display()))?;
    info!(
        manifest = %path.display(),
        succeeded = report.succeeded,
        failed = report.failed,
        triangles = manifest.triangle_total(),
        "run finished"
    );
    if report.succeeded == 0 && report.failed > 0 {
        bail!("all {} tiles failed", report.failed);
    }
    if report.failed > 0 {
        warn!(failed = report.failed, "some tiles failed, see manifest");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    match args.command {
        Command::Run {
            job,
            tile,
            config,
            out,
            ascii,
        } => run(&job, &tile, config.as_deref(), &out, ascii),
        Command::Config => {
            println!("{}", save_config(&PipelineConfig::default())?);
            Ok(())
        }
        Command::Validate { config } => {
            load_config(&read(&config)?).with_context(|| format!("validating {}", config.display()))?;
            println!("{}: ok", config.display());
            Ok(())
        }
    }
}
