//! DCGAN for Street View House Numbers
//!
//! Main entry point providing CLI interface for:
//! - Fetching the SVHN dataset
//! - Previewing real images
//! - Training the DCGAN model
//! - Generating, viewing and plotting results

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tch::Device;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use svhn_dcgan::{
    data::{split_path, DataLoader, FeatureRange, SvhnClient, SvhnDataset},
    model::DCGAN,
    training::{load_loss_log, Trainer, GENERATOR_FINAL_FILE, LOSSES_FILE, SAMPLES_FILE},
    utils::{
        find_latest_checkpoint, generator_path, load_checkpoint, load_checkpoint_meta, load_samples,
        plot_losses, save_image_grid, select_epoch, Config,
    },
};

const GRID_UPSCALE: u32 = 4;

/// DCGAN for synthetic house-number images
#[derive(Parser)]
#[command(name = "svhn_dcgan")]
#[command(version = "0.1.0")]
#[command(about = "Generate Street View House Number images using a DCGAN")]
struct Cli {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an SVHN split
    Fetch {
        /// Split to download: train, test or extra
        #[arg(short, long)]
        split: Option<String>,

        /// Directory to store the file in
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Render a grid of real training images
    Preview {
        /// Number of images to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,

        /// Output PNG path
        #[arg(short, long, default_value = "preview.png")]
        output: PathBuf,
    },

    /// Train the DCGAN model
    Train {
        /// Number of epochs (overrides the config file)
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Resume from a checkpoint directory, or the latest one inside it
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Generate images with a trained generator
    Generate {
        /// Checkpoint or output directory holding the generator weights
        #[arg(short, long)]
        model: PathBuf,

        /// Number of images to generate
        #[arg(short, long, default_value_t = 16)]
        num_samples: i64,

        /// Output PNG path
        #[arg(short, long, default_value = "generated.png")]
        output: PathBuf,

        /// Walk the latent space between two random points instead
        #[arg(long)]
        interpolate: bool,

        /// Number of interpolation steps
        #[arg(long, default_value_t = 10)]
        steps: i64,
    },

    /// Render one epoch of the samples saved during training
    View {
        /// Samples file (defaults to the one in the output directory)
        #[arg(short, long)]
        samples: Option<PathBuf>,

        /// Epoch index, negative counts from the end
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        epoch: i64,

        /// Output PNG path
        #[arg(short, long, default_value = "samples.png")]
        output: PathBuf,
    },

    /// Plot the recorded training losses
    Plot {
        /// Loss log CSV (defaults to the one in the output directory)
        #[arg(short, long)]
        losses: Option<PathBuf>,

        /// Output PNG path
        #[arg(short, long, default_value = "losses.png")]
        output: PathBuf,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = || Config::load_or_default(&cli.config);

    match cli.command {
        Commands::Fetch { split, root } => fetch_data(config()?, split, root).await?,
        Commands::Preview { count, output } => preview(&config()?, count, &output).await?,
        Commands::Train { epochs, resume } => train_model(config()?, epochs, resume).await?,
        Commands::Generate {
            model,
            num_samples,
            output,
            interpolate,
            steps,
        } => {
            let count = if interpolate { None } else { Some(num_samples) };
            generate_images(&config()?, &model, count, steps, &output)?
        }
        Commands::View {
            samples,
            epoch,
            output,
        } => view_samples(&config()?, samples, epoch, &output)?,
        Commands::Plot { losses, output } => plot(&config()?, losses, &output)?,
        Commands::Init { output } => init_config(&output)?,
    }

    Ok(())
}

fn client(config: &Config) -> SvhnClient {
    match &config.data.mirror {
        Some(url) => SvhnClient::with_base_url(url),
        None => SvhnClient::new(),
    }
}

/// Download an SVHN split
async fn fetch_data(mut config: Config, split: Option<String>, root: Option<PathBuf>) -> Result<()> {
    if let Some(split) = split {
        config.data.split = split;
    }
    let split = config.split()?;
    let root = root.unwrap_or_else(|| PathBuf::from(&config.data.root));

    let path = client(&config).download(split, &root).await?;
    let dataset = SvhnDataset::load_mat(&path)?;
    info!("{} split ready at {} ({} images)", split, path.display(), dataset.len());

    Ok(())
}

/// Load the configured split, downloading it first if allowed
async fn load_dataset(config: &Config) -> Result<SvhnDataset> {
    let split = config.split()?;
    let path = split_path(&config.data.root, split);

    let path = if path.exists() {
        path
    } else if config.data.download {
        client(config).download(split, &config.data.root).await?
    } else {
        bail!("{} not found and downloading is disabled", path.display());
    };

    info!("Loading {}", path.display());
    let dataset = SvhnDataset::load_mat(&path)?;
    info!("Loaded {} images", dataset.len());
    Ok(dataset)
}

/// Render the first `count` real images with their labels
async fn preview(config: &Config, count: usize, output: &Path) -> Result<()> {
    if count == 0 {
        bail!("nothing to preview");
    }
    let dataset = load_dataset(config).await?;
    let mut loader = DataLoader::new(dataset, count, false, false, None);
    let batch = loader.next_batch().context("dataset is empty")?;

    save_image_grid(
        &batch.to_tensor(Device::Cpu)?,
        count.div_ceil(2),
        FeatureRange::UNIT,
        GRID_UPSCALE,
        output,
    )?;

    info!("Labels: {:?}", batch.labels);
    info!("Saved preview to {}", output.display());
    Ok(())
}

/// Train the DCGAN model
async fn train_model(mut config: Config, epochs: Option<usize>, resume: Option<PathBuf>) -> Result<()> {
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    config.validate()?;

    let device = config.device();
    info!("Using device: {:?}", device);

    if let Some(seed) = config.training.seed {
        tch::manual_seed(seed as i64);
    }

    let dataset = load_dataset(&config).await?;
    let mut data_loader = DataLoader::new(
        dataset,
        config.data.batch_size,
        config.data.shuffle,
        config.data.drop_last,
        config.training.seed,
    );

    let mut model = DCGAN::with_defaults(config.model.latent_dim, config.model.conv_dim, device);
    let (gen_params, disc_params) = model.num_parameters();
    info!(
        "Generator: {} parameters, Discriminator: {} parameters",
        gen_params, disc_params
    );

    let mut trainer = Trainer::new(config.training_config(), device);

    if let Some(dir) = resume {
        let checkpoint = if load_checkpoint_meta(&dir).is_ok() {
            dir
        } else {
            find_latest_checkpoint(&dir)
                .with_context(|| format!("no checkpoint found in {}", dir.display()))?
        };
        let (epoch, metrics) = load_checkpoint(&mut model, &checkpoint)?;
        trainer.resume(epoch, metrics)?;
    }

    let metrics = trainer.train(&mut model, &mut data_loader)?;

    info!(
        "Training complete. Final G_loss: {:.4}, D_loss: {:.4}",
        metrics.latest_gen_loss().unwrap_or(0.0),
        metrics.latest_disc_loss().unwrap_or(0.0)
    );
    if !metrics.is_balanced(5) {
        warn!("Discriminator accuracy left the 30-90% band over the last epochs");
    }

    Ok(())
}

/// Generate images from random noise, or an interpolation when `count` is None
fn generate_images(
    config: &Config,
    model_dir: &Path,
    count: Option<i64>,
    steps: i64,
    output: &Path,
) -> Result<()> {
    let device = config.device();

    // checkpoints record the architecture, final weights rely on the config
    let (latent_dim, conv_dim, weights) = match load_checkpoint_meta(model_dir) {
        Ok(meta) => (meta.latent_dim, meta.conv_dim, generator_path(model_dir)),
        Err(_) => (
            config.model.latent_dim,
            config.model.conv_dim,
            model_dir.join(GENERATOR_FINAL_FILE),
        ),
    };

    let mut model = DCGAN::with_defaults(latent_dim, conv_dim, device);
    model.load_generator(&weights)?;
    info!("Loaded generator from {}", weights.display());

    let (images, cols) = match count {
        Some(n) if n <= 0 => bail!("number of samples must be > 0"),
        Some(n) => {
            info!("Generating {} images", n);
            (model.generate(n), n.min(8) as usize)
        }
        None => {
            info!("Interpolating over {} steps", steps);
            let z1 = model.noise(1).squeeze_dim(0);
            let z2 = model.noise(1).squeeze_dim(0);
            (model.interpolate(&z1, &z2, steps), steps.max(2) as usize)
        }
    };

    save_image_grid(&images, cols, FeatureRange::default(), GRID_UPSCALE, output)?;
    info!("Saved images to {}", output.display());
    Ok(())
}

/// Render one epoch of the saved training samples
fn view_samples(config: &Config, samples: Option<PathBuf>, epoch: i64, output: &Path) -> Result<()> {
    let path = samples.unwrap_or_else(|| Path::new(&config.training.output_dir).join(SAMPLES_FILE));
    let samples = load_samples(&path)?;
    let images = select_epoch(&samples, epoch)?;

    let cols = (images.size()[0] as usize).div_ceil(2);
    save_image_grid(images, cols, FeatureRange::default(), GRID_UPSCALE, output)?;

    info!(
        "Saved epoch {} of {} from {} to {}",
        epoch,
        samples.len(),
        path.display(),
        output.display()
    );
    Ok(())
}

/// Plot the loss log written during training
fn plot(config: &Config, losses: Option<PathBuf>, output: &Path) -> Result<()> {
    let path = losses.unwrap_or_else(|| Path::new(&config.training.output_dir).join(LOSSES_FILE));
    let records = load_loss_log(&path)?;

    plot_losses(&records, output)?;
    info!("Plotted {} loss records to {}", records.len(), output.display());
    Ok(())
}

/// Initialize default configuration file
fn init_config(output: &Path) -> Result<()> {
    Config::default().save(output)?;
    info!("Created default configuration at {}", output.display());
    Ok(())
}
