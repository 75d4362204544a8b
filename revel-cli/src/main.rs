use candle_core::Device;
use clap::{Parser, Subcommand, ValueEnum};
use revel_config::{ConfigError, ModelConfig, build_reinforcer};
use revel_core::reinforcer::{EpochInfo, Reinforcer};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "revel", about = "Config-driven reinforcement learning trainer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the model a configuration describes until its frame budget
    /// runs out, then write a checkpoint next to the configuration.
    Train {
        /// Path to the model configuration
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
        device: DeviceArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeviceArg {
    Cpu,
    Cuda,
}

impl DeviceArg {
    fn open(self) -> Result<Device, ConfigError> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda => Ok(Device::new_cuda(0)?),
        }
    }
}

fn train(config_path: &Path, device: &Device) -> Result<(), ConfigError> {
    let config = ModelConfig::from_path(config_path)?;
    let batches_per_epoch = config.train_command()?.batches_per_epoch;
    let mut reinforcer = build_reinforcer(&config, device)?;
    reinforcer.initialize_training()?;

    println!("training {}", config.name);
    let mut epoch_idx = 0;
    while reinforcer.frames() < reinforcer.total_frames() {
        epoch_idx += 1;
        let report = reinforcer.train_epoch(&EpochInfo {
            epoch_idx,
            batches_per_epoch,
        })?;
        println!("{report}");
    }

    let checkpoint = config_path.with_file_name(format!("{}.safetensors", config.name));
    reinforcer.varmap().save(&checkpoint)?;
    println!("checkpoint written to {}", checkpoint.display());
    Ok(())
}

fn main() -> Result<(), ConfigError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Train { config, device } => train(&config, &device.open()?),
    }
}
