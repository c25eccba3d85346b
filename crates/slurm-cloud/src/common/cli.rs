use std::path::PathBuf;

use clap::Parser;

use crate::common::config::DEFAULT_CLOUD_CONFIG_PATH;
use crate::hooks::reboot::{DEFAULT_INSTANCE_ID_FILE, DEFAULT_REBUILD_IMAGE_FILE};
use crate::hooks::resume::ResumeMode;

// Common CLI options
#[derive(Parser, Debug)]
pub struct CommonOpts {
    /// Enables more detailed log output
    #[arg(long, env = "SLURM_CLOUD_DEBUG", help_heading("GLOBAL OPTIONS"))]
    pub debug: bool,

    /// Append log output to this file instead of writing it to stderr
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        env = "SLURM_CLOUD_LOG_FILE",
        help_heading("GLOBAL OPTIONS")
    )]
    pub log_file: Option<PathBuf>,

    /// OpenStack connection settings (TOML)
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        env = "SLURM_CLOUD_CONFIG",
        default_value = DEFAULT_CLOUD_CONFIG_PATH,
        help_heading("GLOBAL OPTIONS")
    )]
    pub cloud_config: PathBuf,

    /// Path to the `scontrol` binary
    #[arg(
        long,
        env = "SLURM_CLOUD_SCONTROL",
        default_value = "scontrol",
        help_heading("GLOBAL OPTIONS")
    )]
    pub scontrol: PathBuf,

    /// Path to the `sinfo` binary
    #[arg(
        long,
        env = "SLURM_CLOUD_SINFO",
        default_value = "sinfo",
        help_heading("GLOBAL OPTIONS")
    )]
    pub sinfo: PathBuf,
}

/// Create OpenStack instances for nodes that Slurm wants to power up.
#[derive(Parser, Debug)]
#[command(version = crate::SLURM_CLOUD_VERSION)]
pub struct ResumeOpts {
    #[clap(flatten)]
    pub common: CommonOpts,

    /// Node(s) to create, as a Slurm hostlist expression
    pub hostlist: String,

    /// Any value puts the program into dry-run mode: everything is resolved and logged,
    /// but no instance is created
    pub debug_flag: Option<String>,
}

impl ResumeOpts {
    pub fn mode(&self) -> ResumeMode {
        if self.debug_flag.is_some() {
            ResumeMode::DryRun
        } else {
            ResumeMode::Create
        }
    }
}

/// Delete the OpenStack instances of nodes that Slurm powers down.
#[derive(Parser, Debug)]
#[command(version = crate::SLURM_CLOUD_VERSION)]
pub struct SuspendOpts {
    #[clap(flatten)]
    pub common: CommonOpts,

    /// Node(s) to delete, as a Slurm hostlist expression
    pub hostlist: String,
}

/// Repair nodes that Slurm marked DOWN after a failed resume.
#[derive(Parser, Debug)]
#[command(version = crate::SLURM_CLOUD_VERSION)]
pub struct ResumeFailOpts {
    #[clap(flatten)]
    pub common: CommonOpts,

    /// Failed node(s), as a Slurm hostlist expression
    pub hostlist: String,
}

/// Recreate the CLOUD nodes of a job from scratch (PrologSlurmctld).
#[derive(Parser, Debug)]
#[command(version = crate::SLURM_CLOUD_VERSION)]
pub struct RedeployOpts {
    #[clap(flatten)]
    pub common: CommonOpts,

    /// Nodes of the job, as a Slurm hostlist expression
    #[arg(env = "SLURM_JOB_NODELIST")]
    pub hostlist: String,
}

/// Rebuild or reboot the node this program runs on (RebootProgram).
#[derive(Parser, Debug)]
#[command(version = crate::SLURM_CLOUD_VERSION)]
pub struct RebootOpts {
    #[clap(flatten)]
    pub common: CommonOpts,

    /// File written by cloud-init that contains the OpenStack id of this node
    #[arg(long, default_value = DEFAULT_INSTANCE_ID_FILE)]
    pub instance_id_file: PathBuf,

    /// Optional file requesting a rebuild onto the image it names
    #[arg(long, default_value = DEFAULT_REBUILD_IMAGE_FILE)]
    pub rebuild_image_file: PathBuf,
}
