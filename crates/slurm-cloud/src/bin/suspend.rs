use clap::Parser;

use slurm_cloud::commands::command_suspend;
use slurm_cloud::common::cli::SuspendOpts;
use slurm_cloud::common::setup::setup_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = SuspendOpts::parse();
    setup_logging("suspend", opts.common.debug, opts.common.log_file.as_deref())?;

    if let Err(e) = command_suspend(opts).await {
        log::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}
