use clap::Parser;

use slurm_cloud::commands::command_reboot;
use slurm_cloud::common::cli::RebootOpts;
use slurm_cloud::common::setup::setup_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = RebootOpts::parse();
    setup_logging("reboot", opts.common.debug, opts.common.log_file.as_deref())?;

    if let Err(e) = command_reboot(opts).await {
        log::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}
