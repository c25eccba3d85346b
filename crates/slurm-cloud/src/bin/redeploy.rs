use clap::Parser;

use slurm_cloud::commands::command_redeploy;
use slurm_cloud::common::cli::RedeployOpts;
use slurm_cloud::common::setup::setup_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = RedeployOpts::parse();
    setup_logging("redeploy", opts.common.debug, opts.common.log_file.as_deref())?;

    if let Err(e) = command_redeploy(opts).await {
        log::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}
