use clap::Parser;

use slurm_cloud::commands::command_resumefail;
use slurm_cloud::common::cli::ResumeFailOpts;
use slurm_cloud::common::setup::setup_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = ResumeFailOpts::parse();
    setup_logging("resumefail", opts.common.debug, opts.common.log_file.as_deref())?;

    if let Err(e) = command_resumefail(opts).await {
        log::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}
