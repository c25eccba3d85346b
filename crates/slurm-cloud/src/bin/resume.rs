use clap::Parser;

use slurm_cloud::commands::command_resume;
use slurm_cloud::common::cli::ResumeOpts;
use slurm_cloud::common::setup::setup_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = ResumeOpts::parse();
    setup_logging("resume", opts.common.debug, opts.common.log_file.as_deref())?;

    if let Err(e) = command_resume(opts).await {
        log::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}
