use anyhow::Result;
use clap::Parser;

use alist_mirror::cli::Args;
use alist_mirror::commands;
use alist_mirror::config::Settings;
use alist_mirror::logging;

fn main() -> Result<()> {
    let args = Args::parse();
    let multi_progress = logging::progress_display(!args.no_progress && !args.list);
    logging::init(args.verbose, &multi_progress);

    let settings = Settings::resolve(&args)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if args.list {
            commands::list_recorded(&settings).await
        } else {
            commands::run_mirror(settings, multi_progress).await
        }
    })
}
