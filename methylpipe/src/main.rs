use clap::Parser;
use log::{error, info};
use simple_logger::init_with_level;

use std::path::PathBuf;

use methylpipe::{
    cli::{Args, Overrides, SubArgs},
    config::Config,
    consts::RUN_SUMMARY,
    error::Result,
    executor::manager::{Executor, LocalExecutor, ScriptExecutor},
    graph::Pipeline,
    summary::RunSummary,
};

fn main() {
    let start = std::time::Instant::now();
    let args: Args = Args::parse();

    if let Err(e) = init_with_level(args.level()) {
        eprintln!("ERROR: could not initialise logging: {}", e);
    }

    let code = match args.command {
        SubArgs::Run { args } => run(args.config, &args.overrides, &LocalExecutor).and_then(
            |(config, summary)| {
                summary.write(&config.output_dir().join(RUN_SUMMARY))?;
                Ok(summary.exit_code())
            },
        ),
        SubArgs::Write { args } => {
            let executor = ScriptExecutor::new(args.script);
            run(args.config, &args.overrides, &executor).and_then(|(_, summary)| {
                executor.write()?;
                Ok(summary.exit_code())
            })
        }
    }
    .unwrap_or_else(|e| {
        error!("{}", e);
        1
    });

    let elapsed = start.elapsed();
    info!("Elapsed time: {:.3?}", elapsed);

    std::process::exit(code);
}

fn run(
    config: PathBuf,
    overrides: &Overrides,
    executor: &dyn Executor,
) -> Result<(Config, RunSummary)> {
    let mut config = Config::read(config)?;
    config.aware(overrides).set_run_id();

    let summary = Pipeline::build(&config, executor)?.run();

    if summary.success {
        info!("{}", summary.render());
    } else {
        error!("{}", summary.render());
    }

    Ok((config, summary))
}
