//! Deposit relayer.
//!
//! Watches the bridge contract on the source chain for deposits and pays each one out once on
//! the destination chain.

mod args;

use std::process::ExitCode;

use anyhow::Context;
use relayer_common::logging;
use relayer_relay::relayer_from_config;
use relayer_tasks::{set_panic_hook, TaskManager};
use tokio::runtime::Handle;
use tracing::*;

use crate::args::Args;

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    // Start runtime for async IO tasks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("relayer-rt")
        .build()
        .context("init: build rt")?;

    // Init the logging before we do anything else.
    init_logging(runtime.handle())?;
    set_panic_hook();

    let res = run(&runtime, args);
    if let Err(err) = &res {
        error!(err = %format!("{err:#}"), "relayer exited with an error");
    }

    logging::finalize();
    res
}

fn run(runtime: &tokio::runtime::Runtime, args: Args) -> anyhow::Result<()> {
    let overrides = args.get_overrides()?;
    let config = relayer_config::load(args.config.as_deref(), overrides)
        .context("could not load config")?;
    info!(?config, "loaded config");

    let task_manager = TaskManager::new(runtime.handle().clone());
    let executor = task_manager.executor();

    let relayer = runtime
        .block_on(relayer_from_config(config.clone()))
        .context("could not start relayer")?;
    relayer.start(&executor);

    task_manager.start_signal_listeners();
    task_manager.monitor(Some(config.shutdown_timeout()))?;

    info!("relayer shut down");
    Ok(())
}

fn init_logging(rt: &Handle) -> anyhow::Result<()> {
    let lconfig = logging::LoggerConfig::from_env("relayer-client");

    // the OTLP exporter needs a runtime context
    let _g = rt.enter();
    logging::init(&lconfig).context("init: logging")
}
