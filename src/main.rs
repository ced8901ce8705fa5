//! cmdstream binary entry point.

use std::process::ExitCode;

use cmdstream::cli::{self, Args, Mode};
use cmdstream::config::Config;
use cmdstream::execution::{
    self, pipeline_labels, render_failure, render_pipeline_failure, CmdResult, Runner,
};
use cmdstream::{logging, CmdStreamError};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'cmdstream --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    let _ = logging::init_with_filter(&config.log_filter());
    debug!("cmdstream v{}", env!("CARGO_PKG_VERSION"));

    if args.stages.is_empty() {
        eprintln!("error: no command given");
        eprintln!("Try 'cmdstream --help' for more information.");
        return ExitCode::from(2);
    }

    let runner = match config.build_runner() {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let token = runner.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted");
            token.cancel();
        }
    });

    let code = execute(&runner, &args).await;
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Execute the command line and return the process exit code.
async fn execute(runner: &Runner, args: &Args) -> i32 {
    let streams: Vec<_> = args.stages.iter().map(|s| runner.command(s)).collect();
    let Some((src, stages)) = streams.split_first() else {
        return 2;
    };

    if stages.is_empty() {
        let stream = src.clone();
        let res = match args.mode {
            Mode::Run => execution::run(stream, runner.trace()).await.map(|()| None),
            Mode::Get => execution::get(stream, runner.trace()).await.map(Some),
            Mode::Check => execution::check(stream, runner.trace()).await.map(Some),
        };
        return report(res, render_failure);
    }

    // The source stage reads nothing from the pipeline.
    if let Err(err) = src.close().await {
        eprintln!("{}", render_failure(&err));
        return 1;
    }

    let labels = pipeline_labels(src, stages);
    let res = match args.mode {
        Mode::Run => runner.pipe(src.clone(), stages).await.map(|()| None),
        Mode::Get => runner.get_pipe(src.clone(), stages).await.map(Some),
        Mode::Check => runner.check_pipe(src.clone(), stages).await.map(Some),
    };
    report(res, |err| render_pipeline_failure(&labels, err))
}

fn report(
    res: cmdstream::Result<Option<CmdResult>>,
    render: impl Fn(&CmdStreamError) -> String,
) -> i32 {
    match res {
        Ok(None) => 0,
        Ok(Some(result)) => {
            if !result.out.is_empty() {
                println!("{}", result.out);
            }
            result.code
        }
        Err(err) => {
            eprintln!("{}", render(&err));
            if err.is_cancelled() {
                130
            } else {
                err.code().filter(|c| *c > 0).unwrap_or(1)
            }
        }
    }
}
