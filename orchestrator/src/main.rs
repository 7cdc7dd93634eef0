use std::{env, io, path::PathBuf};

use log::{error, info};
use orchestrator::{configs::Configuration, test, train};

const USAGE: &str = "usage: orchestrator [CONFIG.json] [--eval-only] [--state PATH]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    eval_only: bool,
    state: Option<PathBuf>,
}

fn parse_args() -> io::Result<Args> {
    let mut args = Args::default();
    let mut raw = env::args().skip(1);

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--eval-only" => args.eval_only = true,
            "--state" => {
                let path = raw
                    .next()
                    .ok_or_else(|| io::Error::other(format!("--state needs a path\n{USAGE}")))?;
                args.state = Some(path.into());
            }
            flag if flag.starts_with("--") => {
                return Err(io::Error::other(format!("unknown flag {flag}\n{USAGE}")));
            }
            path if args.config.is_none() => args.config = Some(path.into()),
            extra => return Err(io::Error::other(format!("unexpected argument {extra}\n{USAGE}"))),
        }
    }

    Ok(args)
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => {
            info!("reading config: path={}", path.display());
            Configuration::from_path(path)
        }
        None => {
            info!("no config given, using defaults");
            Ok(Configuration::default())
        }
    }
    .map_err(io::Error::other)?;

    let result = if args.eval_only {
        test(&config, args.state.as_deref()).map(|_| ())
    } else {
        train(config.clone()).and_then(|outcome| {
            if outcome.dry_run {
                return Ok(());
            }
            test(&config, args.state.as_deref()).map(|_| ())
        })
    };

    result.map_err(|e| {
        error!("{e}");
        io::Error::other(e)
    })
}
