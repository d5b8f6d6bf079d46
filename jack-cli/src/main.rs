//! Entrypoint for CLI
use std::{env, error::Error, fs, io, path::Path, process};

use jack_compiler::{
    driver::{self, DriverConf},
    listing::write_token_xml,
    JackError, JackResult,
};
use log::{error, info};

const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

static USAGE: &str = r#"
usage: jackc CMD [OPTIONS] PATH

commands:
    compile     Compile a .jack file, or every .jack file in a directory,
                into .vm files next to the sources
    tokens      Print the tokens of a .jack file as XML

options:
    --keep-going    Continue with the remaining files when one fails

environment:
    RUST_LOG    Log level (error, warn, info, debug, trace)

examples:
    jackc compile Pong
    jackc compile --keep-going Pong
    jackc tokens Pong/Ball.jack
"#;

fn run_compiler(path: &str, conf: &DriverConf) -> JackResult<()> {
    info!("running compiler");

    let outputs = driver::compile_path(Path::new(path), conf)?;
    for output in outputs {
        info!("wrote {}", output.display());
    }

    Ok(())
}

fn run_tokenizer(path: &str) -> JackResult<()> {
    info!("running tokenizer");

    let file_bytes = fs::read(path).map_err(|err| JackError::from(err).in_file(path))?;
    let source_code =
        String::from_utf8(file_bytes).map_err(|err| JackError::from(err).in_file(path))?;

    write_token_xml(&source_code, io::stdout().lock())
        .map(|_| ())
        .map_err(|err| err.in_file(path))
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let result = match parse_args(env::args().skip(1)) {
        Some(Cmd::Compile { path, keep_going }) => {
            let conf = DriverConf {
                keep_going,
                ..DriverConf::default()
            };
            run_compiler(&path, &conf)
        }
        Some(Cmd::Tokens { path }) => run_tokenizer(&path),
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            process::exit(64)
        }
    };

    if let Err(err) = result {
        error!("{err}");
        process::exit(1)
    }

    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Cmd> {
    let cmd = args.next()?;
    match cmd.as_str() {
        "compile" => {
            let mut keep_going = false;
            let mut path = None;
            for arg in args {
                match arg.as_str() {
                    "--keep-going" => keep_going = true,
                    _ if path.is_none() && !arg.starts_with("--") => path = Some(arg),
                    _ => return None,
                }
            }
            Some(Cmd::Compile {
                path: path?,
                keep_going,
            })
        }
        "tokens" => {
            let path = args.next()?;
            match args.next() {
                Some(_) => None,
                None => Some(Cmd::Tokens { path }),
            }
        }
        _ => None,
    }
}

fn print_usage() {
    println!("jackc v{IMPL_VERSION}");
    println!("{USAGE}");
}

#[derive(Debug, PartialEq, Eq)]
enum Cmd {
    /// Compile file or directory
    Compile { path: String, keep_going: bool },
    /// Token listing
    Tokens { path: String },
}
