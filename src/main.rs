use clap::{Parser, Subcommand};
use log::error;
use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
};

use dyesub::{Config, Error, Model, Outcome, Printer};

#[derive(Debug, Parser)]
#[command(version, about = "Mitsubishi CP-D70 family printer backend")]
struct Args {
    /// Printer model (d70, d707, k60, d80, 305, ask300)
    #[arg(short, long)]
    model: Model,

    /// USB serial number, first matching printer when omitted
    #[arg(short, long, default_value = "")]
    serial: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a spool file, or standard input
    Print {
        #[arg(short, long, default_value_t = 1)]
        copies: u32,

        /// Return as soon as a single copy starts printing
        #[arg(long)]
        fast_return: bool,

        /// Fail with a retryable status instead of waiting on a busy printer
        #[arg(long)]
        no_wait: bool,

        /// Never merge consecutive 6x4 jobs onto one sheet
        #[arg(long)]
        no_combine: bool,

        file: Option<PathBuf>,
    },
    /// Show printer and media state
    Status,
}

fn run(args: Args) -> Result<(), Error> {
    match args.command {
        Command::Print {
            copies,
            fast_return,
            no_wait,
            no_combine,
            file,
        } => {
            let config = Config::new(args.model, args.serial)
                .fast_return(fast_return)
                .wait(!no_wait);
            let mut printer = Printer::open(config, None)?;

            match file {
                Some(path) => {
                    let mut reader = BufReader::new(File::open(path)?);
                    printer.print_stream(&mut reader, copies, !no_combine)?;
                }
                None => {
                    let stdin = io::stdin();
                    let mut reader = stdin.lock();
                    printer.print_stream(&mut reader, copies, !no_combine)?;
                }
            }
            Ok(())
        }
        Command::Status => {
            let config = Config::new(args.model, args.serial);
            let mut printer = Printer::open(config, None)?;
            print!("{}", printer.query_status()?);
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    let outcome = match run(args) {
        Ok(()) => Outcome::Ok,
        Err(err) => {
            error!("{}", err);
            err.outcome()
        }
    };
    std::process::exit(outcome.exit_code());
}
