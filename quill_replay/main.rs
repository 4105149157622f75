use clap::Parser;

use quill_gc::{Strategy, DEFAULT_MAX_REFERENCES};

mod options;
mod runner;
mod trace;

use options::{Options, OptionsBuilder};

/// Replay reference operation traces against the Quill reference counter.
#[derive(Parser)]
#[command(about)]
pub struct Args {
    /// Collection strategy, `mark-sweep` or `incremental`
    #[arg(long, default_value = "mark-sweep", value_parser = parse_strategy)]
    pub strategy: Strategy,

    /// Run every strategy and fail on the first settle where they disagree
    #[arg(long, default_value_t = false)]
    pub compare: bool,

    /// Print the names of the values removed by each settle
    #[arg(long, default_value_t = false)]
    pub print_removed: bool,

    /// Ceiling on the total reference count, checked after each settle
    #[arg(long, default_value_t = DEFAULT_MAX_REFERENCES)]
    pub max_references: usize,

    /// Ceiling on the number of tracked values, checked after each settle
    #[arg(long, default_value_t = DEFAULT_MAX_REFERENCES)]
    pub max_tracked_items: usize,

    #[arg(required = true)]
    pub files: Vec<String>,
}

fn parse_strategy(name: &str) -> Result<Strategy, String> {
    Strategy::from_name(name).ok_or_else(|| format!("unknown strategy `{name}`"))
}

impl OptionsBuilder {
    /// Create new options from command line arguments.
    pub fn new_from_args(args: &Args) -> Self {
        OptionsBuilder::new()
            .strategy(args.strategy)
            .compare(args.compare)
            .print_removed(args.print_removed)
            .max_references(args.max_references)
            .max_tracked_items(args.max_tracked_items)
    }
}

pub fn print_error_message_and_exit(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn replay_file(options: &Options, file: &str) {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(err) => print_error_message_and_exit(&format!("{file}: {err}")),
    };

    let trace = match trace::parse_trace(&source) {
        Ok(trace) => trace,
        Err(err) => print_error_message_and_exit(&format!("{file}: {err}")),
    };

    log::debug!("replaying {} operations from {file}", trace.len());

    if let Err(err) = runner::replay(options, &trace) {
        print_error_message_and_exit(&format!("{file}: {err}"));
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let options = OptionsBuilder::new_from_args(&args).build();

    for file in &args.files {
        if args.files.len() > 1 {
            options.emit(&format!("== {file}"));
        }
        replay_file(&options, file);
    }
}
