use parking_lot::{Mutex, MutexGuard};
use quill_gc::{CounterOptions, CounterOptionsBuilder, ExecutionLimits, Strategy};

/// Options for one replay run.
pub struct Options {
    /// Collection strategy used when not comparing
    pub strategy: Strategy,

    /// Run every strategy and fail on the first settle where they disagree
    pub compare: bool,

    /// List the names of the values removed by each settle
    pub print_removed: bool,

    /// Ceilings checked after every settle
    pub limits: ExecutionLimits,

    /// Buffer to write all report output into instead of stdout
    pub dump_buffer: Option<Mutex<String>>,
}

impl Options {
    pub fn dump_buffer(&self) -> Option<MutexGuard<'_, String>> {
        self.dump_buffer.as_ref().map(|buffer| buffer.lock())
    }

    /// Counter options for the given strategy.
    pub fn counter_options(&self, strategy: Strategy) -> CounterOptions {
        CounterOptionsBuilder::new()
            .strategy(strategy)
            .limits(self.limits)
            .build()
    }

    /// Write one line of report output.
    pub fn emit(&self, line: &str) {
        match self.dump_buffer() {
            Some(mut buffer) => {
                buffer.push_str(line);
                buffer.push('\n');
            }
            None => println!("{line}"),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        OptionsBuilder::new().build()
    }
}

pub struct OptionsBuilder(Options);

impl OptionsBuilder {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self(Options {
            strategy: Strategy::default(),
            compare: false,
            print_removed: false,
            limits: ExecutionLimits::default(),
            dump_buffer: None,
        })
    }

    /// Return the options that have been built, consuming the builder.
    pub fn build(self) -> Options {
        self.0
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.0.strategy = strategy;
        self
    }

    pub fn compare(mut self, compare: bool) -> Self {
        self.0.compare = compare;
        self
    }

    pub fn print_removed(mut self, print_removed: bool) -> Self {
        self.0.print_removed = print_removed;
        self
    }

    pub fn max_references(mut self, max_references: usize) -> Self {
        self.0.limits.max_references = max_references;
        self
    }

    pub fn max_tracked_items(mut self, max_tracked_items: usize) -> Self {
        self.0.limits.max_tracked_items = max_tracked_items;
        self
    }

    pub fn dump_buffer(mut self, dump_buffer: Option<Mutex<String>>) -> Self {
        self.0.dump_buffer = dump_buffer;
        self
    }
}
