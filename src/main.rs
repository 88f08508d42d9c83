use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use vasm::compiler;
use vasm::config::{DumpFormat, FloatMode, RuntimeConfig};

// Wrapper types for clap ValueEnum support
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum FloatModeArg {
    #[default]
    Native,
    Legacy,
}

impl From<FloatModeArg> for FloatMode {
    fn from(arg: FloatModeArg) -> Self {
        match arg {
            FloatModeArg::Native => FloatMode::Native,
            FloatModeArg::Legacy => FloatMode::Legacy,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum DumpFormatArg {
    #[default]
    Human,
    Json,
}

impl From<DumpFormatArg> for DumpFormat {
    fn from(arg: DumpFormatArg) -> Self {
        match arg {
            DumpFormatArg::Human => DumpFormat::Human,
            DumpFormatArg::Json => DumpFormat::Json,
        }
    }
}

#[derive(Parser)]
#[command(name = "vasm")]
#[command(about = "A small register machine for a line-oriented assembly language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a vasm program
    Run {
        /// The program file to run
        file: PathBuf,

        /// Trace every executed statement and call to stderr
        #[arg(long)]
        trace: bool,

        /// Print execution counters after the run
        #[arg(long)]
        stats: bool,

        /// Float register quantization (native, legacy)
        #[arg(long, value_enum)]
        float_mode: Option<FloatModeArg>,

        /// Capacity of the PUSH/POP stack
        #[arg(long)]
        stack_size: Option<usize>,

        /// Maximum nesting of CALL frames
        #[arg(long)]
        max_call_depth: Option<usize>,

        /// Abort after this many executed statements (0 = unlimited)
        #[arg(long)]
        max_steps: Option<u64>,

        /// Config file to use instead of vasm.toml next to the program
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Dump the preprocessed program to stderr, or to a file with --dump-program=path
        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        dump_program: Option<Option<PathBuf>>,

        /// Format of --dump-program output (human, json)
        #[arg(long, value_enum, default_value = "human")]
        dump_format: DumpFormatArg,
    },
    /// Statically check a vasm program without running it
    Check {
        /// The program file to check
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            trace,
            stats,
            float_mode,
            stack_size,
            max_call_depth,
            max_steps,
            config,
            dump_program,
            dump_format,
        } => {
            let mut runtime = match RuntimeConfig::for_program(&file, config.as_deref()) {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            // command-line flags override the config file
            if let Some(mode) = float_mode {
                runtime.float_mode = mode.into();
            }
            if let Some(size) = stack_size {
                runtime.stack_size = size;
            }
            if let Some(depth) = max_call_depth {
                runtime.max_call_depth = depth;
            }
            if let Some(steps) = max_steps {
                runtime.max_steps = if steps == 0 { None } else { Some(steps) };
            }
            runtime.trace |= trace;
            runtime.stats |= stats;

            let dump_opts = compiler::DumpOptions {
                dump_program,
                format: dump_format.into(),
            };

            match compiler::run_file_with_dump(&file, &runtime, &dump_opts) {
                Ok(code) => return ExitCode::from(code as u8),
                Err(e) => {
                    eprintln!("{}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        Commands::Check { file } => match compiler::check_file(&file) {
            Ok(warnings) => {
                for warning in &warnings {
                    eprintln!("{}", warning);
                }
                println!("Check passed.");
            }
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}
