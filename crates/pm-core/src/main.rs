//! Portal metrics service entry point.

use clap::Parser;
use pm_core::cli::{Cli, Commands};
use pm_core::commands;
use pm_core::logging::{init_logging, LogConfig};

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let result = match &cli.command {
        Commands::Run(args) => commands::run(args),
        Commands::CheckConfig(args) => commands::check_config(args),
        Commands::InitDb(args) => commands::init_db(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            let code = e.exit_code();
            tracing::error!(code = code.code_name(), error = %e, "Command failed");
            eprintln!("pm-core: {e}");
            code
        }
    };

    std::process::exit(exit_code.as_i32());
}
