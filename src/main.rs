use std::process;

use tracing::error;

use logic_installer::cli::{self, Commands};

fn main() {
    let args = cli::parse_args();

    if let Err(e) = logic_installer::init_logging(args.install.log_level) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }

    let result = match &args.command {
        None | Some(Commands::Install) => {
            logic_installer::run_install_interactive(&args.install).map(|_| ())
        }
        Some(Commands::Completions(opts)) => logic_installer::run_completions(opts),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}
