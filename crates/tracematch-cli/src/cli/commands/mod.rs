pub mod normalize;
pub mod show;
pub mod validate;

use crate::cli::args::{Cli, Command};
use crate::exit_codes;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Validate(args) => validate::run(args),
        Command::Normalize(args) => normalize::run(args),
        Command::Show(args) => show::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}
