use gotest_relay::sink::{error_block, MessageBlock, OutputMode};
use gotest_relay::{parse_command, print_usage, Command};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) => {
            error_block(
                output_mode,
                &MessageBlock::new("Invalid command arguments", err.to_string())
                    .with_hint("Run `gotest-relay --help` to see supported command forms"),
            );
            print_usage();
            std::process::exit(2);
        }
    };

    match cmd {
        Command::Help => {
            print_usage();
        }
        _ => match gotest_relay::runner::run_command(cmd) {
            Ok(outcome) => {
                if !outcome.output.trim().is_empty() {
                    println!("{}", outcome.output);
                }
                if !outcome.passed {
                    std::process::exit(1);
                }
            }
            Err(err) => {
                error_block(output_mode, &MessageBlock::new("Run failed", err.to_string()));
                std::process::exit(1);
            }
        },
    }
}
