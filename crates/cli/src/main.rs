use std::process::ExitCode;

fn main() -> ExitCode {
    ticketdesk_cli::run()
}
