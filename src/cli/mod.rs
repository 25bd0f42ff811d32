mod engine;
mod inspect;
mod run;
mod serve;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Produce")
        .command("run", "Create a production and walk it through every stage")
        .command("serve", "Start the HTTP API")
        .print();

    GuideSection::new("Inspect")
        .command("list", "List recent productions")
        .command("show <id>", "Show a production's state and result")
        .command("messages <id>", "Print a production's conversation log")
        .command("providers", "List the supported completion providers")
        .print();

    GuideSection::new("Examples")
        .hint(
            "etherflow run --name \"Spring launch\" --context \"Specialty coffee roaster\"",
            "",
        )
        .hint("etherflow serve --api-port 18000", "")
        .hint("etherflow messages <id> --after 4", "")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("etherflow").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunArgs {
    pub name: String,
    pub context: String,
    pub tone: String,
    pub owner: Option<String>,
}

pub(crate) fn parse_run_command_args(args: &[String], start: usize) -> RunArgs {
    let mut name = String::new();
    let mut context = String::new();
    let mut tone = String::new();
    let mut owner = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--name" | "-n" => {
                if i + 1 < args.len() {
                    name = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--context" | "-c" => {
                if i + 1 < args.len() {
                    context = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--tone" | "-t" => {
                if i + 1 < args.len() {
                    tone = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--owner" => {
                if i + 1 < args.len() {
                    owner = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    RunArgs {
        name,
        context,
        tone,
        owner,
    }
}

/// Flags left unset fall back to the config file.
pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
) -> (Option<String>, Option<u16>) {
    let mut api_host = None;
    let mut api_port = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

/// Returns the positional id and the `--after` cursor.
pub(crate) fn parse_messages_flags(args: &[String], start: usize) -> (Option<String>, i64) {
    let mut id = None;
    let mut after = 0;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--after" | "-a" => {
                if i + 1 < args.len() {
                    after = args[i + 1].parse().unwrap_or(0);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            other => {
                if id.is_none() && !other.starts_with('-') {
                    id = Some(other.to_string());
                }
                i += 1;
            }
        }
    }
    (id, after.max(0))
}

fn parse_owner_flag(args: &[String], start: usize) -> Option<String> {
    args[start.min(args.len())..]
        .windows(2)
        .find(|w| w[0] == "--owner")
        .map(|w| w[1].clone())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match cmd {
        "serve" | "server" => {
            let log_tx = crate::logging::init_logging(false);
            let (api_host, api_port) = parse_api_server_flags(&args, 2);
            serve::run_serve(log_tx, api_host, api_port).await?;
        }
        "run" => {
            let parsed = parse_run_command_args(&args, 2);
            if parsed.name.trim().is_empty() || parsed.context.trim().is_empty() {
                print_error("Error: --name and --context are required for run.");
                print_help();
                return Ok(());
            }
            crate::logging::init_logging(true);
            run::run_interactive(parsed).await?;
        }
        "show" => match args.get(2) {
            Some(id) => inspect::show(id).await?,
            None => print_error("Usage: etherflow show <id>"),
        },
        "messages" => match parse_messages_flags(&args, 2) {
            (Some(id), after) => inspect::messages(&id, after).await?,
            (None, _) => print_error("Usage: etherflow messages <id> [--after N]"),
        },
        "list" | "ls" => {
            let owner = parse_owner_flag(&args, 2);
            inspect::list(owner.as_deref()).await?;
        }
        "providers" => inspect::providers()?,
        "help" | "--help" | "-h" => print_help(),
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
        }
    }
    Ok(())
}
