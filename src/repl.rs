//! Interactive REPL.

use crate::output::{self, Format};
use colored::Colorize;
use qwire_client::{Client, ClientError, ConnectionConfig};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Type a q expression to evaluate it on the server.

  \q        Exit the REPL
  \v        Show the negotiated protocol version
  \h        Show this help
"#;

/// What the loop does after a line.
enum Step {
    Print(String),
    Quit,
}

pub async fn run(config: ConnectionConfig, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "qwire".bold().cyan());
    println!("Connecting to {}...", config.addr);

    let mut client = Client::connect(config).await?;
    println!(
        "{} (protocol version {})",
        "Connected!".green(),
        client.version()
    );

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".qwire_history"))
        .unwrap_or_else(|_| ".qwire_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type '\\h' for help, '\\q' to exit.\n");

    loop {
        match rl.readline("q)") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute(&mut client, line, format).await {
                    Ok(Step::Print(out)) => println!("{}", out),
                    Ok(Step::Quit) => break,
                    Err(ClientError::ServerError { message }) => {
                        println!("{}", format!("'{message}").red())
                    }
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }

                if !client.is_connected() {
                    println!("{}", "Connection lost.".red());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute(client: &mut Client, line: &str, format: Format) -> Result<Step, ClientError> {
    match line {
        "\\q" => Ok(Step::Quit),
        "\\h" => Ok(Step::Print(HELP_TEXT.to_string())),
        "\\v" => Ok(Step::Print(client.version().to_string())),
        expr => {
            let value = client.query(expr).await?;
            Ok(Step::Print(output::render(&value, format)))
        }
    }
}
