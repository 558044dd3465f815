use crate::cli::{Cli, Commands};
use crate::command_processor::{AppContext, CommandProcessor};
use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const BINARY_NAME: &str = "gcal-manager";

pub struct Application {
    command_processor: CommandProcessor,
    context: AppContext,
}

/// What the REPL should do with one line of input
#[derive(Debug, PartialEq)]
enum Input {
    Empty,
    Exit,
    Help,
    Command(Commands),
}

impl Application {
    pub fn new(context: AppContext) -> Self {
        Self { command_processor: CommandProcessor::new(), context }
    }

    pub async fn execute(&self, command: Commands) -> Result<()> {
        self.command_processor.execute(&self.context, command).await
    }

    pub async fn run_interactive(&self) -> Result<()> {
        log::info!("Starting gcal-manager interactive mode");
        let mut rl = DefaultEditor::new()?;

        println!("Welcome to gcal-manager! Type 'help' for commands, 'exit' to quit.");
        let prompt = "📅 ";

        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match parse_line(&line) {
                        Ok(Input::Empty) => {}
                        Ok(Input::Exit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(Input::Help) => Cli::command().print_help()?,
                        Ok(Input::Command(command)) => {
                            if let Err(err) = self.execute(command).await {
                                log::error!("Failed to process command: {:?}", err);
                                println!("❌ {}", err);
                            }
                        }
                        Err(err) => println!("{}", err),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Tokenize a REPL line the way a shell would and parse it with the CLI
/// definition. A leading `gcal-manager` is optional.
fn parse_line(line: &str) -> Result<Input> {
    let normalized = line.replace('\u{a0}', " ");
    let mut tokens =
        shell_words::split(&normalized).map_err(|e| anyhow!("Tokenization error: {}", e))?;
    if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case(BINARY_NAME)) {
        tokens.remove(0);
    }
    let Some(first) = tokens.first() else {
        return Ok(Input::Empty);
    };
    match first.to_lowercase().as_str() {
        "exit" | "quit" if tokens.len() == 1 => return Ok(Input::Exit),
        "help" | "--help" | "-h" if tokens.len() == 1 => return Ok(Input::Help),
        _ => {}
    }

    let cli = Cli::try_parse_from(std::iter::once(BINARY_NAME.to_string()).chain(tokens))?;
    match cli.command {
        Some(command) => Ok(Input::Command(command)),
        None => Ok(Input::Help),
    }
}
