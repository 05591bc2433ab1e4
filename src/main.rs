use clap::{Parser as ClapParser, Subcommand};
use pqlc::cli::{self, CliError, SuggestOptions};
use pqlc::CompileOptions;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(ClapParser)]
#[command(name = "pqlc")]
#[command(about = "Translate Pipeline Query Language into SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile PQL statements into SQL
    Compile {
        /// PQL input (reads from stdin if not provided)
        file: Option<PathBuf>,

        /// File to write SQL to (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Substitute an identifier with a SQL snippet (name=SQL)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Suggest completions for a cursor position
    Suggest {
        /// PQL input (reads from stdin if not provided)
        file: Option<PathBuf>,

        /// JSON file describing tables and their columns
        #[arg(long)]
        schema: PathBuf,

        /// Byte offset of the cursor (defaults to end of input)
        #[arg(long)]
        cursor: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            file,
            output,
            params,
        } => run_compile(file, output, params),
        Commands::Suggest {
            file,
            schema,
            cursor,
        } => run_suggest(file, schema, cursor),
    };

    if let Err(err) = result {
        eprintln!("pqlc: {}", err);
        std::process::exit(1);
    }
}

fn read_input(file: Option<PathBuf>) -> Result<String, CliError> {
    match file {
        Some(path) => Ok(fs::read_to_string(path)?),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        None => Err(CliError::NoInput),
    }
}

fn run_compile(
    file: Option<PathBuf>,
    output: Option<PathBuf>,
    params: Vec<String>,
) -> Result<(), CliError> {
    let source = read_input(file)?;

    let mut options = CompileOptions::new();
    for param in params {
        let Some((name, sql)) = param.split_once('=') else {
            return Err(CliError::BadParameter(param));
        };
        options.parameters.insert(name.to_string(), sql.to_string());
    }

    let outcome = cli::execute_translate(&source, &options);
    match output {
        Some(path) => fs::write(path, outcome.sql.as_bytes())?,
        None => io::stdout().write_all(outcome.sql.as_bytes())?,
    }

    if !outcome.errors.is_empty() {
        for err in &outcome.errors {
            eprintln!("pqlc: {}", err);
        }
        return Err(CliError::Statements);
    }
    Ok(())
}

fn run_suggest(
    file: Option<PathBuf>,
    schema: PathBuf,
    cursor: Option<usize>,
) -> Result<(), CliError> {
    let source = read_input(file)?;
    let options = SuggestOptions {
        schema_json: fs::read_to_string(schema)?,
        cursor: cursor.unwrap_or(source.len()),
    };
    let json = cli::execute_suggest(&source, &options)?;
    println!("{}", json);
    Ok(())
}
