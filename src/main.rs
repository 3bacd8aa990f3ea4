mod prompt;

use modula::{lexer, parse_source, run_source, Options, VERSION};
use std::env;
use std::fs;
use std::io;
use std::process;

fn print_help() {
    println!(
        r#"modula - interpreter for a small Modula-2 style language v{}

Programs are checked before they run. Operators have no precedence:
`2 + 3 * 4` is 20. On success the final module variables are printed.

USAGE:
    modula                  Ask for the program path, then run it
    modula <file.mod>       Run a program
    modula [OPTIONS] <file.mod>

OPTIONS:
    -h, --help          Print this help message
    -v, --version       Print version information
    --tokens            Print the token stream and stop
    --ast               Print the parsed syntax tree and stop
    --no-check          Skip the semantic checks
    --quiet             Do not print the final variables

LOGGING:
    RUST_LOG=debug modula prog.mod    Trace pipeline stages and calls

EXAMPLE:
    MODULE Sum;
    FROM Terminal2 IMPORT WriteInt, WriteLn;
    VAR i, total: INTEGER;
    BEGIN
      total := 0;
      FOR i := 1 TO 10 DO total := total + i END;
      WriteInt(total, 0); WriteLn
    END Sum.
"#,
        VERSION
    );
}

#[derive(Debug, Default)]
struct Config {
    path: Option<String>,
    tokens: bool,
    ast: bool,
    quiet: bool,
    options: Options,
}

fn parse_args(args: &[String]) -> Config {
    let mut config = Config::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-v" | "--version" => {
                println!("modula {}", VERSION);
                process::exit(0);
            }
            "--tokens" => config.tokens = true,
            "--ast" => config.ast = true,
            "--no-check" => config.options.check = false,
            "--quiet" => config.quiet = true,
            flag if flag.starts_with('-') => {
                eprintln!("Error: unknown option '{}'", flag);
                eprintln!("Run 'modula --help' for usage.");
                process::exit(1);
            }
            path => {
                if config.path.is_some() {
                    eprintln!("Error: only one program file can be run at a time");
                    process::exit(1);
                }
                config.path = Some(path.to_string());
            }
        }
        i += 1;
    }
    config
}

fn fail(error: impl std::fmt::Display) -> ! {
    eprintln!("{}", error);
    process::exit(1);
}

fn print_tokens(source: &str) {
    let lexed = lexer::tokenize(source);
    for token in &lexed.tokens {
        println!("{:>4}  {}", token.line, token);
    }
    for error in &lexed.errors {
        eprintln!("{}", error);
    }
    if !lexed.errors.is_empty() {
        process::exit(1);
    }
}

fn run_file(filename: &str, config: &Config) {
    let source = match fs::read_to_string(filename) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if config.tokens {
        print_tokens(&source);
        return;
    }
    if config.ast {
        match parse_source(&source) {
            Ok(block) => println!("{:#?}", block),
            Err(e) => fail(e),
        }
        return;
    }

    let result = {
        let mut out = io::stdout().lock();
        let mut input = io::stdin().lock();
        run_source(&source, &config.options, &mut out, &mut input)
    };
    match result {
        Ok(globals) => {
            if !config.quiet {
                for line in globals.dump() {
                    println!("{}", line);
                }
            }
        }
        Err(e) => fail(e),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = parse_args(&args);

    let path = match &config.path {
        Some(path) => path.clone(),
        None => match prompt::ask_for_path() {
            Ok(Some(path)) if !path.is_empty() => path,
            Ok(_) => process::exit(0),
            Err(e) => fail(format!("Error reading path: {}", e)),
        },
    };

    run_file(&path, &config);
}
