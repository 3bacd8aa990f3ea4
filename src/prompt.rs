use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

const PROMPT: &str = "Enter path to file: ";

/// Asks for the program path on the terminal, with the previous answers
/// available through the arrow keys. `Ok(None)` if the user hits Ctrl-C or
/// Ctrl-D.
pub fn ask_for_path() -> rustyline::Result<Option<String>> {
    let mut rl = DefaultEditor::new()?;

    let history_path = history_path();
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    let answer = match rl.readline(PROMPT) {
        Ok(line) => {
            let path = line.trim().to_string();
            if !path.is_empty() {
                rl.add_history_entry(path.as_str())?;
            }
            Some(path)
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
        Err(err) => return Err(err),
    };

    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }
    Ok(answer)
}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|mut path| {
        path.push(".modula_history");
        path
    })
}
