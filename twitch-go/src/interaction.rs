//! Everything the go-live flow needs from the person at the keyboard.

use crate::error::{Error, Result};
use oauth2::url::Url;
use std::io::{BufRead, Write};

/// A synchronous "ask the user" capability.
///
/// The orchestrator and token manager only ever talk to the user through this trait, so tests can
/// drive them with a script instead of a terminal.
pub trait Interaction {
    /// Shows a progress or informational line.
    fn notify(&mut self, message: &str);

    /// Sends the user off to approve the application.
    fn show_authorization_url(&mut self, url: &Url);

    /// Asks for a value, returning `default` if the user just presses Enter.
    fn ask(&mut self, label: &str, default: &str) -> Result<String>;

    /// Asks a yes/no question where "yes" is the default.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// [`Interaction`] over a line-oriented reader and writer, usually stdin/stdout.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl Terminal<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<String> {
        self.output.flush().map_err(Error::Interaction)?;
        let mut line = String::new();
        let n = self.input.read_line(&mut line).map_err(Error::Interaction)?;
        if n == 0 {
            return Err(Error::Interaction(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed",
            )));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Interaction for Terminal<R, W> {
    fn notify(&mut self, message: &str) {
        // a broken stdout is not worth failing a go-live over
        let _ = writeln!(self.output, "{message}");
    }

    fn show_authorization_url(&mut self, url: &Url) {
        let _ = writeln!(self.output, "Authorize once using this URL:\n\n{url}");
        if let Err(e) = webbrowser::open(url.as_str()) {
            tracing::debug!(error = %e, "could not open browser for authorization");
        }
    }

    fn ask(&mut self, label: &str, default: &str) -> Result<String> {
        if default.is_empty() {
            write!(self.output, "\n{label}:\n> ").map_err(Error::Interaction)?;
        } else {
            write!(
                self.output,
                "\n{label}:\n  {default}\nEnter value (or press Enter to accept): "
            )
            .map_err(Error::Interaction)?;
        }
        let answer = self.read_line()?;
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        write!(self.output, "\n{question} [Y/n]: ").map_err(Error::Interaction)?;
        let answer = self.read_line()?.to_lowercase();
        Ok(!matches!(answer.as_str(), "n" | "no"))
    }
}
