use std::io::{stdin, IsTerminal};

use dialoguer::Confirm;
use owo_colors::{AnsiColors, OwoColorize};

use crate::{command::Command, ErisError, Result};

/// Asks a yes/no question on the terminal, defaulting to no. When stdin is not
/// a terminal this fails instead of blocking, callers then point at `--yes`.
pub fn ask_yes_no(prompt: &str) -> Result<bool> {
    if !stdin().is_terminal() {
        return Err(ErisError::InvalidArgument(format!(
            "cannot ask \"{prompt}\" without a terminal, pass --yes"
        )))
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| ErisError::InvalidArgument(format!("prompt failed: {e}")))
}

/// Colors `s` if stderr is a terminal
pub fn colored(s: &str, color: AnsiColors) -> String {
    if std::io::stderr().is_terminal() {
        s.color(color).to_string()
    } else {
        s.to_owned()
    }
}

/// Prints a message framed by separator lines to stderr
pub fn print_banner(msg: &str, color: AnsiColors) {
    let bar = colored(&"#".repeat(60), color);
    eprintln!("{bar}\n{msg}\n{bar}");
}

/// Runs a host command, forwarding its output, and fails on a non-zero exit
pub async fn sh(cmd_with_args: &str, args: &[&str]) -> Result<()> {
    let comres = Command::new(cmd_with_args, args)
        .ci_mode(true)
        .run_to_completion()
        .await?;
    comres.assert_success()
}

/// Like [sh] but with a working directory and with the stdout captured
pub async fn sh_in(cwd: &std::path::Path, cmd_with_args: &str, args: &[&str]) -> Result<String> {
    let comres = Command::new(cmd_with_args, args)
        .cwd(cwd)
        .run_to_completion()
        .await?;
    comres.assert_success()?;
    Ok(comres.stdout_as_utf8_lossy().trim().to_owned())
}
