// src/prompt.rs

//! Mode-loss prompts
//!
//! When the active transport stops working the user picks retry, switch
//! mode, or view-only. Without a terminal nobody can answer, so the
//! non-interactive style always continues view-only.

use crate::batch::ModeLossHandler;
use crate::error::Result;
use crate::mode::{ExecutionMode, ModeLossChoice};
use std::io::{self, BufRead, IsTerminal, Write};

/// Style of prompt interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Interactive TTY
    Interactive,
    /// Non-TTY or scripting; never reads input
    Simple,
}

pub struct ModeLossPrompt {
    style: PromptStyle,
}

impl ModeLossPrompt {
    pub fn new(style: PromptStyle) -> Self {
        Self { style }
    }

    /// Detect the appropriate prompt style based on environment
    pub fn detect() -> Self {
        let style = if io::stdin().is_terminal() && io::stdout().is_terminal() {
            PromptStyle::Interactive
        } else {
            PromptStyle::Simple
        };
        Self { style }
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    /// Ask what to do after losing `mode`
    pub fn ask(&self, mode: ExecutionMode, reason: &str) -> Result<ModeLossChoice> {
        self.ask_with(mode, reason, &mut io::stdin().lock(), &mut io::stdout())
    }

    pub fn ask_with<R: BufRead, W: Write>(
        &self,
        mode: ExecutionMode,
        reason: &str,
        input: &mut R,
        out: &mut W,
    ) -> Result<ModeLossChoice> {
        writeln!(out)?;
        writeln!(out, "The {} stopped working: {}", mode.display_name(), reason)?;

        if self.style == PromptStyle::Simple {
            writeln!(out, "Continuing in view-only mode.")?;
            return Ok(ModeLossChoice::ViewOnly);
        }

        loop {
            writeln!(out, "  [r] Retry with the same mode")?;
            writeln!(out, "  [s] Switch to another mode")?;
            writeln!(out, "  [v] Continue view-only")?;
            write!(out, "Choice [r/s/v]: ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(ModeLossChoice::ViewOnly);
            }

            match line.trim().to_lowercase().as_str() {
                "r" | "retry" => return Ok(ModeLossChoice::Retry),
                "s" | "switch" => return Ok(ModeLossChoice::SwitchMode),
                "v" | "view" | "" => return Ok(ModeLossChoice::ViewOnly),
                _ => writeln!(out, "Unknown option. Please try again.")?,
            }
        }
    }

    /// Ask which mode to switch to, excluding `current`
    ///
    /// `None` means the user backed out.
    pub fn choose_mode(&self, current: ExecutionMode) -> Result<Option<ExecutionMode>> {
        self.choose_mode_with(current, &mut io::stdin().lock(), &mut io::stdout())
    }

    pub fn choose_mode_with<R: BufRead, W: Write>(
        &self,
        current: ExecutionMode,
        input: &mut R,
        out: &mut W,
    ) -> Result<Option<ExecutionMode>> {
        let candidates: Vec<ExecutionMode> = ExecutionMode::PRIORITY_ORDER
            .into_iter()
            .filter(|m| *m != current)
            .collect();

        if self.style == PromptStyle::Simple || candidates.is_empty() {
            return Ok(None);
        }

        for (i, mode) in candidates.iter().enumerate() {
            writeln!(out, "  [{}] {}", i + 1, mode.display_name())?;
        }
        write!(out, "Switch to [1-{}, empty to cancel]: ", candidates.len())?;
        out.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        let choice = line
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| candidates.get(i).copied());
        Ok(choice)
    }
}

impl ModeLossHandler for ModeLossPrompt {
    fn choose(&mut self, lost: ExecutionMode, reason: &str) -> Result<ModeLossChoice> {
        self.ask(lost, reason)
    }

    fn switch_to(&mut self, current: ExecutionMode) -> Result<Option<ExecutionMode>> {
        self.choose_mode(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(style: PromptStyle, input: &str) -> ModeLossChoice {
        let mut out = Vec::new();
        ModeLossPrompt::new(style)
            .ask_with(ExecutionMode::Root, "su exited", &mut Cursor::new(input), &mut out)
            .unwrap()
    }

    #[test]
    fn test_interactive_choices() {
        assert_eq!(ask(PromptStyle::Interactive, "r\n"), ModeLossChoice::Retry);
        assert_eq!(ask(PromptStyle::Interactive, "switch\n"), ModeLossChoice::SwitchMode);
        assert_eq!(ask(PromptStyle::Interactive, "x\nv\n"), ModeLossChoice::ViewOnly);
        // End of input
        assert_eq!(ask(PromptStyle::Interactive, ""), ModeLossChoice::ViewOnly);
    }

    #[test]
    fn test_simple_style_never_reads() {
        assert_eq!(ask(PromptStyle::Simple, "r\n"), ModeLossChoice::ViewOnly);
    }

    #[test]
    fn test_choose_mode_excludes_current() {
        let prompt = ModeLossPrompt::new(PromptStyle::Interactive);
        let mut out = Vec::new();
        let chosen = prompt
            .choose_mode_with(ExecutionMode::Root, &mut Cursor::new("1\n"), &mut out)
            .unwrap();
        assert_eq!(chosen, Some(ExecutionMode::RemoteService));

        let cancelled = prompt
            .choose_mode_with(ExecutionMode::Root, &mut Cursor::new("\n"), &mut out)
            .unwrap();
        assert_eq!(cancelled, None);
    }
}
