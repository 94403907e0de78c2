//! Subprocess execution for the external package managers.
//!
//! Every external tool is reached through [`CommandRunner`]. The real
//! implementation drives `duct`; tests substitute a scripted runner so the
//! installer logic can be exercised without pip, conda or pacman.

use std::path::PathBuf;

use anyhow::{Context, Result};
use duct::cmd;

use super::shell;

/// A fully built external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn push_arg(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shell-quoted rendering used in logs.
    pub fn command_line(&self) -> String {
        shell::command_line(&self.program, &self.args)
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Exit status plus whatever stdout was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands to completion. Non-zero exits are returned, not raised.
pub trait CommandRunner {
    /// Run with inherited stdio so the tool's own progress reaches the user.
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutcome>;

    /// Run with stdout captured.
    fn capture(&mut self, invocation: &Invocation) -> Result<CommandOutcome>;
}

#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn expression(invocation: &Invocation) -> duct::Expression {
        let mut expr = cmd(invocation.program.as_str(), &invocation.args).unchecked();
        if let Some(dir) = &invocation.cwd {
            expr = expr.dir(dir);
        }
        for (key, value) in &invocation.env {
            expr = expr.env(key, value);
        }
        expr
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutcome> {
        let output = Self::expression(invocation)
            .run()
            .with_context(|| format!("Failed to run {}", invocation.program))?;

        Ok(CommandOutcome {
            code: output.status.code(),
            stdout: String::new(),
        })
    }

    fn capture(&mut self, invocation: &Invocation) -> Result<CommandOutcome> {
        let output = Self::expression(invocation)
            .stdout_capture()
            .run()
            .with_context(|| format!("Failed to run {}", invocation.program))?;

        Ok(CommandOutcome {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
