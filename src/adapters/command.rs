//! Analyzer backed by an external command.
//!
//! The command receives the input on stdin and each option as a
//! `CAPFLOW_OPT_<KEY>` environment variable; its stdout is the output.
//! The child is killed if the analysis future is dropped (timeout).

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::Analyzer;

/// Prefix for option environment variables
pub const OPTION_ENV_PREFIX: &str = "CAPFLOW_OPT_";

/// Analyzer that runs a subprocess per request
pub struct CommandAnalyzer {
    /// Program to execute
    program: String,

    /// Fixed arguments
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add fixed arguments passed on every invocation
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Environment variable name for an option key
    fn option_env_name(key: &str) -> String {
        let normalized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", OPTION_ENV_PREFIX, normalized)
    }

    async fn run(&self, input: &str, options: &BTreeMap<String, String>) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in options {
            command.env(Self::option_env_name(key), value);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .with_context(|| format!("Failed to write to '{}' stdin", self.program))?;
            // Drop stdin to signal EOF
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "'{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("'{}' output is not valid UTF-8", self.program))
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    type Input = String;
    type Options = BTreeMap<String, String>;
    type Output = String;

    fn name(&self) -> &str {
        &self.program
    }

    async fn analyze(&self, input: &String, options: &BTreeMap<String, String>) -> Result<String> {
        self.run(input, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_env_name() {
        assert_eq!(CommandAnalyzer::option_env_name("language"), "CAPFLOW_OPT_LANGUAGE");
        assert_eq!(CommandAnalyzer::option_env_name("min-score"), "CAPFLOW_OPT_MIN_SCORE");
    }

    #[test]
    fn test_builder() {
        let analyzer = CommandAnalyzer::new("wc").with_args(["-c"]);
        assert_eq!(analyzer.name(), "wc");
        assert_eq!(analyzer.args, vec!["-c".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_to_stdout() {
        let analyzer = CommandAnalyzer::new("cat");
        let output = analyzer
            .analyze(&"hello".to_string(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(output, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_options_become_env_vars() {
        let analyzer = CommandAnalyzer::new("sh").with_args(["-c", "printf %s \"$CAPFLOW_OPT_LANGUAGE\""]);
        let mut options = BTreeMap::new();
        options.insert("language".to_string(), "en".to_string());

        let output = analyzer.analyze(&String::new(), &options).await.unwrap();
        assert_eq!(output, "en");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let analyzer = CommandAnalyzer::new("sh").with_args(["-c", "echo bad >&2; exit 3"]);
        let err = analyzer
            .analyze(&String::new(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
        assert!(err.to_string().contains("bad"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let analyzer = CommandAnalyzer::new("/nonexistent/capflow-analyzer");
        let err = analyzer
            .analyze(&String::new(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
