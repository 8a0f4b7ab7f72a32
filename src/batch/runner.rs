// src/batch/runner.rs

use anyhow::{Context, Result};
use std::process::Command;
use tracing::debug;

/// Outcome of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs external programs; swapped out in tests.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the host and captures their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!(program, ?args, "spawning");
        let out = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("spawning {program}"))?;
        Ok(CommandOutput {
            status: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    /// Records every call and answers with scripted exit codes (0 once exhausted).
    #[derive(Default)]
    pub struct FakeRunner {
        pub calls: RefCell<Vec<(String, Vec<String>)>>,
        pub codes: RefCell<Vec<i32>>,
    }

    impl FakeRunner {
        pub fn with_codes(codes: &[i32]) -> Self {
            let mut codes = codes.to_vec();
            codes.reverse();
            Self {
                calls: RefCell::default(),
                codes: RefCell::new(codes),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            let code = self.codes.borrow_mut().pop().unwrap_or(0);
            Ok(CommandOutput {
                status: Some(code),
                stdout: format!("Submitted batch job {}", 1000 + code),
                stderr: if code == 0 { String::new() } else { "boom".into() },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_runner_captures_output_and_status() {
        let ok = SystemRunner
            .run("sh", &["-c".into(), "echo hi; echo err >&2".into()])
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hi");
        assert_eq!(ok.stderr.trim(), "err");

        let failed = SystemRunner.run("sh", &["-c".into(), "exit 3".into()]).unwrap();
        assert_eq!(failed.status, Some(3));
        assert!(!failed.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(SystemRunner
            .run("definitely-not-a-real-program-xyz", &[])
            .is_err());
    }
}
