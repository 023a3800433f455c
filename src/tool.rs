use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::*;

use crate::error::{Error, Result};

/// One call of an external tool: program, arguments, working directory and
/// an optional script piped to standard input.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|x| x.as_ref().to_string()));
        self
    }

    pub fn stdin(mut self, script: impl Into<String>) -> Self {
        self.stdin = Some(script.into());
        self
    }

    /// Full argument vector including the program, as recorded in the
    /// compilation database.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Result of a finished external tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    #[cfg(test)]
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        ToolOutput {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn failed(stderr: impl Into<Vec<u8>>) -> Self {
        ToolOutput {
            success: false,
            code: Some(1),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Replays captured diagnostics through the logger.
    pub fn log_stderr(&self) {
        let text = String::from_utf8_lossy(&self.stderr);
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }
        if self.success {
            warn!("{}", text);
        } else {
            error!("{}", text);
        }
    }
}

/// Runs external tools. Implementations must be shareable across the
/// compilation worker pool.
pub trait ToolRunner: Sync {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput>;
}

/// Spawns real processes and waits for them to finish.
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        let mut child = command.spawn()?;
        if let Some(script) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(script.as_bytes())?;
            }
        }
        let output = child.wait_with_output()?;
        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Runs `invocation`, logging it first. Spawn errors become `Error::Spawn`;
/// the exit status is left for the caller to judge.
pub fn execute(runner: &dyn ToolRunner, invocation: &Invocation) -> Result<ToolOutput> {
    debug!("running {}", invocation);
    runner.run(invocation).map_err(|source| Error::Spawn {
        program: invocation.program.clone(),
        source,
    })
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&Invocation) -> ToolOutput + Send + Sync>;

    /// Records every invocation and answers with a scripted result.
    pub struct FakeRunner {
        responder: Responder,
        pub calls: Mutex<Vec<Invocation>>,
    }

    impl FakeRunner {
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&Invocation) -> ToolOutput + Send + Sync + 'static,
        {
            FakeRunner {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn succeeding() -> Self {
            FakeRunner::new(|_| ToolOutput::ok(Vec::new()))
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub fn has_arg(invocation: &Invocation, arg: &str) -> bool {
        invocation.args.iter().any(|x| x == arg)
    }

    impl ToolRunner for FakeRunner {
        fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            Ok((self.responder)(invocation))
        }
    }
}
