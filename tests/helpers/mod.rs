use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use camino::Utf8PathBuf;
use logic_installer::ProvisionError;
use logic_installer::context::{InstallMode, OsRelease, ProvisioningContext};
use logic_installer::distro::DistroId;
use logic_installer::executor::{CommandExecutor, CommandResult, CommandSpec};
use logic_installer::intake::Console;
use logic_installer::privilege::Credential;

/// One command seen by [`MockExecutor`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Recorded {
    /// The shell command line (the `bash -c` argument), or the full display for other specs.
    pub line: String,
    pub elevated: bool,
    pub cwd: Option<Utf8PathBuf>,
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Records executed commands in order and answers them from a rule list.
///
/// Rules are matched by substring against the command line; the first
/// matching rule wins. Unmatched commands succeed with empty output.
pub struct MockExecutor {
    calls: Mutex<Vec<Recorded>>,
    rules: Vec<(String, CommandResult)>,
    /// Results handed out in order for `sudo -v` credential checks.
    credential_checks: Mutex<VecDeque<bool>>,
}

#[allow(dead_code)]
impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            rules: Vec::new(),
            credential_checks: Mutex::new(VecDeque::new()),
        }
    }

    /// Commands containing `pattern` print `stdout` and succeed.
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.rules
            .push((pattern.to_string(), CommandResult::success(stdout)));
        self
    }

    /// Commands containing `pattern` fail with `stderr`.
    pub fn fail(mut self, pattern: &str, stderr: &str) -> Self {
        self.rules
            .push((pattern.to_string(), CommandResult::failure(stderr)));
        self
    }

    /// Successive credential checks return these results; further checks succeed.
    pub fn credential_checks(self, results: &[bool]) -> Self {
        self.credential_checks
            .lock()
            .unwrap()
            .extend(results.iter().copied());
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.line).collect()
    }

    /// Index of the first recorded command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.lines().iter().position(|l| l.contains(pattern))
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandResult, ProvisionError> {
        let elevated = spec.command == "sudo";
        let is_shell = spec.args.iter().any(|a| a == "-c");
        let line = if is_shell {
            spec.args.last().cloned().unwrap_or_default()
        } else {
            spec.display()
        };
        self.calls.lock().unwrap().push(Recorded {
            line: line.clone(),
            elevated,
            cwd: spec.cwd.clone(),
            stdin: spec.stdin.as_ref().map(|c| c.expose().to_string()),
            env: spec.env.clone(),
        });

        if elevated && !is_shell && spec.args.iter().any(|a| a == "-v") {
            let accepted = self.credential_checks.lock().unwrap().pop_front().unwrap_or(true);
            return Ok(if accepted {
                CommandResult::success("")
            } else {
                CommandResult::failure("Sorry, try again.")
            });
        }

        for (pattern, result) in &self.rules {
            if line.contains(pattern.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(CommandResult::success(""))
    }
}

/// `lsb_release -a` output for the given distribution and release.
#[allow(dead_code)]
pub fn lsb_output(distro: &str, release: &str) -> String {
    format!(
        "Distributor ID:\t{distro}\n\
        Description:\t{distro} GNU/Linux {release}\n\
        Release:\t{release}\n\
        Codename:\tbullseye"
    )
}

/// A Debian 11 context with a credential, rooted at `home`.
#[allow(dead_code)]
pub fn debian_context(home: Utf8PathBuf, mode: InstallMode) -> ProvisioningContext {
    ProvisioningContext::new(
        "deploy",
        home,
        OsRelease {
            distro: DistroId::Debian,
            release: "11".to_string(),
            codename: "bullseye".to_string(),
            description: "Debian GNU/Linux 11 (bullseye)".to_string(),
        },
        "logic.example.com",
        mode,
        Some(Credential::new("s3cret")),
    )
    .expect("valid context")
}

/// Console that answers from a script and records notices.
#[allow(dead_code)]
pub struct ScriptedConsole {
    pub hostname: String,
    pub mode: InstallMode,
    pub passwords: VecDeque<Option<String>>,
    pub notices: Vec<String>,
    pub credential_prompts: u32,
}

#[allow(dead_code)]
impl ScriptedConsole {
    pub fn new(passwords: &[Option<&str>]) -> Self {
        Self {
            hostname: "logic.example.com".to_string(),
            mode: InstallMode::FreshServer,
            passwords: passwords.iter().map(|p| p.map(str::to_string)).collect(),
            notices: Vec::new(),
            credential_prompts: 0,
        }
    }
}

impl Console for ScriptedConsole {
    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn ask_hostname(&mut self) -> Result<String> {
        Ok(self.hostname.clone())
    }

    fn choose_install_mode(&mut self) -> Result<InstallMode> {
        Ok(self.mode)
    }

    fn ask_credential(&mut self, _attempt: u32) -> Result<Option<Credential>> {
        self.credential_prompts += 1;
        Ok(self
            .passwords
            .pop_front()
            .flatten()
            .map(Credential::new))
    }
}
