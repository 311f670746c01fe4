//! Spawning and terminating child processes.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ExecSettings;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::env::{EnvProvider, ProcessEnv};

use super::command::CommandSpec;
use super::options::RunOptions;
use super::result::ProcessResult;

/// Poll interval while waiting on a child without a blocking primitive.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(unix)]
const DEFAULT_SHELL: (&str, &str) = ("sh", "-c");

#[cfg(windows)]
const DEFAULT_SHELL: (&str, &str) = ("cmd", "/C");

/// Everything an executor needs besides the spec: settings and collaborators.
#[derive(Clone)]
pub(crate) struct Launcher {
    pub settings: ExecSettings,
    pub sink: Arc<dyn DiagnosticSink>,
    pub env: Arc<dyn EnvProvider>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            settings: ExecSettings::default(),
            sink: Arc::new(TracingSink),
            env: Arc::new(ProcessEnv),
        }
    }
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Launcher {
    pub fn default_options(&self) -> RunOptions {
        RunOptions {
            silent: self.settings.silent,
            dry_run: false,
        }
    }

    /// The command's own timeout, or the configured default.
    pub fn timeout_for(&self, spec: &CommandSpec) -> Option<Duration> {
        spec.timeout().or(self.settings.default_timeout)
    }

    /// Forward a line to the diagnostic sink unless silenced.
    pub fn echo(&self, options: &RunOptions, line: &str) {
        if !options.silent {
            self.sink.write(line);
        }
    }

    fn working_directory(&self, spec: &CommandSpec) -> Option<PathBuf> {
        if let Some(dir) = spec.working_directory() {
            return Some(dir.to_path_buf());
        }
        let var = self.settings.working_dir_var.as_deref()?;
        self.env.get(var).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    /// Build the OS command for `spec`.
    ///
    /// stdin is piped only when the command carries a payload (null otherwise);
    /// stdout and stderr are piped when capturing and inherited when not.
    pub fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = if spec.shell_mode() {
            self.shell_command(&spec.command_line())
        } else {
            let mut cmd = Command::new(spec.program());
            cmd.args(spec.arguments());
            cmd
        };

        if let Some(dir) = self.working_directory(spec) {
            cmd.current_dir(dir);
        }

        for key in &self.settings.passthrough_env {
            if let Some(value) = self.env.get(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(spec.environment());

        // Own process group, so termination also reaches grandchildren.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd.stdin(if spec.stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if spec.capture_output() {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        cmd
    }

    fn shell_command(&self, line: &str) -> Command {
        let (default_shell, flag) = DEFAULT_SHELL;
        let shell = self.settings.shell.as_deref().unwrap_or(default_shell);
        let mut cmd = Command::new(shell);
        cmd.arg(flag);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.raw_arg(line);
        }
        #[cfg(not(windows))]
        cmd.arg(line);

        cmd
    }

    /// Log the command instead of running it.
    pub fn dry_run(&self, spec: &CommandSpec, options: &RunOptions) -> ProcessResult {
        let command = spec.command_line();
        self.echo(options, &format!("[DRY RUN] Would execute: {}", command));
        ProcessResult::new(0, String::new(), String::new(), command)
    }
}

/// Exit code of a finished process; `128 + signal` when killed by a signal.
pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Send `signal` to the process group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // SAFETY: kill(2) on the group of a child we spawned with
    // `process_group(0)`; a stale group only yields ESRCH.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        debug!(pid, signal, "kill failed: {}", std::io::Error::last_os_error());
    }
}

/// Kill a blocking child and everything in its process group. Does not reap.
pub(crate) fn kill_blocking(child: &mut std::process::Child) {
    #[cfg(unix)]
    signal_group(child.id(), libc::SIGKILL);
    if let Err(e) = child.kill() {
        debug!("kill failed: {}", e);
    }
}

/// Kill a tokio child and everything in its process group without waiting.
pub(crate) fn start_kill(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGKILL);
    }
    if let Err(e) = child.start_kill() {
        debug!("kill failed: {}", e);
    }
}

/// Terminate a blocking child: SIGTERM to its group, wait up to `grace`,
/// then kill the group. The child is reaped when this returns.
pub(crate) fn terminate_blocking(child: &mut std::process::Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    {
        signal_group(child.id(), libc::SIGTERM);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }
        warn!(pid = child.id(), "process ignored SIGTERM, killing");
    }
    #[cfg(not(unix))]
    let _ = grace;

    kill_blocking(child);
    let _ = child.wait();
}

/// Terminate a tokio child: SIGTERM to its group, wait up to `grace`, then
/// kill the group. The child is reaped when this returns.
pub(crate) async fn terminate(child: &mut tokio::process::Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
        if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
            return;
        }
        warn!(pid, "process ignored SIGTERM, killing");
    }
    #[cfg(not(unix))]
    let _ = grace;

    start_kill(child);
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::env::MapEnv;
    use std::ffi::OsStr;

    fn launcher_with(settings: ExecSettings, env: MapEnv) -> Launcher {
        Launcher {
            settings,
            sink: Arc::new(TracingSink),
            env: Arc::new(env),
        }
    }

    fn env_value<'a>(cmd: &'a Command, key: &str) -> Option<Option<&'a OsStr>> {
        cmd.get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .map(|(_, v)| v)
    }

    #[test]
    fn test_direct_command() {
        let spec = CommandSpec::new("git", ["status", "--short"]).unwrap();
        let cmd = Launcher::default().command(&spec);

        assert_eq!(cmd.get_program(), "git");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["status", "--short"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_command() {
        let spec = CommandSpec::shell("ls | wc -l").unwrap();
        let cmd = Launcher::default().command(&spec);

        assert_eq!(cmd.get_program(), "sh");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["-c", "ls | wc -l"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_configured_shell() {
        let mut config = Config::default();
        config.execution.shell = Some("bash".into());
        let launcher = launcher_with(config.exec_settings(), MapEnv::new());

        let cmd = launcher.command(&CommandSpec::shell("echo hi").unwrap());
        assert_eq!(cmd.get_program(), "bash");
    }

    #[test]
    fn test_spec_environment_overrides_passthrough() {
        let mut config = Config::default();
        config.execution.passthrough_env = vec!["TOKEN".into(), "REGION".into()];
        let env = MapEnv::new().with("TOKEN", "from-provider").with("REGION", "eu");
        let launcher = launcher_with(config.exec_settings(), env);

        let spec = CommandSpec::builder("deploy")
            .env("TOKEN", "from-spec")
            .build()
            .unwrap();
        let cmd = launcher.command(&spec);

        assert_eq!(env_value(&cmd, "TOKEN"), Some(Some(OsStr::new("from-spec"))));
        assert_eq!(env_value(&cmd, "REGION"), Some(Some(OsStr::new("eu"))));
    }

    #[test]
    fn test_working_directory_resolution() {
        let mut config = Config::default();
        config.execution.working_dir_var = Some("WORKSPACE".into());
        let launcher = launcher_with(
            config.exec_settings(),
            MapEnv::new().with("WORKSPACE", "/work"),
        );

        let cmd = launcher.command(&CommandSpec::new("ls", Vec::<String>::new()).unwrap());
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/work")));

        let spec = CommandSpec::builder("ls")
            .working_directory("/explicit")
            .build()
            .unwrap();
        let cmd = launcher.command(&spec);
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/explicit")));
    }

    #[test]
    fn test_no_working_directory_by_default() {
        let cmd = Launcher::default().command(&CommandSpec::new("ls", ["-a"]).unwrap());
        assert!(cmd.get_current_dir().is_none());
    }

    #[test]
    fn test_timeout_for() {
        let mut settings = ExecSettings::default();
        settings.default_timeout = Some(Duration::from_secs(30));
        let launcher = launcher_with(settings, MapEnv::new());

        let plain = CommandSpec::new("make", Vec::<String>::new()).unwrap();
        assert_eq!(launcher.timeout_for(&plain), Some(Duration::from_secs(30)));

        let own = CommandSpec::builder("make")
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        assert_eq!(launcher.timeout_for(&own), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_dry_run_result() {
        let spec = CommandSpec::new("rm", ["-rf", "build dir"]).unwrap();
        let result = Launcher::default().dry_run(&spec, &RunOptions::default());

        assert!(result.success());
        assert!(result.stdout.is_empty());
        assert_eq!(result.command, "rm -rf 'build dir'");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_of_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 128 + 9);
        assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_blocking_reaps_child() {
        use std::os::unix::process::CommandExt;
        let mut child = Command::new("sleep").arg("5").process_group(0).spawn().unwrap();
        let start = Instant::now();

        terminate_blocking(&mut child, Duration::from_secs(1));

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(child.try_wait().unwrap().is_some());
    }

    /// Alive and not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_commands_get_own_process_group() {
        let spec = CommandSpec::shell("echo $$; cut -d' ' -f5 /proc/$$/stat").unwrap();
        let output = Launcher::default().command(&spec).output().unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        let mut lines = stdout.lines().map(str::trim);

        let pid = lines.next().unwrap();
        let pgid = lines.next().unwrap();
        assert_eq!(pid, pgid);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_terminate_blocking_reaches_grandchildren() {
        use std::io::{BufRead, BufReader};

        let spec = CommandSpec::shell("sleep 5 & echo $!; wait").unwrap();
        let mut child = Launcher::default().command(&spec).spawn().unwrap();
        let mut line = String::new();
        BufReader::new(child.stdout.take().unwrap())
            .read_line(&mut line)
            .unwrap();
        let grandchild: i32 = line.trim().parse().unwrap();

        let start = Instant::now();
        terminate_blocking(&mut child, Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(1));

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline && is_running(grandchild) {
            std::thread::sleep(POLL_INTERVAL);
        }
        assert!(!is_running(grandchild));
    }
}
