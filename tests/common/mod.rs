//! Shared fixtures for integration tests: a stateful fake host that answers
//! the commands serverprep runs, backed by a scratch filesystem.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serverprep::engine::sshd_config::{SshdConfig, hardening_policy};
use serverprep::host_fs::LocalFs;
use serverprep::params::{InvocationParams, Settings};
use serverprep::tool_runner::{CommandRunner, Invocation, ToolOutput};
use serverprep::error::Result;
use tempfile::TempDir;

pub const OPUSER_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOpUserExampleKey opuser@laptop";

/// Trimmed-down Debian 12 `sshd_config`.
pub const DEBIAN_SSHD_CONFIG: &str = "\
# This is the sshd server system-wide configuration file.  See
# sshd_config(5) for more information.

Include /etc/ssh/sshd_config.d/*.conf

#Port 22
#AddressFamily any
#ListenAddress 0.0.0.0

#LoginGraceTime 2m
#PermitRootLogin prohibit-password
#StrictModes yes
#MaxAuthTries 6
#MaxSessions 10

#PubkeyAuthentication yes

#PasswordAuthentication yes
#PermitEmptyPasswords no

KbdInteractiveAuthentication no

UsePAM yes

#AllowAgentForwarding yes
#AllowTcpForwarding yes
X11Forwarding yes
PrintMotd no

AcceptEnv LANG LC_*

Subsystem\tsftp\t/usr/lib/openssh/sftp-server

# Example of overriding settings on a per-user basis
#Match User anoncvs
#\tX11Forwarding no
#\tAllowTcpForwarding no
";

pub const SSHD_CONFIG_PATH: &str = "/etc/ssh/sshd_config";

const BASE_BINARIES: &[&str] = &[
    "apt-get",
    "getent",
    "useradd",
    "usermod",
    "id",
    "chown",
    "systemctl",
];
const PACKAGED_BINARIES: &[&str] = &["sudo", "visudo", "ufw", "sshd"];

/// A host that remembers accounts, group membership and installed packages,
/// and records every invocation it executes.
pub struct FakeHost {
    pub dir: TempDir,
    pub dry_run: bool,
    pub users: RefCell<BTreeMap<String, Vec<String>>>,
    pub packages_installed: Cell<bool>,
    pub sshd_accepts: Cell<bool>,
    pub socket_active: Cell<bool>,
    /// `keyword value` pairs a file under `sshd_config.d` sets; they win over
    /// the main file in `sshd -T`.
    pub included: RefCell<Vec<(String, String)>>,
    /// Rules ufw currently holds, e.g. `2222/tcp`.
    pub ufw_rules: RefCell<Vec<String>>,
    /// Path and contents of every file handed to `sshd -t`.
    pub validated: RefCell<Vec<(String, String)>>,
    /// Invocations actually executed.
    pub calls: RefCell<Vec<Invocation>>,
    /// Destructive invocations skipped under dry-run.
    pub skipped: RefCell<Vec<Invocation>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn dry_run() -> Self {
        Self::build(true)
    }

    fn build(dry_run: bool) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let ssh_dir = dir.path().join("etc/ssh");
        std::fs::create_dir_all(&ssh_dir).expect("create etc/ssh");
        std::fs::create_dir_all(dir.path().join("etc/sudoers.d")).expect("create sudoers.d");
        let config = ssh_dir.join("sshd_config");
        std::fs::write(&config, DEBIAN_SSHD_CONFIG).expect("seed sshd_config");
        std::fs::set_permissions(&config, std::fs::Permissions::from_mode(0o644))
            .expect("chmod sshd_config");

        Self {
            dir,
            dry_run,
            users: RefCell::new(BTreeMap::new()),
            packages_installed: Cell::new(false),
            sshd_accepts: Cell::new(true),
            socket_active: Cell::new(false),
            included: RefCell::new(Vec::new()),
            ufw_rules: RefCell::new(Vec::new()),
            validated: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            skipped: RefCell::new(Vec::new()),
        }
    }

    pub fn fs(&self) -> LocalFs {
        LocalFs::with_root(self.dir.path(), self.dry_run)
    }

    /// Real location of an on-host path.
    pub fn path(&self, host_path: &str) -> PathBuf {
        self.dir.path().join(host_path.trim_start_matches('/'))
    }

    pub fn read(&self, host_path: &str) -> String {
        std::fs::read_to_string(self.path(host_path)).expect("read host file")
    }

    pub fn mode(&self, host_path: &str) -> u32 {
        std::fs::metadata(self.path(host_path))
            .expect("stat host file")
            .permissions()
            .mode()
            & 0o7777
    }

    pub fn write(&self, host_path: &str, contents: &str) {
        std::fs::write(self.path(host_path), contents).expect("write host file");
    }

    pub fn add_user(&self, name: &str, groups: &[&str]) {
        let mut all = vec![name.to_string()];
        all.extend(groups.iter().map(|g| g.to_string()));
        self.users.borrow_mut().insert(name.to_string(), all);
    }

    /// Executed command lines, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Invocation::command_line).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|inv| inv.program == program)
            .count()
    }

    /// Index of the first executed command line starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.command_lines().iter().position(|l| l.starts_with(prefix))
    }

    /// What `sshd -T` prints for the policy keywords: included values first,
    /// then the main file's.
    fn effective_dump(&self, config_path: &str) -> String {
        let config = SshdConfig::parse(&self.read(config_path));
        let included = self.included.borrow();
        let mut out = String::new();
        for setting in hardening_policy(22) {
            let keyword = setting.directive.keyword();
            let value = included
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
                .map(|(_, v)| v.as_str())
                .or_else(|| config.value_of(keyword));
            if let Some(value) = value {
                out.push_str(&format!("{} {}\n", keyword.to_ascii_lowercase(), value.to_ascii_lowercase()));
            }
        }
        out
    }

    fn sudoers_granted(&self, user: &str) -> bool {
        self.path(&format!("/etc/sudoers.d/90-{user}")).exists()
    }

    fn answer(&self, inv: &Invocation) -> ToolOutput {
        let args: Vec<&str> = inv.args.iter().map(String::as_str).collect();
        match (inv.program.as_str(), args.as_slice()) {
            ("which", [binary]) => {
                let present = BASE_BINARIES.contains(binary)
                    || (PACKAGED_BINARIES.contains(binary) && self.packages_installed.get());
                if present {
                    ToolOutput::succeeded(format!("/usr/bin/{binary}\n"))
                } else {
                    ToolOutput::failed(1, "")
                }
            }
            ("apt-get", args) => {
                if args.contains(&"install") {
                    self.packages_installed.set(true);
                }
                ToolOutput::succeeded("")
            }
            ("getent", ["passwd", user]) => {
                if self.users.borrow().contains_key(*user) {
                    ToolOutput::succeeded(format!("{user}:x:1001:1001::/home/{user}:/bin/bash\n"))
                } else {
                    ToolOutput::failed(2, "")
                }
            }
            ("useradd", [.., user]) => {
                self.add_user(user, &[]);
                ToolOutput::succeeded("")
            }
            ("sudo", ["-l", "-U", user]) => {
                if !self.users.borrow().contains_key(*user) {
                    ToolOutput::failed(1, format!("sudo: unknown user {user}\n"))
                } else if self.sudoers_granted(user) {
                    ToolOutput::succeeded(format!(
                        "User {user} may run the following commands on host:\n    (ALL) NOPASSWD: ALL\n"
                    ))
                } else {
                    ToolOutput::succeeded(format!("User {user} is not allowed to run sudo on host.\n"))
                }
            }
            ("visudo", _) => ToolOutput::succeeded("parsed OK\n"),
            ("id", ["-nG", user]) => match self.users.borrow().get(*user) {
                Some(groups) => ToolOutput::succeeded(format!("{}\n", groups.join(" "))),
                None => ToolOutput::failed(1, format!("id: '{user}': no such user\n")),
            },
            ("usermod", ["-aG", group, user]) => {
                if let Some(groups) = self.users.borrow_mut().get_mut(*user) {
                    groups.push(group.to_string());
                }
                ToolOutput::succeeded("")
            }
            ("chown", _) => ToolOutput::succeeded(""),
            ("sshd", ["-t", "-f", path]) => {
                self.validated
                    .borrow_mut()
                    .push((path.to_string(), self.read(path)));
                if self.sshd_accepts.get() {
                    ToolOutput::succeeded("")
                } else {
                    ToolOutput::failed(255, "/etc/ssh/sshd_config line 7: Bad configuration option\n")
                }
            }
            ("sshd", ["-T", "-f", path]) => ToolOutput::succeeded(self.effective_dump(path)),
            ("systemctl", ["is-active", ..]) => {
                if self.socket_active.get() {
                    ToolOutput::succeeded("")
                } else {
                    ToolOutput::failed(3, "")
                }
            }
            ("systemctl", _) => ToolOutput::succeeded(""),
            ("ufw", ["--force", "reset"]) => {
                self.ufw_rules.borrow_mut().clear();
                ToolOutput::succeeded("")
            }
            ("ufw", ["allow", rule]) => {
                let mut rules = self.ufw_rules.borrow_mut();
                if !rules.iter().any(|r| r == rule) {
                    rules.push(rule.to_string());
                }
                ToolOutput::succeeded("")
            }
            ("ufw", _) => ToolOutput::succeeded(""),
            (program, _) => panic!("fake host does not know {program} ({})", inv.command_line()),
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        if self.dry_run && invocation.destructive {
            self.skipped.borrow_mut().push(invocation.clone());
            return Ok(ToolOutput::succeeded(""));
        }
        self.calls.borrow_mut().push(invocation.clone());
        Ok(self.answer(invocation))
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

pub fn settings(port: u16, user: &str, key: &str) -> Settings {
    Settings {
        params: InvocationParams {
            ssh_port: port,
            admin_user: user.to_string(),
            public_key: key.to_string(),
        },
        ..Default::default()
    }
}

pub fn sanity_ok() -> serverprep::SanityCheckResult {
    serverprep::SanityCheckResult {
        missing_binaries: vec![],
        is_root: true,
    }
}

pub fn exists(host: &FakeHost, host_path: &str) -> bool {
    Path::new(&host.path(host_path)).exists()
}
