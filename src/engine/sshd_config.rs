//! SSH Daemon Configuration Engine
//!
//! Parses `sshd_config` into an ordered line model, upserts the hardening
//! policy and serializes it back. Lines the policy does not touch are kept
//! byte-for-byte, and the file keeps its line ending (LF or CRLF, as found
//! on its first line). The rendered file always ends with a newline.
//!
//! # Upsert rules (per directive, keyword matched case-insensitively)
//!
//! | Situation in the global section | Result |
//! |---|---|
//! | Active line(s) present | First rewritten in place, later duplicates dropped |
//! | Only a commented default (`#Keyword value`) | First one uncommented in place |
//! | Neither | Inserted before the first `Match` block, or appended |
//!
//! The global section ends at the first active `Match` line; directives inside
//! `Match` blocks are conditional overrides and are left alone.
//!
//! # Design
//!
//! - **Pure logic**: no I/O; the SSH hardener stage owns reading and writing
//! - **One canonical value** per directive, whichever branch applies

use std::fmt;

use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

// ============================================================================
// Hardening Policy
// ============================================================================

/// Directives serverprep enforces, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, EnumIter, IntoStaticStr)]
pub enum HardeningDirective {
    Port,
    PermitRootLogin,
    PasswordAuthentication,
    PubkeyAuthentication,
    PermitEmptyPasswords,
    PermitUserEnvironment,
    AllowTcpForwarding,
    X11Forwarding,
    MaxAuthTries,
    MaxSessions,
    ChallengeResponseAuthentication,
    #[strum(serialize = "UsePAM")]
    UsePam,
}

/// Authentication attempts allowed per connection.
pub const MAX_AUTH_TRIES: u32 = 3;

/// Concurrent sessions allowed per connection.
pub const MAX_SESSIONS: u32 = 2;

impl HardeningDirective {
    /// Keyword as written in `sshd_config`.
    pub fn keyword(self) -> &'static str {
        self.into()
    }

    /// Canonical value. Only `Port` depends on input.
    pub fn value(self, port: u16) -> String {
        match self {
            Self::Port => port.to_string(),
            Self::PermitRootLogin
            | Self::PasswordAuthentication
            | Self::PermitEmptyPasswords
            | Self::PermitUserEnvironment
            | Self::AllowTcpForwarding
            | Self::X11Forwarding
            | Self::ChallengeResponseAuthentication => "no".to_string(),
            Self::PubkeyAuthentication | Self::UsePam => "yes".to_string(),
            Self::MaxAuthTries => MAX_AUTH_TRIES.to_string(),
            Self::MaxSessions => MAX_SESSIONS.to_string(),
        }
    }
}

/// A directive paired with the value it must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSetting {
    pub directive: HardeningDirective,
    pub value: String,
}

impl DirectiveSetting {
    /// `Keyword value`
    pub fn line(&self) -> String {
        format!("{} {}", self.directive.keyword(), self.value)
    }
}

/// The full hardening policy for a given listening port.
pub fn hardening_policy(port: u16) -> Vec<DirectiveSetting> {
    HardeningDirective::iter()
        .map(|directive| DirectiveSetting {
            directive,
            value: directive.value(port),
        })
        .collect()
}

/// Settings whose effective value, as dumped by `sshd -T`, differs from the
/// policy. Each entry reads `keyword actual (want expected)`.
///
/// Keywords missing from the dump are skipped: newer daemons print some of
/// them under another name (`challengeresponseauthentication` shows up as
/// `kbdinteractiveauthentication`).
pub fn effective_overrides(effective: &str, policy: &[DirectiveSetting]) -> Vec<String> {
    policy
        .iter()
        .filter_map(|setting| {
            let keyword = setting.directive.keyword().to_ascii_lowercase();
            let wrong: Vec<&str> = effective
                .lines()
                .filter_map(|line| line.trim().split_once(char::is_whitespace))
                .filter(|(key, _)| *key == keyword)
                .map(|(_, value)| value.trim())
                .filter(|value| !value.eq_ignore_ascii_case(&setting.value))
                .collect();
            (!wrong.is_empty())
                .then(|| format!("{keyword} {} (want {})", wrong.join(","), setting.value))
        })
        .collect()
}

// ============================================================================
// Line classification
// ============================================================================

/// How a single configuration line reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    /// A comment; `body` is everything after the leading `#`.
    Comment { body: &'a str },
    Directive { keyword: &'a str, value: &'a str },
}

/// Split `Keyword value` / `Keyword=value`.
fn split_directive(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let end = text.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = &text[..end];
    let value = text[end..]
        .trim_start()
        .strip_prefix('=')
        .unwrap_or_else(|| text[end..].trim_start())
        .trim();
    if keyword.is_empty() || value.is_empty() {
        return None;
    }
    Some((keyword, value))
}

fn classify(line: &str) -> LineKind<'_> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if let Some(body) = trimmed.strip_prefix('#') {
        return LineKind::Comment { body };
    }
    match split_directive(trimmed) {
        Some((keyword, value)) => LineKind::Directive { keyword, value },
        // A bare keyword is not valid sshd syntax; treat it as opaque text.
        None => LineKind::Comment { body: trimmed },
    }
}

/// A commented-out default looks like `#Keyword value` with a single-token
/// value. Prose comments that merely mention a keyword do not qualify.
fn commented_default(body: &str) -> Option<&str> {
    let text = body.trim();
    if text.starts_with('#') {
        return None;
    }
    let (keyword, value) = split_directive(text)?;
    if value.split_whitespace().count() != 1 {
        return None;
    }
    Some(keyword)
}

// ============================================================================
// Change reporting
// ============================================================================

/// What happened to one directive during `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    /// Already present with the canonical value.
    Unchanged,
    /// An active line with a different value (or spelling) was rewritten.
    Rewritten { previous: String },
    /// A commented-out default was activated.
    Uncommented { previous: String },
    /// No candidate line existed; a new one was added.
    Inserted,
}

/// Per-directive outcome of `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveChange {
    pub directive: HardeningDirective,
    pub value: String,
    pub action: ChangeAction,
    /// Extra active lines for the same keyword that were dropped.
    pub removed_duplicates: usize,
}

impl DirectiveChange {
    pub fn is_change(&self) -> bool {
        self.action != ChangeAction::Unchanged || self.removed_duplicates > 0
    }
}

impl fmt::Display for DirectiveChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.directive.keyword();
        match &self.action {
            ChangeAction::Unchanged => write!(f, "{keyword} {} (unchanged)", self.value)?,
            ChangeAction::Rewritten { previous } => {
                write!(f, "{keyword} {} (was: {previous})", self.value)?
            }
            ChangeAction::Uncommented { previous } => {
                write!(f, "{keyword} {} (uncommented: {previous})", self.value)?
            }
            ChangeAction::Inserted => write!(f, "{keyword} {} (added)", self.value)?,
        }
        if self.removed_duplicates > 0 {
            write!(f, ", {} duplicate(s) removed", self.removed_duplicates)?;
        }
        Ok(())
    }
}

// ============================================================================
// Configuration model
// ============================================================================

/// An `sshd_config` file as an ordered list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SshdConfig {
    lines: Vec<String>,
    crlf: bool,
}

impl SshdConfig {
    /// Parse file contents. Never fails: unknown lines are kept verbatim.
    pub fn parse(contents: &str) -> Self {
        let crlf = contents
            .split_once('\n')
            .is_some_and(|(first, _)| first.ends_with('\r'));
        Self {
            lines: contents.lines().map(str::to_string).collect(),
            crlf,
        }
    }

    /// Serialize back to file contents, newline-terminated.
    pub fn render(&self) -> String {
        let eol = if self.crlf { "\r\n" } else { "\n" };
        let mut out = self.lines.join(eol);
        if !out.is_empty() {
            out.push_str(eol);
        }
        out
    }

    /// Index of the first active `Match` line (end of the global section).
    fn global_end(&self) -> usize {
        self.lines
            .iter()
            .position(|line| {
                matches!(classify(line), LineKind::Directive { keyword, .. }
                    if keyword.eq_ignore_ascii_case("Match"))
            })
            .unwrap_or(self.lines.len())
    }

    /// Active values for `keyword` in the global section, in file order.
    pub fn global_values(&self, keyword: &str) -> Vec<&str> {
        self.lines[..self.global_end()]
            .iter()
            .filter_map(|line| match classify(line) {
                LineKind::Directive { keyword: k, value } if k.eq_ignore_ascii_case(keyword) => {
                    Some(value)
                }
                _ => None,
            })
            .collect()
    }

    /// The effective global value for `keyword` (sshd uses the first one).
    pub fn value_of(&self, keyword: &str) -> Option<&str> {
        self.global_values(keyword).into_iter().next()
    }

    /// Targets of active `Include` directives anywhere in the file.
    pub fn includes(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match classify(line) {
                LineKind::Directive { keyword, value } if keyword.eq_ignore_ascii_case("Include") => {
                    Some(value)
                }
                _ => None,
            })
            .collect()
    }

    /// Upsert a single setting.
    pub fn upsert(&mut self, setting: &DirectiveSetting) -> DirectiveChange {
        let keyword = setting.directive.keyword();
        let canonical = setting.line();
        let global_end = self.global_end();

        let active: Vec<usize> = (0..global_end)
            .filter(|&i| {
                matches!(classify(&self.lines[i]), LineKind::Directive { keyword: k, .. }
                    if k.eq_ignore_ascii_case(keyword))
            })
            .collect();

        if let Some((&first, duplicates)) = active.split_first() {
            let previous = self.lines[first].trim().to_string();
            let action = if previous == canonical {
                ChangeAction::Unchanged
            } else {
                ChangeAction::Rewritten { previous }
            };
            self.lines[first] = canonical;
            // Remove from the back so earlier indices stay valid.
            for &idx in duplicates.iter().rev() {
                self.lines.remove(idx);
            }
            return DirectiveChange {
                directive: setting.directive,
                value: setting.value.clone(),
                action,
                removed_duplicates: duplicates.len(),
            };
        }

        let commented = (0..global_end).find(|&i| match classify(&self.lines[i]) {
            LineKind::Comment { body } => {
                commented_default(body).is_some_and(|k| k.eq_ignore_ascii_case(keyword))
            }
            _ => false,
        });

        let action = match commented {
            Some(idx) => {
                let previous = self.lines[idx].trim().to_string();
                self.lines[idx] = canonical;
                ChangeAction::Uncommented { previous }
            }
            None => {
                self.lines.insert(global_end, canonical);
                ChangeAction::Inserted
            }
        };

        DirectiveChange {
            directive: setting.directive,
            value: setting.value.clone(),
            action,
            removed_duplicates: 0,
        }
    }

    /// Apply every setting in order.
    pub fn apply(&mut self, settings: &[DirectiveSetting]) -> Vec<DirectiveChange> {
        settings.iter().map(|s| self.upsert(s)).collect()
    }
}
