//! Console command policy.
//!
//! Decides whether a caller may forward a console command. Commands that
//! change the server's lifecycle or operator list are always blocked here
//! because they have dedicated, audited flows. Moderators are further
//! limited to a chat-and-moderation allow-set.

use tracing::{info, info_span};

use crate::models::permission::PermissionTier;

/// Commands no tier may send through the console.
pub const BLOCKED_COMMANDS: &[&str] = &[
    "stop",
    "restart",
    "reload",
    "op",
    "deop",
    "save-off",
    "whitelist off",
    "ban-ip",
    "pardon-ip",
];

/// Commands available to the moderator tier.
pub const MODERATOR_COMMANDS: &[&str] = &[
    "say", "tell", "msg", "w", "me", "list", "tps", "kick", "ban", "pardon", "whitelist", "time",
    "weather", "tp", "gamemode",
];

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDecision {
    /// Whether the command may be forwarded.
    pub allowed: bool,
    /// Why it was denied; `None` when allowed.
    pub reason: Option<String>,
}

impl CommandDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Blocked set plus moderator allow-set.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    blocked: Vec<String>,
    moderator_allowed: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            blocked: BLOCKED_COMMANDS.iter().map(|s| (*s).to_owned()).collect(),
            moderator_allowed: MODERATOR_COMMANDS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl CommandPolicy {
    /// Evaluate `command` for a caller holding `tier`.
    ///
    /// Evaluation order:
    /// 1. Normalize: trim, drop one leading `/`, lowercase, drop the
    ///    `minecraft:` namespace.
    /// 2. Blocked set: any match denies, for every tier.
    /// 3. Moderators: allowed only on an allow-set match.
    /// 4. Higher tiers: allowed.
    #[must_use]
    pub fn evaluate(&self, command: &str, tier: PermissionTier) -> CommandDecision {
        let normalized = normalize(command);
        let _span = info_span!("command_policy", tier = %tier).entered();

        if let Some(entry) = first_match(&self.blocked, &normalized) {
            info!(entry, "blocked console command");
            return CommandDecision::deny(format!(
                "'{entry}' is blocked from the console; use the dedicated control instead"
            ));
        }

        if tier == PermissionTier::Moderator
            && first_match(&self.moderator_allowed, &normalized).is_none()
        {
            let verb = normalized.split_whitespace().next().unwrap_or_default();
            return CommandDecision::deny(format!(
                "'{verb}' is not available to the moderator tier"
            ));
        }

        CommandDecision::allow()
    }
}

/// Namespace the server also accepts in front of built-in commands.
const BUILTIN_NAMESPACE: &str = "minecraft:";

/// Trim, drop one leading slash, lowercase, drop the `minecraft:`
/// namespace.
#[must_use]
pub fn normalize(command: &str) -> String {
    let trimmed = command.trim();
    let lowered = trimmed
        .strip_prefix('/')
        .unwrap_or(trimmed)
        .trim_start()
        .to_lowercase();
    match lowered.strip_prefix(BUILTIN_NAMESPACE) {
        Some(rest) => rest.to_owned(),
        None => lowered,
    }
}

fn first_match<'a>(entries: &'a [String], command: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|entry| {
            command == entry.as_str()
                || command
                    .strip_prefix(entry.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
        })
        .map(String::as_str)
}
