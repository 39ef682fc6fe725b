//! Parsers for advisory telemetry derived from command replies.
//!
//! Replies carry `§x` formatting codes and differ slightly between server
//! flavours, so every parser here is lenient and returns a neutral value
//! instead of an error.

use std::sync::LazyLock;

use regex::Regex;

static FORMATTING_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"§[0-9a-fk-orA-FK-OR]").ok());

static TICK_RATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)tps from last [^:]*:\s*\*?\s*([0-9]+(?:\.[0-9]+)?)").ok()
});

static PLAYERS_ONLINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)players? online[.:]?(.*)$").ok());

/// Remove `§x` formatting codes.
#[must_use]
pub fn strip_formatting(text: &str) -> String {
    match FORMATTING_CODE.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_owned(),
    }
}

/// Parse the most recent one-minute tick rate from a `tps` reply.
#[must_use]
pub fn parse_tick_rate(reply: &str) -> Option<f64> {
    let clean = strip_formatting(reply);
    let caps = TICK_RATE.as_ref()?.captures(&clean)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Parse online player names from a `list` reply.
///
/// Handles the vanilla single-line form and the grouped multi-line form
/// (`group: a, b`).
#[must_use]
pub fn parse_player_list(reply: &str) -> Vec<String> {
    let clean = strip_formatting(reply);
    let Some(tail) = PLAYERS_ONLINE
        .as_ref()
        .and_then(|re| re.captures(&clean))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
    else {
        return Vec::new();
    };

    tail.lines()
        .flat_map(|line| {
            let names = line.rsplit_once(": ").map_or(line, |(_, names)| names);
            names.split(',')
        })
        .map(|name| name.trim().trim_start_matches(':').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}
