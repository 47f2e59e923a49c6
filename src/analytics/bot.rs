//! Heuristic bot classification on user-agent strings.
//!
//! A `true` here drops the visit before any write, cache or usage-meter
//! interaction happens.

use woothee::parser::Parser;

/// Substrings (lowercased) that mark a crawler, preview fetcher or script
/// client. Checked before the structured UA parse so truncated or fake UAs
/// still match.
const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawler",
    "crawling",
    "spider",
    "facebookexternalhit",
    "whatsapp",
    "telegram",
    "slackbot",
    "discordbot",
    "twitterbot",
    "linkedinbot",
    "pinterest",
    "embedly",
    "quora link preview",
    "vkshare",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "okhttp",
    "headlesschrome",
    "phantomjs",
    "lighthouse",
];

pub fn is_bot(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }

    let lowered = user_agent.to_ascii_lowercase();
    if BOT_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
        return true;
    }

    matches!(
        Parser::new().parse(user_agent),
        Some(result) if result.category == "crawler"
    )
}
