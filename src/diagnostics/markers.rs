//! Phrase lists used to recognize blocked, gated and script-only pages
//!
//! All entries are lowercase; callers match against lowercased text.

/// Anti-bot challenges and edge-protection interstitials
pub const CHALLENGE_MARKERS: &[&str] = &[
    "captcha",
    "recaptcha",
    "hcaptcha",
    "g-recaptcha",
    "cf-turnstile",
    "verify you are human",
    "verify you are a human",
    "are you a robot",
    "are you human",
    "checking your browser",
    "just a moment...",
    "attention required! | cloudflare",
    "cf-chl-",
    "ddos protection by",
    "access denied | ",
    "request unsuccessful. incapsula",
    "pardon our interruption",
    "press & hold",
    "px-captcha",
    "unusual traffic from your computer",
];

/// Login walls and paywalls
pub const AUTH_MARKERS: &[&str] = &[
    "please log in",
    "please login",
    "please sign in",
    "sign in to continue",
    "log in to continue",
    "login to continue",
    "you must be logged in",
    "you need to sign in",
    "members only",
    "subscribe to continue reading",
    "subscription required",
    "this content is for subscribers",
];

/// Pages telling the client to enable scripts
pub const JS_REQUIRED_MARKERS: &[&str] = &[
    "enable javascript",
    "javascript is required",
    "javascript is disabled",
    "requires javascript",
    "you need to enable javascript",
    "please turn on javascript",
    "this app works best with javascript enabled",
    "<noscript>you need to enable",
];

/// Returns the first marker contained in `lowered`
pub fn find_marker<'a>(lowered: &str, markers: &[&'a str]) -> Option<&'a str> {
    markers.iter().copied().find(|marker| lowered.contains(marker))
}
