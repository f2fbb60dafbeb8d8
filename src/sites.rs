//! Recognized video sites.
//!
//! Navigation on these hosts resets the tab's counter and asks the page to
//! rescan. Matching is on the URL host, including subdomains
//! (`m.youtube.com`, `www.vk.com`).

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSite {
    YouTube,
    Vk,
}

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^https?://(?:[a-z0-9-]+\.)*(youtube\.com|vk\.com|vkvideo\.ru)(?::\d+)?(?:[/?#]|$)")
            .expect("static site pattern")
    })
}

impl VideoSite {
    pub fn from_url(url: &str) -> Option<Self> {
        let caps = host_pattern().captures(url)?;
        match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
            "youtube.com" => Some(VideoSite::YouTube),
            "vk.com" | "vkvideo.ru" => Some(VideoSite::Vk),
            _ => None,
        }
    }
}

pub fn is_recognized(url: &str) -> bool {
    VideoSite::from_url(url).is_some()
}
