// Text cleanup module
// Applies regex patterns and feature stripping to track/album/artist names

use crate::config::CleanupConfig;
use regex::Regex;

/// Markers that introduce a featured-artist suffix, tried in this order
const FEATURE_MARKERS: [&str; 3] = ["(feat", "( feat", "feat."];

/// Cut a featured-artist suffix such as "(feat. X)" off a title or artist.
///
/// Matching is ASCII case-insensitive. A single space right before the marker
/// is dropped with it. Strings without a marker come back unchanged.
pub fn strip_features(text: &str) -> &str {
    // ASCII lowering keeps byte offsets valid for slicing the original
    let lower = text.to_ascii_lowercase();
    for marker in FEATURE_MARKERS {
        if let Some(i) = lower.find(marker) {
            let cut = if text[..i].ends_with(' ') { i - 1 } else { i };
            return &text[..cut];
        }
    }
    text
}

pub struct TextCleaner {
    enabled: bool,
    patterns: Vec<Regex>,
}

impl TextCleaner {
    /// Create a new text cleaner from config
    pub fn new(config: &CleanupConfig) -> Self {
        let patterns = if config.enabled {
            config
                .patterns
                .iter()
                .filter_map(|pattern| match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        log::warn!("Invalid regex pattern '{}': {}", pattern, e);
                        None
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            enabled: config.enabled,
            patterns,
        }
    }

    /// A cleaner that leaves every string as is
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            patterns: Vec::new(),
        }
    }

    /// Clean a text string by applying all patterns
    pub fn clean(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        let mut result = text.to_string();
        for pattern in &self.patterns {
            result = pattern.replace_all(&result, "").to_string();
        }

        result.trim().to_string()
    }

    /// Clean an optional string
    pub fn clean_option(&self, text: Option<&str>) -> Option<String> {
        text.map(|s| self.clean(s))
    }
}
