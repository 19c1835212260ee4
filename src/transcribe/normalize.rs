use serde::{Deserialize, Serialize};

/// Shortest transcript (in characters) accepted as real content
pub const DEFAULT_MIN_CHARS: usize = 10;

/// Longest transcript (in characters) handed back to callers; longer text is clipped
pub const DEFAULT_MAX_CHARS: usize = 100_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transcript too short ({length} characters, minimum {min})")]
    TooShort { length: usize, min: usize },
}

/// Length bounds applied to every transcript leaving the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Collapse whitespace, clip oversized text, reject junk.
///
/// Oversized input is truncated to `max_chars` characters; the length check
/// runs on the final text, so every `Ok` value is itself a fixed point.
pub fn normalize(raw: &str, limits: &TextLimits) -> Result<String, ValidationError> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let length = collapsed.chars().count();

    let text = if length <= limits.max_chars {
        collapsed
    } else {
        tracing::debug!("Truncating transcript from {} to {} characters", length, limits.max_chars);

        let truncated: String = collapsed.chars().take(limits.max_chars).collect();
        truncated.trim_end().to_string()
    };

    let length = text.chars().count();
    if length < limits.min_chars {
        return Err(ValidationError::TooShort {
            length,
            min: limits.min_chars,
        });
    }

    Ok(text)
}
