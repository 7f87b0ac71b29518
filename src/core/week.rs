//! Week locator: id normalization and course-root discovery.
//!
//! A week token may be bare digits ("6", "06") or a canonical slug
//! ("week_06", case-insensitive). Everything downstream works with the
//! canonical `week_NN` form. A token that cannot be normalized is a usage
//! error, not a gate Problem.

use crate::core::error::WeekgateError;
use std::path::{Path, PathBuf};

/// Normalize a user-supplied week token to the canonical `week_NN` slug.
pub fn normalize_week(token: &str) -> Result<String, WeekgateError> {
    let lower = token.trim().to_ascii_lowercase();
    let digits = lower.strip_prefix("week_").unwrap_or(&lower);
    match digits.parse::<u32>() {
        Ok(n) => Ok(format!("week_{:02}", n)),
        Err(_) => Err(WeekgateError::Usage(format!(
            "invalid week id {:?} (expected e.g. 06 or week_06)",
            token
        ))),
    }
}

/// Walk upward from `start_dir` until a directory containing `chapters/`
/// is found.
pub fn find_course_root(start_dir: &Path) -> Result<PathBuf, WeekgateError> {
    let mut current = PathBuf::from(start_dir);
    loop {
        if current.join("chapters").is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(WeekgateError::Usage(
                "'chapters' directory not found in current or parent directories".to_string(),
            ));
        }
    }
}

pub fn week_dir(root: &Path, week: &str) -> PathBuf {
    root.join("chapters").join(week)
}
