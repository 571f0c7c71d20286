//! Structural clip validation, the first admission stage.

use crate::error::ValidationError;
use clip_types::{Clip, DEFAULT_MIME};

/// Normalize and check a clip before it enters dedupe and rate limiting.
///
/// An empty `mime` is replaced with [`DEFAULT_MIME`]. A clip with inline
/// data must declare its exact length and fit within `max_inline_bytes`;
/// any other clip must reference an upload with a positive size.
pub fn validate_clip(clip: &mut Clip, max_inline_bytes: usize) -> Result<(), ValidationError> {
    if clip.mime.is_empty() {
        clip.mime = DEFAULT_MIME.to_string();
    }

    if !clip.data.is_empty() {
        let actual = clip.data.len();
        if clip.size != actual as i64 {
            return Err(ValidationError::SizeMismatch {
                declared: clip.size,
                actual,
            });
        }
        if actual > max_inline_bytes {
            return Err(ValidationError::InlineTooLarge {
                size: actual,
                limit: max_inline_bytes,
            });
        }
        return Ok(());
    }

    if clip.upload_url.is_empty() {
        return Err(ValidationError::MissingPayload);
    }
    if clip.size <= 0 {
        return Err(ValidationError::NonPositiveSize(clip.size));
    }
    Ok(())
}
