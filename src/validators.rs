//! Input validation for the public API. Each function returns
//! `ApiError::Validation` with a client-facing message on failure.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ApiError;

pub const ALLOWED_AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a"];

pub const ALLOWED_EMOTIONS: &[&str] = &[
    "neutral",
    "happy",
    "sad",
    "angry",
    "surprised",
    "disgusted",
    "fearful",
    "calm",
    "excited",
];

pub const MIN_UPLOAD_BYTES: usize = 1024;
pub const MAX_TTS_TEXT_CHARS: usize = 200;
pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_PER_PAGE: u32 = 20;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());
static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-\s\u{4e00}-\u{9fff}]+$").unwrap());

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ApiError::Validation("Invalid email format".into()));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 50 {
        return Err(ApiError::Validation(
            "Username must be 3-50 characters long".into(),
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ApiError::Validation(
            "Username can only contain letters, numbers, underscore and hyphen".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::Validation(
            "Password must contain at least one uppercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::Validation(
            "Password must contain at least one lowercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation(
            "Password must contain at least one number".into(),
        ));
    }
    Ok(())
}

pub fn validate_model_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("Model name is required".into()));
    }
    if name.chars().count() > 100 {
        return Err(ApiError::Validation(
            "Model name must not exceed 100 characters".into(),
        ));
    }
    if !MODEL_NAME_RE.is_match(name) {
        return Err(ApiError::Validation(
            "Model name contains invalid characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_tts_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Validation("Text is required".into()));
    }
    if text.chars().count() > MAX_TTS_TEXT_CHARS {
        return Err(ApiError::Validation(format!(
            "Text must not exceed {} characters",
            MAX_TTS_TEXT_CHARS
        )));
    }
    Ok(())
}

pub fn validate_emotion(emotion: &str) -> Result<(), ApiError> {
    if !ALLOWED_EMOTIONS.contains(&emotion) {
        return Err(ApiError::Validation(format!(
            "Invalid emotion. Allowed: {}",
            ALLOWED_EMOTIONS.join(", ")
        )));
    }
    Ok(())
}

pub fn validate_speed(speed: f64) -> Result<(), ApiError> {
    if !(0.5..=2.0).contains(&speed) {
        return Err(ApiError::Validation(
            "Speed must be between 0.5 and 2.0".into(),
        ));
    }
    Ok(())
}

pub fn validate_role(role: i32) -> Result<(), ApiError> {
    if !(0..=2).contains(&role) {
        return Err(ApiError::Validation(
            "Invalid role. Must be 0 (user), 1 (auditor), or 2 (admin)".into(),
        ));
    }
    Ok(())
}

/// Returns the file extension lowercased, checked against the audio whitelist.
pub fn validate_audio_filename(filename: &str) -> Result<String, ApiError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::Validation("File must have an extension".into()))?;
    if !ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ApiError::Validation(format!(
            "Unsupported audio format. Allowed: {}",
            ALLOWED_AUDIO_EXTENSIONS.join(", ")
        )));
    }
    Ok(ext)
}

pub fn validate_audio_size(size: usize, max_bytes: usize) -> Result<(), ApiError> {
    if size < MIN_UPLOAD_BYTES {
        return Err(ApiError::Validation("File is too small".into()));
    }
    if size > max_bytes {
        return Err(ApiError::Validation(format!(
            "File size exceeds {} byte limit",
            max_bytes
        )));
    }
    Ok(())
}

/// Clamps pagination query parameters to sane bounds.
pub fn validate_pagination(
    page: Option<u32>,
    per_page: Option<u32>,
) -> Result<(u32, u32), ApiError> {
    let page = page.unwrap_or(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);

    if page < 1 {
        return Err(ApiError::Validation("Page number must be positive".into()));
    }
    if per_page < 1 || per_page > MAX_PER_PAGE {
        return Err(ApiError::Validation(format!(
            "Items per page must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }
    Ok((page, per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a.b-c_d@sub.domain.io").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn username_bounds_and_charset() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"a".repeat(50)).is_ok());
        assert!(validate_username(&"a".repeat(51)).is_err());
        assert!(validate_username("user-name_1").is_ok());
        assert!(validate_username("user name").is_err());
        assert!(validate_username("user@name").is_err());
    }

    #[test]
    fn password_strength() {
        assert!(validate_password("Abcdef12").is_ok());
        assert!(validate_password("short1A").is_err());
        assert!(validate_password("alllower1").is_err());
        assert!(validate_password("ALLUPPER1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
    }

    #[test]
    fn model_name_rules() {
        assert!(validate_model_name("My Voice_1").is_ok());
        assert!(validate_model_name("中文名字").is_ok());
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("   ").is_err());
        assert!(validate_model_name(&"x".repeat(101)).is_err());
        assert!(validate_model_name("bad/name").is_err());
    }

    #[test]
    fn tts_text_bounds() {
        assert!(validate_tts_text("hello").is_ok());
        assert!(validate_tts_text("").is_err());
        assert!(validate_tts_text(&"x".repeat(200)).is_ok());
        assert!(validate_tts_text(&"x".repeat(201)).is_err());
    }

    #[test]
    fn emotion_and_speed() {
        assert!(validate_emotion("neutral").is_ok());
        assert!(validate_emotion("bored").is_err());
        assert!(validate_speed(0.5).is_ok());
        assert!(validate_speed(2.0).is_ok());
        assert!(validate_speed(0.49).is_err());
        assert!(validate_speed(2.01).is_err());
    }

    #[test]
    fn audio_filename_whitelist() {
        assert_eq!(validate_audio_filename("voice.WAV").unwrap(), "wav");
        assert_eq!(validate_audio_filename("a.b.mp3").unwrap(), "mp3");
        assert!(validate_audio_filename("noext").is_err());
        assert!(validate_audio_filename("clip.ogg").is_err());
    }

    #[test]
    fn audio_size_bounds() {
        let max = 10 * 1024 * 1024;
        assert!(validate_audio_size(1023, max).is_err());
        assert!(validate_audio_size(1024, max).is_ok());
        assert!(validate_audio_size(max, max).is_ok());
        assert!(validate_audio_size(max + 1, max).is_err());
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        assert_eq!(validate_pagination(None, None).unwrap(), (1, 20));
        assert_eq!(validate_pagination(Some(3), Some(50)).unwrap(), (3, 50));
        assert!(validate_pagination(Some(0), None).is_err());
        assert!(validate_pagination(None, Some(0)).is_err());
        assert!(validate_pagination(None, Some(101)).is_err());
    }

    /// Declared VARCHAR width of a column in schema.sql.
    fn column_width(table: &str, column: &str) -> u32 {
        let schema = include_str!("../schema.sql");
        let start = schema
            .find(&format!("CREATE TABLE IF NOT EXISTS {} (", table))
            .expect("table not in schema");
        let body = &schema[start..];
        let body = &body[..body.find(");").expect("unterminated table")];
        let line = body
            .lines()
            .find(|l| l.trim_start().starts_with(&format!("{} ", column)))
            .expect("column not in table");
        let width = line.find("VARCHAR(").expect("not a VARCHAR column") + "VARCHAR(".len();
        let end = line[width..].find(')').unwrap() + width;
        line[width..end].parse().unwrap()
    }

    #[test]
    fn schema_columns_fit_validated_lengths() {
        // The widest inputs the validators accept must fit their columns,
        // or a valid request dies in the INSERT under strict mode.
        assert!(validate_username(&"a".repeat(50)).is_ok());
        assert!(column_width("users", "username") >= 50);

        assert!(validate_model_name(&"x".repeat(100)).is_ok());
        assert!(column_width("voice_models", "name") >= 100);
        assert!(column_width("clone_tasks", "model_name") >= 100);
    }

    #[test]
    fn role_range() {
        assert!(validate_role(0).is_ok());
        assert!(validate_role(2).is_ok());
        assert!(validate_role(3).is_err());
        assert!(validate_role(-1).is_err());
    }
}
