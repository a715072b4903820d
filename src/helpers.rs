//! Small shared helpers: filenames, hashing, client metadata, estimates
//! and the pagination envelope used by every list endpoint.

use actix_web::HttpRequest;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Pagination envelope returned by list endpoints.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: u32, per_page: u32) -> Self {
        let per = per_page as i64;
        let pages = (total + per - 1) / per;
        Page {
            has_prev: page > 1,
            has_next: (page as i64) * per < total,
            items,
            total,
            page,
            per_page,
            pages,
        }
    }
}

/// SQL OFFSET for a 1-based page number.
pub fn page_offset(page: u32, per_page: u32) -> i64 {
    ((page - 1) as i64) * (per_page as i64)
}

/// Unique on-disk filename preserving the original extension.
pub fn unique_filename(original: &str, prefix: &str) -> String {
    let ext = original
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    let id = Uuid::new_v4();
    match (prefix.is_empty(), ext.is_empty()) {
        (true, true) => id.to_string(),
        (true, false) => format!("{}.{}", id, ext),
        (false, true) => format!("{}_{}", prefix, id),
        (false, false) => format!("{}_{}.{}", prefix, id, ext),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Client IP, honoring X-Forwarded-For when the service sits behind a proxy.
pub fn client_ip(req: &HttpRequest) -> Option<String> {
    if let Some(forwarded) = req.headers().get("X-Forwarded-For") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                return Some(first.trim().to_string());
            }
        }
    }
    req.peer_addr().map(|addr| addr.ip().to_string())
}

pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size_bytes == 0 {
        return "0B".into();
    }
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", size, UNITS[unit])
}

/// Rough synthesized-audio length from text: CJK characters speak slower
/// than latin ones; scaled by the speed multiplier.
pub fn estimate_audio_duration(text: &str, speed: f64) -> f64 {
    let cjk = text
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();
    let other = text.chars().count() - cjk;
    let seconds = (cjk as f64 * 0.15 + other as f64 * 0.1) / speed;
    (seconds * 100.0).round() / 100.0
}

/// Estimated completion time for a training run, from sample count and
/// total sample duration.
pub fn estimate_training_completion(sample_count: i64, total_duration_secs: f64) -> DateTime<Utc> {
    let secs = 120.0 + sample_count as f64 * 30.0 + total_duration_secs * 2.0;
    Utc::now() + Duration::seconds(secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_math() {
        let p = Page::new(vec![1, 2, 3], 45, 2, 20);
        assert_eq!(p.pages, 3);
        assert!(p.has_prev);
        assert!(p.has_next);

        let last = Page::new(vec![1], 45, 3, 20);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty: Page<i32> = Page::new(vec![], 0, 1, 20);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_prev);
        assert!(!empty.has_next);
    }

    #[test]
    fn offsets_are_zero_based() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
    }

    #[test]
    fn unique_filenames_keep_extension() {
        let a = unique_filename("clip.WAV", "user_1");
        assert!(a.starts_with("user_1_"));
        assert!(a.ends_with(".wav"));

        let b = unique_filename("noext", "");
        assert!(!b.contains('.'));

        assert_ne!(unique_filename("x.mp3", ""), unique_filename("x.mp3", ""));
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn file_sizes_format() {
        assert_eq!(format_file_size(0), "0B");
        assert_eq!(format_file_size(512), "512.0B");
        assert_eq!(format_file_size(2048), "2.0KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10.0MB");
    }

    #[test]
    fn audio_estimate_scales_with_speed() {
        let normal = estimate_audio_duration("hello world", 1.0);
        let fast = estimate_audio_duration("hello world", 2.0);
        assert!((normal - 1.1).abs() < 1e-9);
        assert!((fast - normal / 2.0).abs() < 1e-9);

        // CJK characters take longer than latin ones
        assert!(estimate_audio_duration("你好你好", 1.0) > estimate_audio_duration("abcd", 1.0));
    }

    #[test]
    fn training_estimate_is_in_the_future() {
        let eta = estimate_training_completion(3, 60.0);
        assert!(eta > Utc::now());
    }
}
