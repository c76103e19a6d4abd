use regex::Regex;

lazy_static::lazy_static! {
    /// Watch, short-link, embed and `/v/` forms of a YouTube URL.
    static ref YOUTUBE_REGEX: Regex = Regex::new(
        r"(?:https?://)?(?:www\.)?(?:youtube\.com/(?:[^/]+/.*|(?:v|e(?:mbed)?)/|\S*?[?&]v=)|youtu\.be/)([a-zA-Z0-9_-]{11})"
    )
    .expect("youtube pattern is valid");
}

/// Canonical embeddable URL for a recognized video link; anything else is
/// returned unchanged.
pub fn normalize_video_url(url: &str) -> String {
    match YOUTUBE_REGEX.captures(url).and_then(|caps| caps.get(1)) {
        Some(id) => format!("https://www.youtube.com/embed/{}", id.as_str()),
        None => url.to_string(),
    }
}
