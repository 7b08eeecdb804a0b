use async_trait::async_trait;

use crate::LOG;

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct LyricLine {
    #[serde(rename = "startTimeMs")]
    pub start_time_ms: String,
    pub words: String,
}

impl LyricLine {
    pub fn start_ms(&self) -> Option<i64> {
        self.start_time_ms.trim().parse().ok()
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Lyrics {
    pub lines: Vec<LyricLine>,
}

/// Index of the line being sung at `progress_ms`: the last line that has
/// already started, or the first line if none has.
pub fn current_line(lines: &[LyricLine], progress_ms: i64) -> usize {
    let mut current = 0;
    for (index, line) in lines.iter().enumerate() {
        if let Some(start) = line.start_ms() {
            if start <= progress_ms {
                current = index;
            }
        }
    }
    current
}

#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// Synced lyrics for a track, `None` when there aren't any
    async fn fetch(&self, track_id: &str) -> Option<Lyrics>;
}

pub struct LyricsApi {
    client: surf::Client,
    base_url: String,
}

impl LyricsApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: surf::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl LyricsSource for LyricsApi {
    async fn fetch(&self, track_id: &str) -> Option<Lyrics> {
        let url = surf::Url::parse_with_params(&self.base_url, &[("trackid", track_id)]).ok()?;
        let mut resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                slog::debug!(LOG, "lyrics request error {}", e; "track_id" => track_id);
                return None;
            }
        };
        match resp.body_json::<Lyrics>().await {
            Ok(lyrics) => Some(lyrics),
            Err(e) => {
                slog::debug!(LOG, "no lyrics {}", e; "track_id" => track_id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(starts: &[&str]) -> Vec<LyricLine> {
        starts
            .iter()
            .enumerate()
            .map(|(i, s)| LyricLine {
                start_time_ms: s.to_string(),
                words: format!("line {}", i),
            })
            .collect()
    }

    #[test]
    fn picks_last_started_line() {
        let ls = lines(&["0", "1000", "2500", "4000"]);
        assert_eq!(current_line(&ls, 0), 0);
        assert_eq!(current_line(&ls, 999), 0);
        assert_eq!(current_line(&ls, 1000), 1);
        assert_eq!(current_line(&ls, 3999), 2);
        assert_eq!(current_line(&ls, 100_000), 3);
    }

    #[test]
    fn before_first_line_and_empty_lyrics_are_zero() {
        assert_eq!(current_line(&lines(&["500", "900"]), 100), 0);
        assert_eq!(current_line(&[], 1234), 0);
    }

    #[test]
    fn unparsable_start_times_are_skipped() {
        let ls = lines(&["0", "oops", "2000"]);
        assert_eq!(current_line(&ls, 1500), 0);
        assert_eq!(current_line(&ls, 2000), 2);
    }

    #[test]
    fn parses_lyrics_api_body() {
        let body = r#"{"error":false,"syncType":"LINE_SYNCED","lines":[
            {"startTimeMs":"960","words":"hello","syllables":[],"endTimeMs":"0"}]}"#;
        let lyrics: Lyrics = serde_json::from_str(body).unwrap();
        assert_eq!(lyrics.lines[0].start_ms(), Some(960));
        assert_eq!(lyrics.lines[0].words, "hello");
        assert!(serde_json::from_str::<Lyrics>(r#"{"error":true,"message":"no lyrics"}"#).is_err());
    }
}
