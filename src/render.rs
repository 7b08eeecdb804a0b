use crate::client::lyrics::current_line;
use crate::player::PlayerState;

/// `mm:ss`, wrapping at the hour
pub fn to_time(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{:02}:{:02}", (secs / 60) % 60, secs % 60)
}

/// The lyric line being sung, if the track has lyrics
pub fn lyric_line(state: &PlayerState) -> Option<&str> {
    let lyrics = state.lyrics.as_ref()?;
    if lyrics.lines.is_empty() {
        return None;
    }
    let index = current_line(&lyrics.lines, state.progress_ms);
    Some(lyrics.lines[index].words.as_str())
}

pub fn status_line(state: &PlayerState) -> String {
    let icon = if state.is_playing { "▶" } else { "❚❚" };
    let progress = state.progress_ms.min(state.duration_ms);
    let mut line = format!(
        "{} — {}  {} / {}  [{}]",
        state.track.name,
        state.track.album.author,
        to_time(progress),
        to_time(state.duration_ms),
        icon,
    );
    if let Some(words) = lyric_line(state) {
        line.push_str("  ♪ ");
        line.push_str(words);
    }
    line
}
