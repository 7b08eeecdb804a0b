/*!
Playback state as the player shows it.

Two copies are kept: `state` is what spotify last reported and
`optimistic` is what gets rendered. The optimistic copy is moved
forward between polls using the wall clock, and is changed right
away on user actions before spotify confirms them.
*/
use std::time::Duration;

use crate::client::lyrics::{Lyrics, LyricsSource};
use crate::client::spotify::{CurrentlyPlaying, Image, PlayingItem, SpotifyApi};
use crate::{now_millis, LOG};

pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const INTERPOLATE_INTERVAL: Duration = Duration::from_millis(50);
pub const RESYNC_DELAY: Duration = Duration::from_millis(400);
// spotify takes a while before it reports the new position
pub const SEEK_SETTLE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: String,
    pub images: Vec<Image>,
    pub name: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub preview_url: Option<String>,
    pub album: Album,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub device_id: Option<String>,
    pub progress_ms: i64,
    pub duration_ms: i64,
    pub is_playing: bool,
    // millis since epoch when the timing fields were last set
    pub last_update: i64,
    pub track: Track,
    pub lyrics: Option<Lyrics>,
}

impl PlayerState {
    pub fn from_playback(playing: CurrentlyPlaying, lyrics: Option<Lyrics>, now: i64) -> Self {
        let (track, duration_ms) = match playing.item {
            PlayingItem::Track(t) => {
                let author = t
                    .artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let album = Album {
                    id: t.album.id.unwrap_or_default(),
                    images: t.album.images,
                    name: t.album.name,
                    author,
                };
                (
                    Track {
                        id: t.id.unwrap_or_default(),
                        name: t.name,
                        preview_url: t.preview_url,
                        album,
                    },
                    t.duration_ms,
                )
            }
            PlayingItem::Episode(e) => {
                let album = Album {
                    id: e.show.id,
                    images: e.show.images,
                    name: e.show.name,
                    author: e.show.publisher,
                };
                (
                    Track {
                        id: e.id,
                        name: e.name,
                        preview_url: e.preview_url,
                        album,
                    },
                    e.duration_ms,
                )
            }
        };
        Self {
            device_id: playing.device.id,
            progress_ms: playing.progress_ms,
            duration_ms,
            is_playing: playing.is_playing,
            last_update: now,
            track,
            lyrics,
        }
    }

    /// Move progress forward by the time elapsed since `last_update`
    pub fn interpolated(&self, now: i64) -> Self {
        let mut next = self.clone();
        if self.is_playing {
            next.progress_ms += (now - self.last_update).max(0);
        }
        next.last_update = now;
        next
    }

    pub fn device(&self) -> Option<&str> {
        self.device_id.as_deref()
    }
}

/// Work to do a while after a command was sent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FollowUp {
    /// poll again, spotify should have caught up by then
    Resync(Duration),
    /// start polling again after a seek
    ResumePolling(Duration),
}

impl FollowUp {
    pub fn delay(&self) -> Duration {
        match self {
            FollowUp::Resync(d) | FollowUp::ResumePolling(d) => *d,
        }
    }
}

pub struct Player<A, L> {
    api: A,
    lyrics: L,
    state: Option<PlayerState>,
    optimistic: Option<PlayerState>,
    poll_paused: bool,
    pub resync_delay: Duration,
    pub seek_settle_delay: Duration,
}

impl<A: SpotifyApi, L: LyricsSource> Player<A, L> {
    pub fn new(api: A, lyrics: L) -> Self {
        Self {
            api,
            lyrics,
            state: None,
            optimistic: None,
            poll_paused: false,
            resync_delay: RESYNC_DELAY,
            seek_settle_delay: SEEK_SETTLE_DELAY,
        }
    }

    pub fn state(&self) -> Option<&PlayerState> {
        self.state.as_ref()
    }

    pub fn optimistic_state(&self) -> Option<&PlayerState> {
        self.optimistic.as_ref()
    }

    pub fn is_poll_paused(&self) -> bool {
        self.poll_paused
    }

    /// Poll spotify and replace both copies of the state. Errors and
    /// "nothing playing" leave the current state alone.
    pub async fn update_status(&mut self) {
        let playing = match self.api.currently_playing().await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                slog::debug!(LOG, "playback poll failed {}", e);
                return;
            }
        };

        let track_id = playing.item.id().to_string();
        // local files have no id to look lyrics up by
        let lyrics = match &self.state {
            _ if track_id.is_empty() => None,
            Some(s) if s.track.id == track_id => s.lyrics.clone(),
            _ => self.lyrics.fetch(&track_id).await,
        };
        let new_state = PlayerState::from_playback(playing, lyrics, now_millis());
        self.state = Some(new_state.clone());
        self.optimistic = Some(new_state);
    }

    /// A poll timer tick, skipped while a seek settles
    pub async fn poll_tick(&mut self) {
        if self.poll_paused {
            return;
        }
        self.update_status().await;
    }

    /// Change the optimistic state, stamping it with `now`
    pub fn update_optimistic<F: FnOnce(&mut PlayerState)>(&mut self, now: i64, f: F) {
        if let Some(s) = self.optimistic.as_mut() {
            f(s);
            s.last_update = now;
        }
    }

    /// An interpolation timer tick
    pub fn interpolate(&mut self, now: i64) {
        if let Some(s) = self.optimistic.as_ref() {
            self.optimistic = Some(s.interpolated(now));
        }
    }

    pub async fn next_song(&mut self) -> Option<FollowUp> {
        let device = self.state.as_ref()?.device_id.clone();
        if let Err(e) = self.api.skip_next(device.as_deref()).await {
            slog::warn!(LOG, "skip to next failed {}", e);
        }
        Some(FollowUp::Resync(self.resync_delay))
    }

    pub async fn prev_song(&mut self) -> Option<FollowUp> {
        let device = self.state.as_ref()?.device_id.clone();
        if let Err(e) = self.api.skip_previous(device.as_deref()).await {
            slog::warn!(LOG, "skip to previous failed {}", e);
        }
        Some(FollowUp::Resync(self.resync_delay))
    }

    /// Pause or resume based on what spotify last confirmed
    pub async fn toggle(&mut self) -> Option<FollowUp> {
        let current = self.state.as_ref()?;
        let device = current.device_id.clone();
        let (was_playing, progress_ms) = (current.is_playing, current.progress_ms);
        let res = if was_playing {
            self.update_optimistic(now_millis(), |s| s.is_playing = false);
            self.api.pause(device.as_deref()).await
        } else {
            self.update_optimistic(now_millis(), |s| s.is_playing = true);
            self.api.start(device.as_deref(), progress_ms).await
        };
        if let Err(e) = res {
            slog::warn!(LOG, "toggle playback failed {}", e);
        }
        Some(FollowUp::Resync(self.resync_delay))
    }

    /// Jump to `position_ms`. Polling stops until spotify has had time
    /// to move, otherwise a stale poll would snap the position back.
    pub async fn seek(&mut self, position_ms: i64) -> Option<FollowUp> {
        let device = self.optimistic.as_ref()?.device_id.clone();
        self.update_optimistic(now_millis(), |s| s.progress_ms = position_ms);
        self.poll_paused = true;
        if let Err(e) = self.api.seek(device.as_deref(), position_ms).await {
            slog::warn!(LOG, "seek failed {}", e);
        }
        Some(FollowUp::ResumePolling(self.seek_settle_delay))
    }

    pub async fn shuffle(&mut self, shuffle: bool) -> Option<FollowUp> {
        let device = self.state.as_ref()?.device_id.clone();
        if let Err(e) = self.api.shuffle(device.as_deref(), shuffle).await {
            slog::warn!(LOG, "shuffle failed {}", e);
        }
        Some(FollowUp::Resync(self.resync_delay))
    }

    pub async fn follow_up(&mut self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Resync(_) => self.update_status().await,
            FollowUp::ResumePolling(_) => self.poll_paused = false,
        }
    }

    /// Wait out a follow up and apply it
    pub async fn settle(&mut self, follow_up: Option<FollowUp>) {
        if let Some(f) = follow_up {
            async_std::task::sleep(f.delay()).await;
            self.follow_up(f).await;
        }
    }

    pub async fn run_command(&mut self, command: Command) -> Option<FollowUp> {
        match command {
            Command::Toggle => self.toggle().await,
            Command::Next => self.next_song().await,
            Command::Previous => self.prev_song().await,
            Command::Seek(ms) => self.seek(ms).await,
            Command::Shuffle(on) => self.shuffle(on).await,
            Command::Quit => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Toggle,
    Next,
    Previous,
    Seek(i64),
    Shuffle(bool),
    Quit,
}

impl Command {
    /// `p` toggle, `n` next, `b` back, `s <seconds>` seek,
    /// `r`/`R` shuffle on/off, `q` quit
    pub fn parse(line: &str) -> Option<Command> {
        let mut parts = line.split_whitespace();
        let cmd = match parts.next()? {
            "p" => Command::Toggle,
            "n" => Command::Next,
            "b" => Command::Previous,
            "r" => Command::Shuffle(true),
            "R" => Command::Shuffle(false),
            "q" => Command::Quit,
            "s" => {
                let secs: f64 = parts.next()?.parse().ok()?;
                if !secs.is_finite() || secs < 0.0 {
                    return None;
                }
                Command::Seek((secs * 1000.0) as i64)
            }
            _ => return None,
        };
        Some(cmd)
    }
}
