/*!
Spotify Web API calls made by the player, using the access
token the backend handed out.
*/
use async_trait::async_trait;
use surf::http::Method;
use surf::StatusCode;

use super::store::LocalStore;

pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    NoAccessToken,
    Status { status: u16, message: String },
    Transport(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NoAccessToken => write!(f, "no-access-token"),
            ApiError::Status { status, message } => write!(f, "spotify error {}: {}", status, message),
            ApiError::Transport(e) => write!(f, "spotify request error {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    // restricted devices report a null id
    pub id: Option<String>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Artist {
    pub name: String,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Album {
    // null for local files
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct TrackItem {
    pub id: Option<String>,
    pub name: String,
    pub preview_url: Option<String>,
    pub duration_ms: i64,
    pub album: Album,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Show {
    pub id: String,
    pub name: String,
    pub publisher: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct EpisodeItem {
    pub id: String,
    pub name: String,
    pub preview_url: Option<String>,
    pub duration_ms: i64,
    pub show: Show,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayingItem {
    Track(TrackItem),
    Episode(EpisodeItem),
}

impl PlayingItem {
    pub fn id(&self) -> &str {
        match self {
            PlayingItem::Track(t) => t.id.as_deref().unwrap_or(""),
            PlayingItem::Episode(e) => &e.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentlyPlaying {
    pub device: Device,
    pub timestamp: i64,
    pub progress_ms: i64,
    pub is_playing: bool,
    pub item: PlayingItem,
}

// `item` is shaped by `currently_playing_type`, which lives next to it
#[derive(serde::Deserialize)]
struct RawPlayback {
    device: Device,
    #[serde(default)]
    timestamp: i64,
    progress_ms: Option<i64>,
    is_playing: bool,
    currently_playing_type: String,
    item: Option<serde_json::Value>,
}

/// Parse the `me/player` body. `Ok(None)` when nothing we can show is
/// playing, like ads or an empty item.
pub fn parse_playback(body: &str) -> ApiResult<Option<CurrentlyPlaying>> {
    let invalid = |e: serde_json::Error| ApiError::Transport(format!("invalid playback json {}", e));
    let raw: RawPlayback = serde_json::from_str(body).map_err(invalid)?;
    let item = match raw.item {
        None => return Ok(None),
        Some(serde_json::Value::Null) => return Ok(None),
        Some(item) => item,
    };
    let item = match raw.currently_playing_type.as_str() {
        "track" => PlayingItem::Track(serde_json::from_value(item).map_err(invalid)?),
        "episode" => PlayingItem::Episode(serde_json::from_value(item).map_err(invalid)?),
        _ => return Ok(None),
    };
    Ok(Some(CurrentlyPlaying {
        device: raw.device,
        timestamp: raw.timestamp,
        progress_ms: raw.progress_ms.unwrap_or(0),
        is_playing: raw.is_playing,
        item,
    }))
}

/// Pull the message out of a spotify `{"error": {"status", "message"}}` body
pub fn parse_error(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());
    ApiError::Status { status, message }
}

/// Playback state and transport controls
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn currently_playing(&self) -> ApiResult<Option<CurrentlyPlaying>>;
    async fn start(&self, device_id: Option<&str>, position_ms: i64) -> ApiResult<()>;
    async fn pause(&self, device_id: Option<&str>) -> ApiResult<()>;
    async fn skip_next(&self, device_id: Option<&str>) -> ApiResult<()>;
    async fn skip_previous(&self, device_id: Option<&str>) -> ApiResult<()>;
    async fn seek(&self, device_id: Option<&str>, position_ms: i64) -> ApiResult<()>;
    async fn shuffle(&self, device_id: Option<&str>, shuffle: bool) -> ApiResult<()>;
}

pub struct WebApi {
    client: surf::Client,
    base_url: String,
    store: LocalStore,
}

fn device_param(device_id: Option<&str>) -> Vec<(&'static str, String)> {
    device_id
        .map(|d| vec![("device_id", d.to_string())])
        .unwrap_or_default()
}

impl WebApi {
    pub fn new(store: LocalStore) -> Self {
        Self::with_base_url(store, SPOTIFY_API_URL)
    }

    pub fn with_base_url(store: LocalStore, base_url: &str) -> Self {
        Self {
            client: surf::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    /// Send a request, returning the body unless spotify answered 204.
    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> ApiResult<Option<String>> {
        let access_token = self
            .store
            .access_token()
            .await
            .ok_or(ApiError::NoAccessToken)?;
        let mut url = surf::Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| ApiError::Transport(format!("invalid url {}", e)))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        let mut req = surf::RequestBuilder::new(method, url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", access_token));
        if let Some(body) = body {
            req = req.body(surf::Body::from_json(&body).map_err(|e| ApiError::Transport(e.to_string()))?);
        }
        let mut resp = self
            .client
            .send(req)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NoContent {
            return Ok(None);
        }
        let text = resp
            .body_string()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(parse_error(status as u16, &text));
        }
        Ok(Some(text))
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> ApiResult<()> {
        self.send(method, path, params, body).await.map(|_| ())
    }
}

#[async_trait]
impl SpotifyApi for WebApi {
    async fn currently_playing(&self) -> ApiResult<Option<CurrentlyPlaying>> {
        let params = [("additional_types", "episode".to_string())];
        match self.send(Method::Get, "me/player", &params, None).await? {
            None => Ok(None),
            Some(body) if body.trim().is_empty() => Ok(None),
            Some(body) => parse_playback(&body),
        }
    }

    async fn start(&self, device_id: Option<&str>, position_ms: i64) -> ApiResult<()> {
        let body = serde_json::json!({ "position_ms": position_ms });
        self.command(Method::Put, "me/player/play", &device_param(device_id), Some(body))
            .await
    }

    async fn pause(&self, device_id: Option<&str>) -> ApiResult<()> {
        self.command(Method::Put, "me/player/pause", &device_param(device_id), None)
            .await
    }

    async fn skip_next(&self, device_id: Option<&str>) -> ApiResult<()> {
        let body = serde_json::json!({});
        self.command(Method::Post, "me/player/next", &device_param(device_id), Some(body))
            .await
    }

    async fn skip_previous(&self, device_id: Option<&str>) -> ApiResult<()> {
        let body = serde_json::json!({});
        self.command(Method::Post, "me/player/previous", &device_param(device_id), Some(body))
            .await
    }

    async fn seek(&self, device_id: Option<&str>, position_ms: i64) -> ApiResult<()> {
        let mut params = device_param(device_id);
        params.push(("position_ms", position_ms.to_string()));
        self.command(Method::Put, "me/player/seek", &params, Some(serde_json::json!({})))
            .await
    }

    async fn shuffle(&self, device_id: Option<&str>, shuffle: bool) -> ApiResult<()> {
        let mut params = device_param(device_id);
        params.push(("shuffle", shuffle.to_string()));
        self.command(Method::Put, "me/player/shuffle", &params, Some(serde_json::json!({})))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn parses_track_playback() {
        let body = serde_json::json!({
            "device": { "id": "dev1", "name": "Kitchen" },
            "timestamp": 1700000000000i64,
            "progress_ms": 42000,
            "is_playing": true,
            "currently_playing_type": "track",
            "item": {
                "id": "t1",
                "name": "Song",
                "preview_url": null,
                "duration_ms": 180000,
                "album": {
                    "id": "al1",
                    "name": "Album",
                    "images": [{ "url": "http://img/1", "height": 640, "width": 640 }]
                },
                "artists": [{ "name": "A" }, { "name": "B" }]
            }
        })
        .to_string();
        let playing = parse_playback(&body).unwrap().unwrap();
        assert_eq!(playing.device.id.as_deref(), Some("dev1"));
        assert_eq!(playing.progress_ms, 42000);
        assert!(playing.is_playing);
        match playing.item {
            PlayingItem::Track(t) => {
                assert_eq!(t.id.as_deref(), Some("t1"));
                assert_eq!(t.artists.len(), 2);
                assert_eq!(t.album.images[0].url, "http://img/1");
            }
            other => panic!("expected track, got {:?}", other),
        }
    }

    #[test]
    fn parses_episode_playback() {
        let body = serde_json::json!({
            "device": { "id": null },
            "progress_ms": 10,
            "is_playing": false,
            "currently_playing_type": "episode",
            "item": {
                "id": "e1",
                "name": "Episode",
                "preview_url": "http://preview",
                "duration_ms": 3600000,
                "show": { "id": "s1", "name": "Show", "publisher": "Pub", "images": [] }
            }
        })
        .to_string();
        let playing = parse_playback(&body).unwrap().unwrap();
        assert!(playing.device.id.is_none());
        assert_eq!(playing.item.id(), "e1");
        assert!(matches!(playing.item, PlayingItem::Episode(ref e) if e.show.publisher == "Pub"));
    }

    #[test]
    fn local_files_parse_without_ids() {
        let body = serde_json::json!({
            "device": { "id": "dev1" },
            "progress_ms": 500,
            "is_playing": true,
            "currently_playing_type": "track",
            "item": {
                "id": null,
                "is_local": true,
                "name": "home recording",
                "preview_url": null,
                "duration_ms": 90000,
                "album": { "id": null, "name": "", "images": [] },
                "artists": [{ "name": "me" }]
            }
        })
        .to_string();
        let playing = parse_playback(&body).unwrap().unwrap();
        assert_eq!(playing.item.id(), "");
        match playing.item {
            PlayingItem::Track(t) => {
                assert!(t.id.is_none());
                assert!(t.album.id.is_none());
                assert_eq!(t.name, "home recording");
            }
            other => panic!("expected track, got {:?}", other),
        }
    }

    #[test]
    fn ads_and_empty_items_are_nothing_playing() {
        let body = r#"{"device":{"id":"d"},"progress_ms":0,"is_playing":true,
            "currently_playing_type":"ad","item":{"id":"x"}}"#;
        assert_eq!(parse_playback(body).unwrap(), None);
        let body = r#"{"device":{"id":"d"},"progress_ms":0,"is_playing":true,
            "currently_playing_type":"track","item":null}"#;
        assert_eq!(parse_playback(body).unwrap(), None);
    }

    #[test]
    fn error_message_is_extracted() {
        let err = parse_error(401, r#"{"error":{"status":401,"message":"The access token expired"}}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 401,
                message: "The access token expired".to_string()
            }
        );
        assert_eq!(
            parse_error(502, "Bad gateway"),
            ApiError::Status {
                status: 502,
                message: "Bad gateway".to_string()
            }
        );
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        method: String,
        path: String,
        query: Vec<(String, String)>,
        body: Option<serde_json::Value>,
        authorization: Option<String>,
    }

    #[derive(Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Seen>>>,
        // body for `GET me/player`, 204 when unset
        playback: Option<String>,
    }

    async fn record(mut req: tide::Request<Recorder>) -> tide::Result {
        let text = req.body_string().await?;
        let seen = Seen {
            method: req.method().to_string(),
            path: req.url().path().to_string(),
            query: req.url().query_pairs().into_owned().collect(),
            body: serde_json::from_str(&text).ok(),
            authorization: req
                .header("authorization")
                .map(|v| v.last().as_str().to_string()),
        };
        let is_get = seen.method == "GET";
        req.state().seen.lock().unwrap().push(seen);
        match (&req.state().playback, is_get) {
            (Some(body), true) => Ok(tide::Response::builder(200)
                .body(body.as_str())
                .content_type(tide::http::mime::JSON)
                .build()),
            _ => Ok(tide::Response::new(204)),
        }
    }

    /// A local stand-in for the web api that records every request
    async fn recording_api(playback: Option<String>) -> (tempfile::TempDir, WebApi, Arc<Mutex<Vec<Seen>>>) {
        let recorder = Recorder {
            seen: Arc::new(Mutex::new(vec![])),
            playback,
        };
        let seen = recorder.seen.clone();
        let mut app = tide::with_state(recorder);
        app.at("/me/player").get(record);
        app.at("/me/player/play").put(record);
        app.at("/me/player/pause").put(record);
        app.at("/me/player/next").post(record);
        app.at("/me/player/previous").post(record);
        app.at("/me/player/seek").put(record);
        app.at("/me/player/shuffle").put(record);

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        async_std::task::spawn(async move { app.listen(listener).await });

        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("tokens.json"));
        store.set_access_token("acc3ss").await.unwrap();
        let api = WebApi::with_base_url(store, &format!("http://{}/", addr));
        (dir, api, seen)
    }

    fn seen(method: &str, path: &str, query: &[(&str, &str)], body: Option<serde_json::Value>) -> Seen {
        Seen {
            method: method.to_string(),
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
            authorization: Some("Bearer acc3ss".to_string()),
        }
    }

    #[async_std::test]
    async fn transport_calls_send_expected_requests() {
        let (_dir, api, recorded) = recording_api(None).await;
        api.start(Some("d1"), 1234).await.unwrap();
        api.pause(Some("d1")).await.unwrap();
        api.skip_next(Some("d1")).await.unwrap();
        api.skip_previous(None).await.unwrap();
        api.seek(Some("d1"), 60000).await.unwrap();
        api.shuffle(Some("d1"), true).await.unwrap();

        let recorded = recorded.lock().unwrap().clone();
        let empty = Some(serde_json::json!({}));
        assert_eq!(
            recorded,
            vec![
                seen(
                    "PUT",
                    "/me/player/play",
                    &[("device_id", "d1")],
                    Some(serde_json::json!({ "position_ms": 1234 }))
                ),
                seen("PUT", "/me/player/pause", &[("device_id", "d1")], None),
                seen("POST", "/me/player/next", &[("device_id", "d1")], empty.clone()),
                seen("POST", "/me/player/previous", &[], empty.clone()),
                seen(
                    "PUT",
                    "/me/player/seek",
                    &[("device_id", "d1"), ("position_ms", "60000")],
                    empty.clone()
                ),
                seen(
                    "PUT",
                    "/me/player/shuffle",
                    &[("device_id", "d1"), ("shuffle", "true")],
                    empty
                ),
            ]
        );
    }

    #[async_std::test]
    async fn no_content_is_nothing_playing() {
        let (_dir, api, recorded) = recording_api(None).await;
        assert_eq!(api.currently_playing().await, Ok(None));
        let recorded = recorded.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![seen("GET", "/me/player", &[("additional_types", "episode")], None)]
        );
    }

    #[async_std::test]
    async fn playback_body_is_parsed() {
        let body = r#"{"device":{"id":"d9"},"progress_ms":7,"is_playing":false,
            "currently_playing_type":"episode","item":{"id":"e1","name":"Ep",
            "preview_url":null,"duration_ms":100,
            "show":{"id":"s1","name":"Show","publisher":"Pub","images":[]}}}"#;
        let (_dir, api, _) = recording_api(Some(body.to_string())).await;
        let playing = api.currently_playing().await.unwrap().unwrap();
        assert_eq!(playing.device.id.as_deref(), Some("d9"));
        assert_eq!(playing.item.id(), "e1");
        assert_eq!(playing.progress_ms, 7);
    }

    #[async_std::test]
    async fn requests_without_access_token_fail_early() {
        let dir = tempfile::tempdir().unwrap();
        let api = WebApi::new(LocalStore::new(dir.path().join("tokens.json")));
        assert_eq!(api.currently_playing().await, Err(ApiError::NoAccessToken));
        assert_eq!(api.pause(Some("d")).await, Err(ApiError::NoAccessToken));
    }
}
