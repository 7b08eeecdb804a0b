use std::io::Write;
use std::time::Duration;

use async_std::channel::{self, Receiver, Sender};
use async_std::task;

use spot_remote::client::auth::{self, BackendClient};
use spot_remote::client::lyrics::LyricsApi;
use spot_remote::client::spotify::WebApi;
use spot_remote::client::store::LocalStore;
use spot_remote::player::{Command, FollowUp, Player, INTERPOLATE_INTERVAL, POLL_INTERVAL};
use spot_remote::{now_millis, render, Result, CONFIG, LOG};

const AUTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

const HELP: &str = "p: play/pause  n: next  b: back  s <secs>: seek  r/R: shuffle on/off  q: quit";

#[derive(Debug, Clone, Copy)]
enum Event {
    Poll,
    Interpolate,
    AuthCheck,
    Command(Command),
    FollowUp(FollowUp),
    Eof,
}

enum Exit {
    Quit,
    LoggedOut,
}

fn ticker(tx: Sender<Event>, every: Duration, event: Event) {
    task::spawn(async move {
        loop {
            task::sleep(every).await;
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });
}

fn read_commands(tx: Sender<Event>) {
    task::spawn(async move {
        let stdin = async_std::io::stdin();
        loop {
            let mut line = String::new();
            let event = match stdin.read_line(&mut line).await {
                Ok(0) | Err(_) => Event::Eof,
                Ok(_) => match Command::parse(&line) {
                    Some(c) => Event::Command(c),
                    None => {
                        println!("\n{}", HELP);
                        continue;
                    }
                },
            };
            let eof = matches!(event, Event::Eof);
            if tx.send(event).await.is_err() || eof {
                break;
            }
        }
    });
}

fn schedule(tx: Sender<Event>, follow_up: FollowUp) {
    task::spawn(async move {
        task::sleep(follow_up.delay()).await;
        tx.send(Event::FollowUp(follow_up)).await.ok();
    });
}

fn draw(line: &str) {
    let mut out = std::io::stdout();
    write!(out, "\r\x1b[2K{}", line).ok();
    out.flush().ok();
}

/// Show the login url until the backend reports the session as logged in.
/// Returns false when the user quits first.
async fn login(backend: &BackendClient, store: &LocalStore, rx: &Receiver<Event>) -> Result<bool> {
    if auth::is_logged_in(backend, store).await {
        return Ok(true);
    }
    let url = auth::login_url(
        backend,
        store,
        &CONFIG.spotify_client_id,
        &CONFIG.spotify_redirect_uri,
    )
    .await?;
    println!("{}", auth::qr_code(&url)?);
    println!("scan the code or open this url to log in:\n{}\n", url);
    slog::info!(LOG, "waiting for login");

    while let Ok(event) = rx.recv().await {
        match event {
            Event::Poll => {
                if auth::is_logged_in(backend, store).await {
                    println!("logged in\n{}", HELP);
                    return Ok(true);
                }
            }
            Event::Command(Command::Quit) | Event::Eof => return Ok(false),
            _ => (),
        }
    }
    Ok(false)
}

async fn play(
    backend: &BackendClient,
    store: &LocalStore,
    tx: &Sender<Event>,
    rx: &Receiver<Event>,
) -> Exit {
    let mut player = Player::new(WebApi::new(store.clone()), LyricsApi::new(&CONFIG.lyrics_api_url));
    player.update_status().await;

    while let Ok(event) = rx.recv().await {
        match event {
            Event::Poll => player.poll_tick().await,
            Event::Interpolate => {
                player.interpolate(now_millis());
                match player.optimistic_state() {
                    Some(state) => draw(&render::status_line(state)),
                    None => draw("nothing playing"),
                }
            }
            Event::AuthCheck => {
                if !auth::is_logged_in(backend, store).await {
                    println!("\nlogged out");
                    return Exit::LoggedOut;
                }
            }
            Event::Command(Command::Quit) | Event::Eof => return Exit::Quit,
            Event::Command(command) => {
                if let Some(follow_up) = player.run_command(command).await {
                    schedule(tx.clone(), follow_up);
                }
            }
            Event::FollowUp(follow_up) => player.follow_up(follow_up).await,
        }
    }
    Exit::Quit
}

#[async_std::main]
async fn main() -> Result<()> {
    spot_remote::load_dotenv();
    let store = LocalStore::from_config();
    let backend = BackendClient::new(&CONFIG.backend_url);

    let (tx, rx) = channel::unbounded();
    ticker(tx.clone(), POLL_INTERVAL, Event::Poll);
    ticker(tx.clone(), INTERPOLATE_INTERVAL, Event::Interpolate);
    ticker(tx.clone(), AUTH_CHECK_INTERVAL, Event::AuthCheck);
    read_commands(tx.clone());

    loop {
        if !login(&backend, &store, &rx).await? {
            break;
        }
        match play(&backend, &store, &tx, &rx).await {
            Exit::Quit => break,
            Exit::LoggedOut => continue,
        }
    }
    println!();
    Ok(())
}
