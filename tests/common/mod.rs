#![allow(dead_code)]

use std::time::Duration;

use connect_four_server::prelude::*;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

pub const WAIT: Duration = Duration::from_secs(10);

struct CrateFilter;
impl<S> Filter<S> for CrateFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.target().starts_with("connect_four_server") && meta.level() <= &Level::DEBUG
    }
}

/// Debug output of the server, shown by `cargo test -- --nocapture`.
pub fn init_test_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .event_format(format)
            .with_test_writer()
            .with_filter(CrateFilter),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

pub fn start_server() -> RunningServer {
    init_test_logger();
    let config = Configuration::new()
        .with_bind_addr("127.0.0.1:0".parse().unwrap())
        .with_control_workers(2)
        .with_minimax_depth(2)
        .with_alpha_beta_depth(3)
        .with_rematch_timeout(WAIT)
        .with_write_timeout(Duration::from_millis(500))
        .with_chat_queue_len(16);
    Server::bind(config).unwrap().spawn().unwrap()
}

pub fn connect(server: &RunningServer) -> Client {
    Client::connect(server.local_addr()).unwrap()
}

pub fn next(client: &mut Client) -> ServerMessage {
    client
        .recv_timeout(WAIT)
        .unwrap()
        .expect("server closed the connection")
}

/// Skip ahead to `wanted`.
pub fn expect(client: &mut Client, wanted: ServerMessage) {
    client.wait_for(|msg| *msg == wanted, WAIT).unwrap();
}

/// Two clients seated in a fresh multiplayer session, returned as (red, yellow).
pub fn pair(server: &RunningServer) -> (Client, Client) {
    let mut red = connect(server);
    red.send(&ClientMessage::MultiplayerRequest).unwrap();
    assert_eq!(next(&mut red), ServerMessage::Waiting);

    let mut yellow = connect(server);
    yellow.send(&ClientMessage::MultiplayerRequest).unwrap();
    assert_eq!(next(&mut yellow), ServerMessage::Waiting);

    for (client, color) in [(&mut red, Color::Red), (&mut yellow, Color::Yellow)] {
        assert_eq!(next(client), ServerMessage::GameStarted);
        assert_eq!(next(client), ServerMessage::Color { color });
        assert_eq!(next(client), ServerMessage::Scores { red: 0, yellow: 0 });
    }
    (red, yellow)
}
