//! Interactive chat session over WebSocket.
//!
//! Connects to the hub, joins under the given name, then shuttles stdin
//! lines up and rendered events down until `/quit`, EOF, or the hub closes.

use anyhow::{Context, Result};
use chat_core::codec::{decode_server, encode_client};
use chat_core::{ClientEvent, WireFormat};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::render::Renderer;

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    Typing(bool),
    Quit,
    Nothing,
}

/// Interpret one stdin line. `typing` is the current typing state, which
/// `/typing` flips.
pub fn parse_input(line: &str, typing: bool) -> Input {
    let line = line.trim();
    match line {
        "" => Input::Nothing,
        "/quit" | "/exit" => Input::Quit,
        "/typing" => Input::Typing(!typing),
        _ => Input::Chat(line.to_string()),
    }
}

/// Events to send for one input, updating the local typing flag.
///
/// A chat line ends any typing indicator first, so other participants stop
/// seeing "is typing" once the message lands.
pub fn outgoing(input: Input, typing: &mut bool) -> Vec<ClientEvent> {
    match input {
        Input::Nothing | Input::Quit => Vec::new(),
        Input::Typing(state) => {
            *typing = state;
            vec![ClientEvent::Typing { is_typing: state }]
        }
        Input::Chat(text) => {
            let mut events = Vec::with_capacity(2);
            if std::mem::take(typing) {
                events.push(ClientEvent::Typing { is_typing: false });
            }
            events.push(ClientEvent::ChatMessage { text });
            events
        }
    }
}

/// `ws://host:port/<path>` for the given framing.
pub fn hub_url(host: &str, port: u16, format: WireFormat) -> String {
    format!("ws://{host}:{port}{}", format.path())
}

/// Run an interactive session until the user quits or the hub goes away.
pub async fn run(host: &str, port: u16, name: &str, format: WireFormat) -> Result<()> {
    let url = hub_url(host, port, format);
    info!(url = %url, ?format, "connecting");

    let (mut ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to {url}"))?;

    let join = ClientEvent::Join {
        name: name.to_string(),
    };
    ws.send(Message::Text(encode_client(format, &join)?))
        .await
        .context("failed to send join")?;

    let mut renderer = Renderer::new();
    let mut typing = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                let input = parse_input(&line, typing);
                if input == Input::Quit {
                    break;
                }
                for event in outgoing(input, &mut typing) {
                    ws.send(Message::Text(encode_client(format, &event)?))
                        .await
                        .context("failed to send to hub")?;
                }
            }

            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match decode_server(format, &text) {
                        Ok(event) => {
                            if let Some(line) = renderer.render(&event) {
                                println!("{line}");
                            }
                        }
                        Err(e) => warn!(error = %e, "unreadable event from hub"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        println!("* disconnected");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("connection to hub failed"),
                }
            }
        }
    }

    let _ = ws.close(None).await;
    info!(name = renderer.own_name().unwrap_or(name), "left the chat");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_chat() {
        assert_eq!(
            parse_input("  hello there \n", false),
            Input::Chat("hello there".into())
        );
    }

    #[test]
    fn blank_lines_do_nothing() {
        assert_eq!(parse_input("   ", false), Input::Nothing);
    }

    #[test]
    fn typing_toggles() {
        assert_eq!(parse_input("/typing", false), Input::Typing(true));
        assert_eq!(parse_input("/typing", true), Input::Typing(false));
    }

    #[test]
    fn quit_commands() {
        assert_eq!(parse_input("/quit", false), Input::Quit);
        assert_eq!(parse_input("/exit", true), Input::Quit);
    }

    #[test]
    fn chat_while_typing_clears_typing_first() {
        let mut typing = false;
        assert_eq!(
            outgoing(Input::Typing(true), &mut typing),
            vec![ClientEvent::Typing { is_typing: true }]
        );
        assert!(typing);

        assert_eq!(
            outgoing(Input::Chat("done".into()), &mut typing),
            vec![
                ClientEvent::Typing { is_typing: false },
                ClientEvent::ChatMessage {
                    text: "done".into()
                },
            ]
        );
        assert!(!typing);
    }

    #[test]
    fn chat_without_typing_sends_only_the_message() {
        let mut typing = false;
        assert_eq!(
            outgoing(Input::Chat("hi".into()), &mut typing),
            vec![ClientEvent::ChatMessage { text: "hi".into() }]
        );
        assert!(outgoing(Input::Nothing, &mut typing).is_empty());
    }

    #[test]
    fn url_follows_format() {
        assert_eq!(
            hub_url("localhost", 3001, WireFormat::Events),
            "ws://localhost:3001/socket"
        );
        assert_eq!(
            hub_url("10.0.0.2", 4001, WireFormat::Frames),
            "ws://10.0.0.2:4001/ws"
        );
    }
}
