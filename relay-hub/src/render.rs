//! HTML rendering for broadcast frames and the index page.
//!
//! Templates are compiled into the binary by `maud`, so there is no
//! per-message template parse and no runtime render failure.
//! Message text is HTML-escaped.

use maud::{html, Markup, DOCTYPE};

use crate::message::{Frame, Message};

/// Element id of the message list on the index page.
pub const MESSAGES_ID: &str = "messages";

/// Render one message as an htmx out-of-band fragment that appends to the
/// message list.
pub fn render_message(message: &Message) -> Frame {
    let markup = html! {
        div id=(MESSAGES_ID) hx-swap-oob="beforeend" {
            div class="message" { (message.text()) }
        }
    };
    Frame::from(markup.into_string())
}

/// Render the chat page served at `/`.
pub fn render_index() -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Relay" }
                link rel="stylesheet" href="/static/style.css";
                script src="https://unpkg.com/htmx.org@2.0.4" {}
                script src="https://unpkg.com/htmx-ext-ws@2.0.2/ws.js" {}
            }
            body {
                main hx-ext="ws" ws-connect="/ws" {
                    h1 { "Relay" }
                    div id=(MESSAGES_ID) {}
                    form id="chat-form" ws-send {
                        input name="text" type="text" autocomplete="off" placeholder="Say something" required;
                        button type="submit" { "Send" }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_message_fragment() {
        let frame = render_message(&Message::new("hi"));
        assert_eq!(
            frame.as_str(),
            r#"<div id="messages" hx-swap-oob="beforeend"><div class="message">hi</div></div>"#
        );
    }

    #[test]
    fn test_render_escapes_html() {
        let frame = render_message(&Message::new("<script>alert(1)</script> & co"));
        assert!(frame.as_str().contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; co"));
        assert!(!frame.as_str().contains("<script>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let msg = Message::new("same");
        assert_eq!(render_message(&msg), render_message(&msg));
    }

    #[test]
    fn test_render_index_wires_websocket_form() {
        let page = render_index().into_string();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"ws-connect="/ws""#));
        assert!(page.contains(r#"name="text""#));
        assert!(page.contains(r#"id="messages""#));
        assert!(page.contains("/static/style.css"));
    }
}
