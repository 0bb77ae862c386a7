use axum::{extract::State, response::Html};

use crate::server::AppState;

/// `{client_id}` is filled in per request
const CHAT_PAGE: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <title>Chat</title>
    </head>
    <body>
        <h1>WebSocket Chat</h1>
        <h2>Your ID: <span id="ws-id">{client_id}</span></h2>
        <form id="chat-form">
            <input type="text" id="messageText" autocomplete="off"/>
            <button>Send</button>
        </form>
        <ul id="messages">
        </ul>
        <script>
            const clientId = {client_id};
            const scheme = location.protocol === "https:" ? "wss" : "ws";
            const ws = new WebSocket(`${scheme}://${location.host}/ws?client_id=${clientId}`);
            ws.onmessage = function(event) {
                const item = document.createElement("li");
                item.appendChild(document.createTextNode(event.data));
                document.getElementById("messages").appendChild(item);
            };
            document.getElementById("chat-form").onsubmit = function(event) {
                const input = document.getElementById("messageText");
                ws.send(input.value);
                input.value = "";
                event.preventDefault();
            };
        </script>
    </body>
</html>
"#;

/// Minimal browser client for the hub.
///
/// Each page load reserves the id the page then connects with, so the page
/// can show it.
pub async fn chat_page(State(state): State<AppState>) -> Html<String> {
    let client_id = state.hub.reserve_client_id();
    Html(CHAT_PAGE.replace("{client_id}", &client_id.to_string()))
}
