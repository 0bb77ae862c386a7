mod handler;
mod page;

pub use handler::{ws_handler, ConnectParams, WsSink, WsStream, WsUpgrade, CLIENT_ID_HEADER};
pub use page::chat_page;
