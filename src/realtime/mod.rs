pub mod fanout;
pub mod ws;

pub use fanout::{ChannelAuth, ClientAction, ClientFrame, Fanout, LimitError, ServerFrame};
pub use ws::ws_handler;
