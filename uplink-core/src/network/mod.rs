mod transport;

pub use transport::{CLOSE_TIMEOUT, CONNECT_TIMEOUT, Connector, Transport, WsConnector, WsTransport};
