// World socket: event broker, metrics and the WebSocket bridge

mod hub;
pub mod metrics;
mod protocol;
mod server;

pub use hub::{EventBroker, EventReceiver, EventSender, PublishReport};
pub use metrics::{run_metrics_reporter, MetricsSnapshot};
pub use protocol::{ErrorMessage, SocketQuery};
pub use server::{create_world_socket_router, WorldSocketState};
