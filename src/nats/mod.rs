pub mod client;
pub mod delivery;
pub mod messages;

pub use client::{NatsTransport, SessionSubjects};
pub use delivery::NatsDelivery;
pub use messages::{AudioFrameMessage, ClientMessage, ServerMessage, SetupMessage};
