mod bus;
mod listener;
mod publish;
mod subscribe;
pub(crate) mod types;

pub use bus::MessageBus;
pub use listener::Listener;
pub use publish::Publisher;
pub use subscribe::Subscriber;
