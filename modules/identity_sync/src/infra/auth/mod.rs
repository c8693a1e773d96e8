pub mod channel;

pub use channel::ChannelAuthSource;
