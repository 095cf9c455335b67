//! Topicbus - topic-exchange publish/subscribe over AMQP
//!
//! A publisher emits numbered, timestamped messages to a topic exchange
//! under a fixed routing key; a subscriber binds an anonymous queue under
//! one or more patterns and logs what arrives.

pub mod bus;
pub mod cli;
pub mod config;
pub mod message;
pub mod publisher;
pub mod routing;
pub mod shutdown;
pub mod subscriber;
pub mod topology;
pub mod utils;
