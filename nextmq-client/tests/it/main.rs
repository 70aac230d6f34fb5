mod confirm;
mod connection;
mod consume;
mod exchange;
mod helper;
mod queue;
