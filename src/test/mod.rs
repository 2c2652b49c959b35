mod config;
mod distributed;
mod engine;
mod invoke;
mod link;
mod registry;
mod routing_table;
mod timeline;
