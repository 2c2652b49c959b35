pub mod config;
pub mod dist;
pub mod link;
pub mod net;
pub mod proto;
pub mod proxy;
pub mod sim;

#[cfg(test)]
mod test;
