//! External service clients

pub mod discovery;
pub mod proxy;
pub mod token_exchange;

pub use proxy::ProxyCore;
pub use token_exchange::TokenExchangeClient;
