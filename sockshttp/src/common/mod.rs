pub mod addresses;
pub mod constants;
pub mod credentials;
pub mod interface;
pub mod util;
