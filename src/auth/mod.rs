mod credentials;

pub use credentials::*;
