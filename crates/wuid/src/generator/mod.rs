mod packed;
mod renew;

pub use packed::*;
