pub mod clock;
pub mod frame;
pub mod sign;

pub use clock::SessionClock;
pub use frame::Frame;
pub use sign::SignToken;
