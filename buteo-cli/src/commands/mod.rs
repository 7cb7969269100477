pub mod profiles;
pub mod status;
pub mod sync;
pub mod watch;
