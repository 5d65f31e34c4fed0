
mod builder;
pub use self::builder::*;
mod chain;
pub use self::chain::*;
mod responder;
pub use self::responder::*;
mod store;
pub use self::store::*;
mod system;
pub use self::system::*;
mod watcher;
pub use self::watcher::*;
