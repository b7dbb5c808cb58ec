//! The bounded LRU cache of live backends (the "active set").
//!
//! Owns admission, eviction, and persistence of the set of backends that are
//! currently materialized (process running / socket open). Catalog
//! resolution — turning a server name into a launch spec, and checking
//! argument/auth requirements — happens one layer up, in the Adder and
//! Dispatcher; this crate only knows how to bring up, tear down, and persist
//! already-resolved [`TransportSpec`]s.

mod manager;
mod notify;

pub use manager::{ActiveEntry, ActiveSetError, ActiveSetManager, ClientState, TouchOutcome};
pub use notify::{ChangeNotifier, NoopNotifier, SharedNotifier};
