//! # Expire Map
//!
//! A concurrent in-memory key/value store whose entries expire after a
//! per-entry TTL (time-to-live).
//!
//! ## Features
//!
//! - Thread-safe storage using `DashMap` (lock-free concurrent access)
//! - Entries become unreachable the moment their TTL elapses, with or
//!   without anyone removing them
//! - Lazy reclamation: an expiry-ordered index lets due entries be purged
//!   inside the callers' own operations, without scanning the whole map
//! - Optional periodic sweep task for bounded memory under zero traffic
//!
//! ## Example
//!
//! ```rust
//! use expire_map::ExpireMap;
//!
//! let map: ExpireMap<String, String> = ExpireMap::new();
//!
//! // Store a value with a 60 second TTL
//! map.put("user:123".to_string(), "John Doe".to_string(), 60_000);
//!
//! if let Some(value) = map.get(&"user:123".to_string()) {
//!     println!("User: {}", value);
//! }
//!
//! map.remove(&"user:123".to_string());
//! assert_eq!(map.size(), 0);
//! ```

mod config;
mod index;
mod map;
mod token;

pub use config::MapConfig;
pub use index::ExpiryIndex;
pub use map::ExpireMap;
pub use token::ExpiryToken;
