//! Testing helpers for end-to-end reads.
//!
//! [`LocalObjectServer`] is a small in-memory HTTP server that serves
//! objects with `HEAD` and ranged `GET`, and can stand in for a Swift v1 or
//! v2 identity service. It runs on its own thread with a private runtime so
//! that the blocking client under test never shares a runtime with it.
//!
//! ```rs
//! use nimbus_file::helpers::LocalObjectServer;
//! use nimbus_file::{Config, RemoteFile};
//!
//! let server = LocalObjectServer::start()?;
//! server.put_object("/data/file.bin", vec![7; 1000]);
//!
//! let mut file = RemoteFile::open(&server.url("/data/file.bin"), "", &Config::default())?;
//! let mut buffer = [0; 10];
//! file.read_at(100, &mut buffer)?;
//! ```

mod server;
pub use server::*;
