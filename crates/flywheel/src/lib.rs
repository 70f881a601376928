//! # flywheel - nginx configuration from a key/value store
//!
//! ## Introduction for developers
//!
//! Read this to understand how `flywheel` works internally.
//!
//! ### Terms
//!
//! - a `directive` is a name followed by 0 or more `arguments`, terminated by `;`
//! - ...or followed by a `block`: a list of child directives enclosed in `{` and `}`
//! - a `#` starts a `comment` that runs to the end of the line
//!
//! ```nginx
//! # a comment
//! user www www;
//!
//! events {
//!     worker_connections 4096;
//! }
//! ```
//!
//! ### Loading files
//!
//! [nginx::parse] reads the root file and every file pulled in by `include` into a
//! [payload::Payload]: one [payload::ConfigFile] (path + directive tree) per source file.
//! The field names mirror the crossplane JSON format, so a payload can also be loaded from JSON
//! ([payload::Payload::load_json]).
//!
//! ### Overriding
//!
//! see [overrides::override_payload]
//!
//! Every non-comment directive is looked up in pre-order through an
//! [provider::OverrideProvider]. Backends derive a key from the file path and the directive name
//! ([provider::KeyRule]):
//!
//! | **file**                    | **strip prefix** | **directive** | **key**               |
//! |-----------------------------|------------------|---------------|-----------------------|
//! | `/etc/nginx/nginx.conf`     | `/etc`           | `listen`      | `/nginx/nginx/listen` |
//! | `/etc/nginx/conf.d/a.conf`  | `/etc/nginx`     | `root`        | `/conf.d/a/root`      |
//! | `/opt/nginx/nginx.conf`     | `/etc`           | `user`        | `/opt/nginx/nginx/user` |
//!
//! When the provider returns values they replace the arguments of the directive. When it returns
//! nothing the directive is left alone. A failed lookup aborts the run.
//!
//! ### Output
//!
//! [writer] renders the payload back to text ([nginx::build]) and either overwrites the files in
//! place or stages them in a scratch directory that is committed by renaming each file onto its
//! original path.
//!
pub mod cancel;
pub mod nginx;
pub mod overrides;
pub mod payload;
pub mod provider;
pub mod visit;
pub mod writer;
