//! Typed object model for the RedDot / OpenText Management Server.
//!
//! Server objects are represented by lazily loaded wrappers: an object seen
//! in a list reply starts out with the few attributes the list carried and
//! fetches its full record the first time an unknown attribute is read.
//! Collections (pages of a project, categories, keywords, ...) are fetched on
//! first access and cached until invalidated. Mutations keep the cache
//! honest: on success they either record the new values or drop what they
//! may have changed, on failure they leave it untouched.
//!
//! # Architecture
//!
//! - **Lazy state** (`lazy.rs`): `Partial<F>` field sets and `LazyLoad<T>`
//! - **Collections** (`collection.rs`): `CachedList`, `IndexedList`, `NameIndexedList`
//! - **Session** (`session.rs`): login, project selection, shared credentials
//! - **Entities**: `Project`, `Page`, `ContentClass`, `Workflow`, `Category`,
//!   `Keyword` and `User`
//!
//! The RQL protocol itself lives in the [`reddot_rql`] crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use reddot_cms::{Session, SessionConfig};
//!
//! # async fn example() -> reddot_cms::Result<()> {
//! let config = SessionConfig::from_env()?;
//! let mut session = Session::login(&config).await?;
//!
//! for project in session.projects().items_mut().await? {
//!     println!("{} {}", project.guid(), project.name().await?);
//! }
//!
//! session.logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod category;
pub mod collection;
pub mod config;
pub mod content_class;
pub mod error;
pub mod lazy;
pub mod page;
pub mod project;
pub mod session;
pub mod user;
pub mod workflow;

// Re-export key types
pub use category::{Category, Keyword};
pub use collection::{CacheEpoch, CachedList, IndexedList, NameIndexedList, Named};
pub use config::SessionConfig;
pub use content_class::ContentClass;
pub use error::{CmsError, Result};
pub use lazy::{LazyLoad, Partial};
pub use page::Page;
pub use project::Project;
pub use session::{Session, SessionHandle};
pub use user::User;
pub use workflow::Workflow;

pub use reddot_rql::{Guid, MockTransport, RqlError};
