//! Client-side implementation of RQL, the XML query language spoken by the
//! RedDot / OpenText Management Server.
//!
//! RQL requests are small XML documents wrapped in an `<IODATA>` element. The
//! server authenticates them through two credentials that are placed either
//! on the wrapper or inside the request body:
//!
//! ```text
//! <IODATA loginguid="…" sessionkey="…">
//!   <PAGE action="load" guid="…"/>
//! </IODATA>
//! ```
//!
//! The reply is another XML document. Application errors come back either in
//! the SOAP error field or as `RDError<code>` text inside the reply.
//!
//! # Architecture
//!
//! - **XML** (`xml.rs`): reply tree, attribute encoding, request builder
//! - **Types** (`types.rs`): GUIDs, booleans and OLE dates as they cross the wire
//! - **Protocol** (`protocol.rs`): `<IODATA>` wrapping, credential placeholders,
//!   reply classification
//! - **Transport** (`transport.rs`): SOAP over HTTP, behind the `Transport` trait
//!
//! On top of these, `connection.rs` provides `RqlConnection`, which renders a
//! request with the current credentials, sends it and turns the answer into a
//! parsed `Reply` or one of the three error kinds in [`RqlError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use reddot_rql::{Credentials, HttpConfig, RqlConnection, RqlRequest};
//!
//! # async fn example() -> reddot_rql::Result<()> {
//! let conn = RqlConnection::http(&HttpConfig::default())?;
//! let login = RqlRequest::anonymous(
//!     r#"<ADMINISTRATION action="login" name="admin" password="secret"/>"#,
//! );
//! let reply = conn.execute(&login, &Credentials::default()).await?;
//! let guid = reply.require_guid(reply.require("LOGIN")?, "guid")?;
//! println!("logged in as {guid}");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod transport;
pub mod types;
pub mod xml;

// Re-export key types
pub use connection::RqlConnection;
pub use error::{Result, RqlError, TransportError};
pub use mock::MockTransport;
pub use protocol::{Credentials, Placeholder, Reply, RqlRequest, Scope};
pub use transport::{HttpConfig, HttpTransport, RawReply, Transport};
pub use types::Guid;
pub use xml::{ElementBuilder, XmlElement};
