//! Postgres Value Codec
//!
//! Convert between postgres wire format bytes and host values, for column
//! values in `DataRow` and for statement parameters in `Bind`.
//!
//! Values of unbounded size are decoded as bytes arrive, without buffering
//! the whole value, and a value that fails to decode fails alone, the stream
//! position always ends at the declared column length.
//!
//! # Examples
//!
//! Reading column value:
//!
//! ```no_run
//! use std::sync::Arc;
//! use pgvalue::{Session, TypeRegistry, buffer::SocketBuffer};
//!
//! # async fn app<S>(socket: S, row_description: bytes::Bytes) -> pgvalue::Result<()>
//! # where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin {
//! let registry = Arc::new(TypeRegistry::builtin());
//! let mut session = Session::new(SocketBuffer::new(socket), registry);
//!
//! let fields = session.describe(row_description)?;
//!
//! let mut cursor = session.begin_column().await?;
//! let id = session.read::<i32>(&mut cursor, &fields[0]).await?;
//!
//! let mut cursor = session.begin_column().await?;
//! match session.read::<Option<String>>(&mut cursor, &fields[1]).await {
//!     Ok(name) => println!("{id}: {name:?}"),
//!     // value bytes are consumed, the next column can be read
//!     Err(err) if err.is_recoverable() => eprintln!("{id}: {err}"),
//!     Err(err) => return Err(err),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writing parameters:
//!
//! ```
//! use pgvalue::{Parameters, TypeRegistry, buffer::{MemorySink, WriteBufferExt}};
//!
//! # async fn app() -> pgvalue::Result<()> {
//! let registry = TypeRegistry::builtin();
//! let mut params = Parameters::new();
//! params.bind(&registry, 420)?.bind(&registry, "Foo")?;
//!
//! let mut sink = MemorySink::with_capacity(64);
//! params.write(&mut sink).await?;
//! sink.flush().await?;
//!
//! assert_eq!(sink.output().len(), 2 + 8 + 7);
//! # Ok(())
//! # }
//! ```

pub(crate) mod common;
mod ext;

// Protocol
pub mod postgres;
pub mod column;

// Buffer
pub mod config;
pub mod buffer;
pub mod length_cache;

// Codec
pub mod value;
pub mod codec;
pub mod handler;
pub mod registry;

// Operation
pub mod param;
pub mod session;

pub mod types;

pub mod error;

pub use config::BufferConfig;
pub use value::{FromValue, Value, ValueKind};
pub use handler::TypeHandler;
pub use registry::{TypeMapping, TypeRegistry, RegistryBuilder, TypeTag};
pub use param::{Parameters, ParameterSettings};
pub use session::Session;
pub use error::{Error, ErrorKind, Result};
