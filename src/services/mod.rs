//! Services module - document work delegated by the job runner.
//!
//! Conversion itself is not this crate's business. The job runner in
//! [`crate::backend::LocalBackend`] only talks to the [`DocumentConverter`]
//! trait; the shipped [`ExternalToolConverter`] runs user-configured command
//! templates through the platform shell.
//!
//! # Components
//!
//! - [`DocumentConverter`]: `prepare` (load + fetch assets, with progress) and
//!   `render` (one output format)
//! - [`ExternalToolConverter`]: subprocess implementation with timeouts and
//!   `PROGRESS done/total` parsing
//! - [`ConversionError`]: failures of a single document
//!
//! # Usage Example
//!
//! ```ignore
//! use article_converter::services::{DocumentConverter, ExternalToolConverter};
//!
//! let converter = ExternalToolConverter::from_settings(&settings);
//! let document = converter.prepare("article_html/post.html".into(), &|done, total| {
//!     println!("{done}/{total} images");
//! }).await?;
//! let pdf = converter.render(&document, OutputFormat::Pdf, "output".into()).await?;
//! ```

pub mod converter;

pub use converter::{
    ConversionError, DocumentConverter, ExternalToolConverter, PreparedDocument, ToolCommand,
};
