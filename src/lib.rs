//! # siteark
//!
//! Packs a directory of static web content into a self-contained offline
//! archive. Pages, images, stylesheets and scripts become archive entries,
//! and the links between them are rewritten so the archive browses the same
//! way the directory did.
//!
//! # Architecture: Pull Pipeline
//!
//! ```text
//!  DirectoryWalker ──paths──▶ bounded queue ──▶ EntrySource ◀── StorageEngine
//!  (background thread)        (capacity 100)    │                 (pulls entries,
//!                                               │                  then payloads)
//!                                               ├─ NamespaceResolver  path → A/I/-/M url
//!                                               ├─ TemplateRenderer   layout pages
//!                                               └─ LinkRewriter       HTML/CSS links
//! ```
//!
//! The walker blocks when the queue is full, so memory stays bounded however
//! large the tree is. The storage engine first drains the entry stream
//! (metadata, then redirects, then files) and only then asks for payloads,
//! because some payloads depend on every entry having been seen.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`queue`] | Bounded FIFO between the walker and the entry source |
//! | [`walk`] | Background directory traversal feeding the queue |
//! | [`mime`] | Extension-based MIME classification |
//! | [`namespace`] | Deterministic path → archive URL mapping, relative link computation |
//! | [`html`] | Read-only HTML inspection: links, title, meta refresh |
//! | [`rewrite`] | Link rewriting in HTML and CSS payloads, font inlining |
//! | [`template`] | `<%token%>` layout rendering with bounded recursion |
//! | [`metadata`] | `M/` metadata keys and per-MIME counters |
//! | [`entry`] | The entry type handed to storage engines |
//! | [`source`] | Entry stream and payload production |
//! | [`archive`] | Storage engine trait and the packed reference writer |
//! | [`config`] | Layered build configuration (defaults, TOML file, command line) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Deterministic URLs
//!
//! An entry's URL depends only on its path and the namespace flags. When a
//! page links to another, the rewriter recomputes the target's URL on its
//! own rather than looking it up, which keeps rewriting independent of the
//! order in which entries are streamed.
//!
//! ## Textual Rewriting
//!
//! HTML is parsed to find link values but never re-serialized. Links are
//! substituted in the original bytes, so formatting, comments and anything
//! the parser would normalize survive untouched.

pub mod archive;
pub mod config;
pub mod entry;
pub mod html;
pub mod metadata;
pub mod mime;
pub mod namespace;
pub mod output;
pub mod queue;
pub mod rewrite;
pub mod source;
pub mod template;
pub mod walk;

#[cfg(test)]
pub(crate) mod test_helpers;
