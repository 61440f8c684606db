//! Incremental tag-stream parser.
//!
//! Model output interleaves prose with tool markup:
//!
//! ```text
//! Let me look at that file.
//! <read_files>
//! <paths>["src/main.rs"]</paths>
//! </read_files>
//! ```
//!
//! The parser consumes text fragments split at arbitrary points (mid-tag,
//! mid-attribute, mid-entity) and emits [`TagEvent`]s as markup is
//! recognized. It never rewrites the text: [`tag_stream`] hands every
//! fragment back to the caller unchanged.
//!
//! # Automaton
//!
//! ```text
//!            <tool>                 <param>
//! Outside ───────────▶ InTool ───────────────▶ InParam
//!    ▲                  │  ▲                      │
//!    └──── </tool> ─────┘  └────── </param> ──────┘
//! ```
//!
//! Anything that does not move the automaton (foreign tags, nested tags
//! sharing the active tool's name, stray closing tags) is reported through
//! the default [`TagEvent::TagStart`] / [`TagEvent::TagEnd`] events.

mod attributes;
mod entities;
mod machine;
mod stream;

pub use attributes::{AttributeError, Attributes, parse_attributes};
pub use entities::decode_entities;
pub use machine::{DEFAULT_MAX_TAG_LEN, TagEvent, TagSchema, TagStreamParser};
pub use stream::{parse_fragments, tag_stream};
