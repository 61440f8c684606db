//! The tag automaton.
//!
//! Input is buffered only while a `<` candidate is undecidable. Everything
//! before the first `<` is resolved immediately, so memory stays bounded by
//! `max_tag_len` plus the text of the parameter currently being collected.

use serde::Serialize;
use std::collections::HashMap;
use tracing::trace;

use crate::attributes::{AttributeError, Attributes, parse_attributes};
use crate::entities::decode_entities;

/// Longest run (from `<` through `>`) still treated as a tag candidate.
pub const DEFAULT_MAX_TAG_LEN: usize = 4096;

/// Which tag names are tools, and which child names are their parameters.
#[derive(Debug, Clone, Default)]
pub struct TagSchema {
    tools: HashMap<String, Vec<String>>,
}

impl TagSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool<I, S>(mut self, name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name, params);
        self
    }

    pub fn insert<I, S>(&mut self, name: impl Into<String>, params: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools
            .insert(name.into(), params.into_iter().map(Into::into).collect());
    }

    pub fn is_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_param(&self, tool: &str, name: &str) -> bool {
        self.tools
            .get(tool)
            .is_some_and(|params| params.iter().any(|p| p == name))
    }
}

/// Emitted as markup is recognized. Text is never reported as an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TagEvent {
    ToolStart {
        name: String,
        attributes: Attributes,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        errors: Vec<AttributeError>,
    },
    /// `params` holds the opening tag's attributes overridden by every
    /// finalized, entity-decoded parameter.
    ToolEnd {
        name: String,
        params: HashMap<String, String>,
    },
    TagStart {
        name: String,
        attributes: Attributes,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        errors: Vec<AttributeError>,
    },
    TagEnd {
        name: String,
    },
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Outside,
    InTool {
        tool: String,
        params: HashMap<String, String>,
    },
    InParam {
        tool: String,
        params: HashMap<String, String>,
        param: String,
        text: String,
    },
}

/// Result of looking at the buffer when it starts with `<`.
enum Scan {
    /// Not enough input to decide.
    Pending,
    /// The leading `<` is literal text.
    Text,
    /// A complete tag of `len` bytes.
    Tag(Markup, usize),
}

enum Markup {
    Open {
        name: String,
        attributes: String,
        self_closing: bool,
    },
    Close {
        name: String,
    },
}

/// Incremental parser. Feed it fragments; the events it returns do not
/// depend on how the text was split.
#[derive(Debug)]
pub struct TagStreamParser {
    schema: TagSchema,
    max_tag_len: usize,
    buffer: String,
    state: State,
}

impl TagStreamParser {
    pub fn new(schema: TagSchema) -> Self {
        Self::with_max_tag_len(schema, DEFAULT_MAX_TAG_LEN)
    }

    pub fn with_max_tag_len(schema: TagSchema, max_tag_len: usize) -> Self {
        Self {
            schema,
            max_tag_len: max_tag_len.max(3),
            buffer: String::new(),
            state: State::Outside,
        }
    }

    /// Name of the tool whose markup is currently open.
    pub fn open_tool(&self) -> Option<&str> {
        match &self.state {
            State::Outside => None,
            State::InTool { tool, .. } | State::InParam { tool, .. } => Some(tool),
        }
    }

    /// Consume one fragment.
    pub fn feed(&mut self, fragment: &str) -> Vec<TagEvent> {
        self.buffer.push_str(fragment);
        let mut events = Vec::new();
        self.drain(false, &mut events);
        events
    }

    /// Signal end of stream. Undecided candidates become text, then any open
    /// parameter and tool are closed as if their end tags had arrived.
    pub fn finish(&mut self) -> Vec<TagEvent> {
        let mut events = Vec::new();
        self.drain(true, &mut events);
        self.buffer.clear();

        if matches!(self.state, State::InParam { .. }) {
            trace!("Auto-closing parameter at end of stream");
            self.close_param();
        }
        if let State::InTool { tool, params } = std::mem::take(&mut self.state) {
            trace!(tool = %tool, "Auto-closing tool at end of stream");
            events.push(TagEvent::ToolEnd { name: tool, params });
        }
        events
    }

    fn drain(&mut self, at_eof: bool, events: &mut Vec<TagEvent>) {
        loop {
            let Some(lt) = self.buffer.find('<') else {
                let text = std::mem::take(&mut self.buffer);
                self.push_text(&text);
                return;
            };
            if lt > 0 {
                let text: String = self.buffer.drain(..lt).collect();
                self.push_text(&text);
            }

            let scan = match &self.state {
                State::InParam { param, .. } => self.scan_param_close(param, at_eof),
                _ => self.scan_tag(at_eof),
            };
            match scan {
                Scan::Pending => return,
                Scan::Text => {
                    self.buffer.drain(..1);
                    self.push_text("<");
                }
                Scan::Tag(markup, len) => {
                    self.buffer.drain(..len);
                    self.handle(markup, events);
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if let State::InParam { text: collected, .. } = &mut self.state {
            collected.push_str(text);
        }
    }

    /// Inside a parameter only the exact closing tag is markup.
    fn scan_param_close(&self, param: &str, at_eof: bool) -> Scan {
        let buf = self.buffer.as_str();
        let head_len = param.len() + 2;
        if buf.len() < head_len {
            let is_prefix = "</".chars().chain(param.chars()).zip(buf.chars()).all(|(a, b)| a == b);
            return if is_prefix && !at_eof { Scan::Pending } else { Scan::Text };
        }
        if !buf.starts_with("</") || !buf[2..].starts_with(param) {
            return Scan::Text;
        }

        let after = &buf[head_len..];
        let spaces = after.len() - after.trim_start().len();
        match after[spaces..].chars().next() {
            Some('>') => {
                let len = head_len + spaces + 1;
                if len > self.max_tag_len {
                    Scan::Text
                } else {
                    Scan::Tag(Markup::Close { name: param.to_string() }, len)
                }
            }
            Some(_) => Scan::Text,
            None if at_eof || buf.len() > self.max_tag_len => Scan::Text,
            None => Scan::Pending,
        }
    }

    fn scan_tag(&self, at_eof: bool) -> Scan {
        let buf = self.buffer.as_str();
        let pending = if at_eof || buf.len() > self.max_tag_len {
            Scan::Text
        } else {
            Scan::Pending
        };

        let closing = buf[1..].starts_with('/');
        let name_start = if closing { 2 } else { 1 };
        let Some(first) = buf[name_start..].chars().next() else {
            return pending;
        };
        if !is_name_start(first) {
            return Scan::Text;
        }

        let name_len = buf[name_start..]
            .find(|c: char| !is_name_char(c))
            .unwrap_or(buf.len() - name_start);
        let name_end = name_start + name_len;
        let Some(next) = buf[name_end..].chars().next() else {
            return pending;
        };
        if !(next == '>' || next == '/' || next.is_whitespace()) {
            return Scan::Text;
        }

        let Some(offset) = buf[name_end..].find(['>', '<']) else {
            return pending;
        };
        let gt = name_end + offset;
        if buf.as_bytes()[gt] == b'<' || gt + 1 > self.max_tag_len {
            return Scan::Text;
        }

        let name = buf[name_start..name_end].to_string();
        let inner = &buf[name_end..gt];
        let markup = if closing {
            if !inner.trim().is_empty() {
                return Scan::Text;
            }
            Markup::Close { name }
        } else {
            let trimmed = inner.trim_end();
            let self_closing = trimmed.ends_with('/');
            let attributes = if self_closing {
                &trimmed[..trimmed.len() - 1]
            } else {
                inner
            };
            Markup::Open {
                name,
                attributes: attributes.to_string(),
                self_closing,
            }
        };
        Scan::Tag(markup, gt + 1)
    }

    fn handle(&mut self, markup: Markup, events: &mut Vec<TagEvent>) {
        match markup {
            Markup::Open {
                name,
                attributes,
                self_closing,
            } => self.open(name, &attributes, self_closing, events),
            Markup::Close { name } => self.close(name, events),
        }
    }

    fn open(&mut self, name: String, source: &str, self_closing: bool, events: &mut Vec<TagEvent>) {
        let (attributes, errors) = parse_attributes(source);
        match std::mem::take(&mut self.state) {
            State::Outside if self.schema.is_tool(&name) => {
                trace!(tool = %name, "Tool markup opened");
                events.push(TagEvent::ToolStart {
                    name: name.clone(),
                    attributes: attributes.clone(),
                    errors,
                });
                if self_closing {
                    events.push(TagEvent::ToolEnd { name, params: attributes });
                } else {
                    self.state = State::InTool { tool: name, params: attributes };
                }
            }
            State::InTool { tool, mut params } if self.schema.is_param(&tool, &name) => {
                if self_closing {
                    params.insert(name, String::new());
                    self.state = State::InTool { tool, params };
                } else {
                    self.state = State::InParam {
                        tool,
                        params,
                        param: name,
                        text: String::new(),
                    };
                }
            }
            other => {
                self.state = other;
                events.push(TagEvent::TagStart {
                    name: name.clone(),
                    attributes,
                    errors,
                });
                if self_closing {
                    events.push(TagEvent::TagEnd { name });
                }
            }
        }
    }

    fn close(&mut self, name: String, events: &mut Vec<TagEvent>) {
        // Only the parameter's own closing tag is scanned inside a parameter.
        if matches!(self.state, State::InParam { .. }) {
            self.close_param();
            return;
        }
        match std::mem::take(&mut self.state) {
            State::InTool { tool, params } if tool == name => {
                trace!(tool = %tool, "Tool markup closed");
                events.push(TagEvent::ToolEnd { name: tool, params });
            }
            other => {
                self.state = other;
                events.push(TagEvent::TagEnd { name });
            }
        }
    }

    fn close_param(&mut self) {
        if let State::InParam {
            tool,
            mut params,
            param,
            text,
        } = std::mem::take(&mut self.state)
        {
            params.insert(param, decode_entities(&text).into_owned());
            self.state = State::InTool { tool, params };
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}
