//! Line-oriented console editor driving a session.

use coedit_core::{CursorData, EditorHost, Operation, Sequencer};

/// A command read from standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the whole content; `\n` escapes become newlines
    Set(String),
    /// Append a line
    Append(String),
    /// Insert text at a character position
    Insert(usize, String),
    /// Remove characters starting at a position
    Delete(usize, usize),
    /// Move the local cursor
    Cursor(CursorData),
    /// Print content and collaborators
    Show,
    /// Ask the storage service to persist
    Save,
    /// Leave the document and exit
    Leave,
}

impl Command {
    /// Parse one input line. Lines not starting with `:` are appended.
    ///
    /// # Errors
    ///
    /// Returns a usage message if the command is malformed.
    pub fn parse(line: &str) -> Result<Self, String> {
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Self::Append(line.to_string()));
        };
        let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));

        match name {
            "set" => Ok(Self::Set(args.replace("\\n", "\n"))),
            "insert" => {
                let (pos, text) = args
                    .split_once(' ')
                    .ok_or("usage: :insert POS TEXT")?;
                Ok(Self::Insert(number(pos)?, text.replace("\\n", "\n")))
            }
            "delete" => match args.split_whitespace().collect::<Vec<_>>()[..] {
                [pos, len] => Ok(Self::Delete(number(pos)?, number(len)?)),
                _ => Err("usage: :delete POS LEN".to_string()),
            },
            "cursor" => match args.split_whitespace().collect::<Vec<_>>()[..] {
                [pos] => Ok(Self::Cursor(CursorData::caret(number(pos)?))),
                [pos, start, end] => Ok(Self::Cursor(CursorData::with_selection(
                    number(pos)?,
                    number(start)?,
                    number(end)?,
                ))),
                _ => Err("usage: :cursor POS [START END]".to_string()),
            },
            "show" => Ok(Self::Show),
            "save" => Ok(Self::Save),
            "leave" | "quit" => Ok(Self::Leave),
            other => Err(format!("unknown command ':{other}'")),
        }
    }
}

fn number(value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| format!("expected a number, got '{value}'"))
}

/// The agent's view of the document as an editor would hold it.
#[derive(Debug, Default)]
pub struct ConsoleEditor {
    content: String,
}

impl ConsoleEditor {
    /// Current editor content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Overwrite the editor content without producing an edit.
    pub fn load(&mut self, content: &str) {
        content.clone_into(&mut self.content);
    }

    /// Content after applying an editing command, or `None` for
    /// commands that do not edit.
    pub fn edited(&self, command: &Command) -> Option<String> {
        match command {
            Command::Set(text) => Some(text.clone()),
            Command::Append(line) => {
                let mut next = self.content.clone();
                if !next.is_empty() {
                    next.push('\n');
                }
                next.push_str(line);
                Some(next)
            }
            Command::Insert(position, text) => {
                coedit_core::apply(&self.content, &Operation::insert(*position, text.clone())).ok()
            }
            Command::Delete(position, length) => {
                coedit_core::apply(&self.content, &Operation::delete(*position, *length)).ok()
            }
            Command::Cursor(_) | Command::Show | Command::Save | Command::Leave => None,
        }
    }
}

impl EditorHost for ConsoleEditor {
    fn remote_applied(&mut self, sequencer: &mut Sequencer, op: &Operation, content: &str) {
        content.clone_into(&mut self.content);
        println!("--- {op}\n{content}");

        // The change handler an editor fires on programmatic updates.
        if let Some(echo) = sequencer.local_edit(content) {
            tracing::warn!(op = %echo, "Remote apply echoed as a local edit");
        }
    }
}
