//! Terminal rendering of a chat session
//!
//! The renderer remembers what it already printed so each snapshot only adds
//! the new part: fresh messages, streamed text growth and new tool calls.

use chatrelay_core::{Message, Notification, Role, SessionSnapshot, ToolCall};
use std::io::{self, Write};

/// Typing this line ends the chat
pub const QUIT_COMMAND: &str = "/quit";

#[derive(Debug, Clone)]
struct Printed {
    id: String,
    content: String,
    tool_calls: usize,
}

pub struct ConsoleRenderer<W: Write> {
    out: W,
    printed: Vec<Printed>,
    /// The cursor sits at the end of the last message's text
    line_open: bool,
    was_awaiting: bool,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: Vec::new(),
            line_open: false,
            was_awaiting: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print whatever changed since the previous snapshot
    pub fn render(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        for (index, message) in snapshot.messages.iter().enumerate() {
            match self.printed.get(index).cloned() {
                None => self.print_new(message)?,
                Some(prev) if prev.id != message.id => {
                    // Transcript no longer matches what is on screen; start over.
                    self.printed.truncate(index);
                    self.print_new(message)?;
                }
                Some(prev) => self.print_update(index, &prev, message)?,
            }
        }

        if snapshot.awaiting_response && !self.was_awaiting {
            self.finish_line()?;
            writeln!(self.out, "  ...")?;
        }
        self.was_awaiting = snapshot.awaiting_response;
        self.out.flush()
    }

    pub fn notify(&mut self, notification: &Notification) -> io::Result<()> {
        self.finish_line()?;
        let marker = if notification.is_error() { "!" } else { "*" };
        writeln!(self.out, "{} {}", marker, notification.message())?;
        self.out.flush()
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        self.finish_line()?;
        self.out.flush()
    }

    fn print_new(&mut self, message: &Message) -> io::Result<()> {
        self.finish_line()?;
        write!(self.out, "{}> {}", label(message.role), message.content)?;
        self.line_open = true;
        for call in &message.tool_calls {
            self.print_tool_call(call)?;
        }
        self.printed.push(Printed {
            id: message.id.clone(),
            content: message.content.clone(),
            tool_calls: message.tool_calls.len(),
        });
        Ok(())
    }

    fn print_update(&mut self, index: usize, prev: &Printed, message: &Message) -> io::Result<()> {
        let is_last = index + 1 == self.printed.len();

        if message.content != prev.content {
            match message.content.strip_prefix(prev.content.as_str()) {
                Some(growth) if is_last && self.line_open => write!(self.out, "{}", growth)?,
                _ => {
                    self.finish_line()?;
                    write!(self.out, "{}> {}", label(message.role), message.content)?;
                    self.line_open = true;
                }
            }
        }

        for call in message.tool_calls.iter().skip(prev.tool_calls) {
            self.print_tool_call(call)?;
        }

        self.printed[index] = Printed {
            id: message.id.clone(),
            content: message.content.clone(),
            tool_calls: message.tool_calls.len(),
        };
        Ok(())
    }

    fn print_tool_call(&mut self, call: &ToolCall) -> io::Result<()> {
        self.finish_line()?;
        let params = call
            .parameters
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(self.out, "  [tool] {}({})", call.name, params)
    }

    fn finish_line(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

fn label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Agent => "agent",
    }
}
